//! Compute Ripley's K: one K table from a merged spot table
//!
//! This binary loads a spot table (coordinates, a protein mark column and
//! gene columns), evaluates the weighted or unweighted Ripley's K function
//! for every gene over a radius sequence, and writes the result as a
//! delimited table with a leading `radius` column.

use clap::Parser;
use ripley_k_rust::{
    compute_ripley_k,
    io::{load_spot_table, write_k_table, SpotColumns},
    RipleyParams, WeightMode,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "compute-ripley-k",
    version,
    about = "Computes the mark-weighted or unweighted Ripley's K function for each gene"
)]
struct Cli {
    /// Path to the merged spot table (coordinates, protein mark, gene columns)
    #[arg(long, required = true)]
    input: PathBuf,

    /// Column holding the first spot coordinate
    #[arg(long, default_value = "array_row")]
    x_col: String,

    /// Column holding the second spot coordinate
    #[arg(long, default_value = "array_col")]
    y_col: String,

    /// Column holding the protein mark (e.g. fluorescence intensity)
    #[arg(long, default_value = "PCNA_IF")]
    mark_col: String,

    /// Optional spot identifier column (e.g. 'barcode')
    #[arg(long)]
    id_col: Option<String>,

    /// Gene columns, comma-separated. Defaults to every other numeric column.
    #[arg(long, value_delimiter = ',')]
    gene_cols: Vec<String>,

    /// Numeric columns that are not genes, comma-separated (e.g. 'in_tissue')
    #[arg(long, value_delimiter = ',')]
    exclude_cols: Vec<String>,

    /// Only analyse the first N gene columns
    #[arg(long)]
    max_genes: Option<usize>,

    /// 'weighted' uses marks as-is, 'unweighted' treats nonzero marks as 1
    #[arg(long, default_value = "weighted")]
    mode: WeightMode,

    /// First radius
    #[arg(long, default_value_t = 1.0)]
    r_min: f64,

    /// Last radius (inclusive). Defaults to the smaller of max(x), max(y).
    #[arg(long)]
    r_max: Option<f64>,

    /// Step between radii
    #[arg(long, default_value_t = 1.0)]
    r_step: f64,

    /// Study area. Defaults to max(x) * max(y).
    #[arg(long)]
    area: Option<f64>,

    /// Field separator for input and output tables
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Path for the output K table (a '.gz' suffix compresses it)
    #[arg(long, default_value = "ripley_k.csv")]
    output: PathBuf,

    /// Number of threads to use
    #[arg(long, default_value_t = 1)]
    n_threads: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.delimiter.is_ascii() {
        return Err(format!("Delimiter '{}' must be a single ASCII character", cli.delimiter).into());
    }
    let delimiter = cli.delimiter as u8;

    log::info!("Starting Ripley's K computation ({:?})", cli.mode);
    log::info!("Input file: {:?}", cli.input);
    log::info!("Using {} threads", cli.n_threads);

    // Set the global thread pool for rayon
    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.n_threads)
        .build_global()?;

    let columns = SpotColumns {
        x_col: cli.x_col,
        y_col: cli.y_col,
        mark_col: cli.mark_col,
        id_col: cli.id_col,
        gene_cols: cli.gene_cols,
        exclude: cli.exclude_cols,
        max_genes: cli.max_genes,
        delimiter,
    };
    let spots = load_spot_table(&cli.input, &columns)?;

    let params = RipleyParams {
        r_min: cli.r_min,
        r_max: cli.r_max,
        r_step: cli.r_step,
        area: cli.area,
        mode: cli.mode,
        n_genes: None,
        gene_names: Some(spots.gene_names.clone()),
    };

    let table = compute_ripley_k(&spots.x, &spots.y, &spots.protein, &spots.genes, &params)?;

    write_k_table(&cli.output, &table, delimiter)?;

    log::info!("Ripley's K for {} genes written to {:?}", table.n_genes(), cli.output);
    Ok(())
}
