//! Ripley's K pipeline: weighted K, unweighted K and the derived statistic
//!
//! This binary runs the whole analysis on one merged spot table: it computes
//! the mark-weighted and the unweighted K tables over the same radii,
//! derives the per-gene statistic and writes all result tables into one
//! output directory.

use clap::Parser;
use ripley_k_rust::{
    compute_ripley_k, derive_statistic,
    io::{load_spot_table, write_delta_records, write_k_table, write_summary, SpotColumns},
    statistic::{delta_records, DEFAULT_RADIUS_LOW},
    RipleyParams, WeightMode,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ripley-pipeline",
    version,
    about = "Runs weighted and unweighted Ripley's K and derives the per-gene statistic"
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

    /// Lower bound of the statistic window (inclusive)
    #[arg(long, default_value_t = DEFAULT_RADIUS_LOW)]
    radius_low: f64,

    /// Upper bound of the statistic window (inclusive). Defaults to the largest radius.
    #[arg(long)]
    radius_up: Option<f64>,

    /// Field separator for input and output tables
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Directory for all output tables
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Prefix for output file names
    #[arg(long, default_value = "ripley_k")]
    output_prefix: String,

    /// Also write a long-format delta table for plotting
    #[arg(long)]
    long_format: bool,

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

    log::info!("Starting Ripley's K pipeline");
    log::info!("Input file: {:?}", cli.input);
    log::info!("Output directory: {:?}", cli.output_dir);
    log::info!("Using {} threads", cli.n_threads);

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.n_threads)
        .build_global()?;

    std::fs::create_dir_all(&cli.output_dir)?;
    let output_path = |suffix: &str| cli.output_dir.join(format!("{}.{}", cli.output_prefix, suffix));

    // ===================================================================
    // 1. Load spots
    // ===================================================================
    let columns = SpotColumns {
        x_col: cli.x_col.clone(),
        y_col: cli.y_col.clone(),
        mark_col: cli.mark_col.clone(),
        id_col: cli.id_col.clone(),
        gene_cols: cli.gene_cols.clone(),
        exclude: cli.exclude_cols.clone(),
        max_genes: cli.max_genes,
        delimiter,
    };
    let spots = load_spot_table(&cli.input, &columns)?;

    // ===================================================================
    // 2. Weighted and unweighted K over the same radii
    // ===================================================================
    let weighted_params = RipleyParams {
        r_min: cli.r_min,
        r_max: cli.r_max,
        r_step: cli.r_step,
        area: cli.area,
        mode: WeightMode::Weighted,
        n_genes: None,
        gene_names: Some(spots.gene_names.clone()),
    };
    let unweighted_params = RipleyParams {
        mode: WeightMode::Unweighted,
        ..weighted_params.clone()
    };

    let weighted = compute_ripley_k(&spots.x, &spots.y, &spots.protein, &spots.genes, &weighted_params)?;
    let unweighted =
        compute_ripley_k(&spots.x, &spots.y, &spots.protein, &spots.genes, &unweighted_params)?;

    write_k_table(&output_path("weighted.csv"), &weighted, delimiter)?;
    write_k_table(&output_path("unweighted.csv"), &unweighted, delimiter)?;

    // ===================================================================
    // 3. Statistic
    // ===================================================================
    let statistic = derive_statistic(&weighted, &unweighted, cli.radius_low, cli.radius_up)?;

    write_k_table(&output_path("delta.csv"), &statistic.delta, delimiter)?;
    write_summary(&output_path("statistic.csv"), &statistic.summary, delimiter)?;

    if cli.long_format {
        let records = delta_records(&weighted, &unweighted, &statistic)?;
        write_delta_records(&output_path("delta_long.csv"), &records, delimiter)?;
    }

    log::info!(
        "Statistic averaged over {} radii in [{}, {}]",
        statistic.summary.n_radii_used,
        statistic.summary.radius_low,
        statistic.summary.radius_up
    );
    log::info!("Ripley's K pipeline completed successfully.");
    Ok(())
}
