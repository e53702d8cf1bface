//! Ripley's K based statistic from two saved K tables
//!
//! This binary reads a weighted and an unweighted K table produced by
//! `compute-ripley-k`, subtracts them radius by radius and averages the
//! difference per gene over a radius window.

use clap::Parser;
use ripley_k_rust::{
    derive_statistic,
    io::{read_k_table, write_delta_records, write_k_table, write_summary},
    statistic::{delta_records, DEFAULT_RADIUS_LOW},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ripley-statistic",
    version,
    about = "Derives the weighted minus unweighted Ripley's K statistic per gene"
)]
struct Cli {
    /// Path to the weighted K table
    #[arg(long, required = true)]
    weighted: PathBuf,

    /// Path to the unweighted K table
    #[arg(long, required = true)]
    unweighted: PathBuf,

    /// Lower bound of the averaging window (inclusive)
    #[arg(long, default_value_t = DEFAULT_RADIUS_LOW)]
    radius_low: f64,

    /// Upper bound of the averaging window (inclusive). Defaults to the largest radius.
    #[arg(long)]
    radius_up: Option<f64>,

    /// Field separator for input and output tables
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Path for the delta table (weighted - unweighted per radius)
    #[arg(long, default_value = "ripley_k_delta.csv")]
    delta_output: PathBuf,

    /// Path for the one-row statistic table
    #[arg(long, default_value = "ripley_k_statistic.csv")]
    summary_output: PathBuf,

    /// Optional path for a long-format delta table (radius, gene, weighted_k, unweighted_k, delta)
    #[arg(long)]
    long_output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.delimiter.is_ascii() {
        return Err(format!("Delimiter '{}' must be a single ASCII character", cli.delimiter).into());
    }
    let delimiter = cli.delimiter as u8;

    log::info!("Starting Ripley's K statistic");
    log::info!("Weighted table: {:?}", cli.weighted);
    log::info!("Unweighted table: {:?}", cli.unweighted);

    let weighted = read_k_table(&cli.weighted, delimiter)?;
    let unweighted = read_k_table(&cli.unweighted, delimiter)?;

    let statistic = derive_statistic(&weighted, &unweighted, cli.radius_low, cli.radius_up)?;

    write_k_table(&cli.delta_output, &statistic.delta, delimiter)?;
    write_summary(&cli.summary_output, &statistic.summary, delimiter)?;

    if let Some(long_output) = &cli.long_output {
        let records = delta_records(&weighted, &unweighted, &statistic)?;
        write_delta_records(long_output, &records, delimiter)?;
    }

    for (gene, value) in statistic
        .summary
        .gene_names
        .iter()
        .zip(statistic.summary.values.iter())
    {
        log::info!("  {}: {:.4}", gene, value);
    }

    log::info!("Ripley's K statistic completed successfully.");
    Ok(())
}
