//! Module for handling I/O: loading merged spot tables and writing result tables.
use crate::statistic::{DeltaRecord, StatisticSummary};
use crate::{KTable, RipleyError};
use ::csv::{ReaderBuilder, WriterBuilder};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array2;
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Data alignment error: {0}")]
    Alignment(String),
    #[error("Malformed table: {0}")]
    Format(String),
    #[error(transparent)]
    Ripley(#[from] RipleyError),
}

/// Which columns of a merged spot table hold coordinates, marks and genes.
#[derive(Debug, Clone)]
pub struct SpotColumns {
    /// Column with the first spot coordinate (grid row)
    pub x_col: String,
    /// Column with the second spot coordinate (grid column)
    pub y_col: String,
    /// Column with the protein mark (e.g. mean fluorescence intensity)
    pub mark_col: String,
    /// Optional spot identifier column (e.g. barcode)
    pub id_col: Option<String>,
    /// Explicit gene columns. When empty, every other numeric column is a gene.
    pub gene_cols: Vec<String>,
    /// Columns never treated as genes
    pub exclude: Vec<String>,
    /// Keep only the first `n` gene columns
    pub max_genes: Option<usize>,
    /// Field separator of the input file
    pub delimiter: u8,
}

impl Default for SpotColumns {
    fn default() -> Self {
        SpotColumns {
            x_col: "array_row".into(),
            y_col: "array_col".into(),
            mark_col: "PCNA_IF".into(),
            id_col: None,
            gene_cols: Vec::new(),
            exclude: Vec::new(),
            max_genes: None,
            delimiter: b',',
        }
    }
}

/// Spots loaded from a merged table, index-aligned across all fields.
pub struct SpotTable {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Protein mark per spot; missing readings are 0
    pub protein: Vec<f64>,
    /// Gene expression, shape (n_spots, n_genes)
    pub genes: Array2<f64>,
    pub gene_names: Vec<String>,
    pub spot_ids: Option<Vec<String>>,
}

impl SpotTable {
    pub fn n_spots(&self) -> usize {
        self.x.len()
    }
}

/// Reads a numeric column as f64, failing on nulls.
fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, IoError> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| IoError::Alignment(format!("Column '{}' contains nulls or missing values", name)))
}

/// Loads a merged spot table (coordinates, one mark column, gene columns).
pub fn load_spot_table(path: &Path, columns: &SpotColumns) -> Result<SpotTable, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_string_lossy().into()));
    }
    log::info!("Loading spot table: {:?}", path);

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_parse_options(CsvParseOptions::default().with_separator(columns.delimiter))
        .try_into_reader_with_file_path(Some(path.into()))?
        .finish()?;

    log::info!("Loaded spot table with {} rows and {} columns", df.height(), df.width());

    let x = numeric_column(&df, &columns.x_col)?;
    let y = numeric_column(&df, &columns.y_col)?;

    // Spots without a fluorescence reading carry no protein weight
    let mark_series = df.column(&columns.mark_col)?.cast(&DataType::Float64)?;
    let n_missing = mark_series.null_count();
    if n_missing > 0 {
        log::warn!(
            "{} spots have no value in '{}'; setting their mark to 0",
            n_missing,
            columns.mark_col
        );
    }
    let protein: Vec<f64> = mark_series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();

    let spot_ids = match &columns.id_col {
        Some(id_col) => {
            let ids = df.column(id_col)?.cast(&DataType::String)?;
            let ids = ids
                .str()?
                .into_iter()
                .map(|opt_s| opt_s.map(String::from))
                .collect::<Option<Vec<String>>>()
                .ok_or_else(|| IoError::Alignment(format!("ID column '{}' contains nulls", id_col)))?;
            let duplicate = {
                let mut seen = HashSet::with_capacity(ids.len());
                ids.iter().find(|id| !seen.insert(id.as_str())).cloned()
            };
            if let Some(dup) = duplicate {
                return Err(IoError::Alignment(format!(
                    "Duplicate spot id '{}' in column '{}'",
                    dup, id_col
                )));
            }
            log::debug!("First spot ids: {:?}", &ids[..ids.len().min(5)]);
            Some(ids)
        }
        None => None,
    };

    let mut gene_names: Vec<String> = if columns.gene_cols.is_empty() {
        let reserved: Vec<&str> = [
            Some(columns.x_col.as_str()),
            Some(columns.y_col.as_str()),
            Some(columns.mark_col.as_str()),
            columns.id_col.as_deref(),
        ]
        .into_iter()
        .flatten()
        .chain(columns.exclude.iter().map(String::as_str))
        .collect();

        df.get_columns()
            .iter()
            .filter(|s| s.dtype().is_numeric() && !reserved.contains(&s.name()))
            .map(|s| s.name().to_string())
            .collect()
    } else {
        columns.gene_cols.clone()
    };

    if let Some(max_genes) = columns.max_genes {
        if max_genes < gene_names.len() {
            log::info!("Keeping the first {} of {} gene columns", max_genes, gene_names.len());
            gene_names.truncate(max_genes);
        }
    }

    if gene_names.is_empty() {
        return Err(IoError::Alignment("No gene columns found in spot table".into()));
    }

    let n_spots = df.height();
    log::info!("Building gene matrix: {} spots x {} genes", n_spots, gene_names.len());

    let mut genes = Array2::zeros((n_spots, gene_names.len()));
    for (g, gene) in gene_names.iter().enumerate() {
        log::debug!("Extracting gene column '{}' (column {})", gene, g);
        let values = numeric_column(&df, gene)?;
        for (i, &v) in values.iter().enumerate() {
            genes[[i, g]] = v;
        }
    }

    if x.len() != n_spots || y.len() != n_spots || protein.len() != n_spots {
        return Err(IoError::Alignment(format!(
            "Dimension mismatch: x ({}), y ({}), marks ({}), spots ({})",
            x.len(),
            y.len(),
            protein.len(),
            n_spots
        )));
    }

    log::info!("Spot table loaded: {} spots with {} genes", n_spots, gene_names.len());

    Ok(SpotTable { x, y, protein, genes, gene_names, spot_ids })
}

/// Output file, optionally behind a gzip encoder.
enum TableSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl TableSink {
    /// Flushes everything, writing the gzip trailer when compressed.
    fn finish(self) -> std::io::Result<()> {
        match self {
            TableSink::Plain(mut file) => file.flush(),
            TableSink::Gzip(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for TableSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            TableSink::Plain(file) => file.write(buf),
            TableSink::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TableSink::Plain(file) => file.flush(),
            TableSink::Gzip(encoder) => encoder.flush(),
        }
    }
}

/// Opens a delimited writer; paths ending in `.gz` are gzip-compressed.
fn table_writer(path: &Path, delimiter: u8) -> Result<::csv::Writer<TableSink>, IoError> {
    let file = BufWriter::new(File::create(path)?);
    let sink = if is_gzip(path) {
        TableSink::Gzip(GzEncoder::new(file, Compression::default()))
    } else {
        TableSink::Plain(file)
    };
    Ok(WriterBuilder::new().delimiter(delimiter).from_writer(sink))
}

/// Drains the csv buffer and closes the sink so write errors surface here.
fn finish_table(writer: ::csv::Writer<TableSink>) -> Result<(), IoError> {
    let sink = writer.into_inner().map_err(|e| e.into_error())?;
    sink.finish()?;
    Ok(())
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "gz")
}

/// Writes a K (or delta) table: a `radius` column followed by one column per gene.
pub fn write_k_table(path: &Path, table: &KTable, delimiter: u8) -> Result<(), IoError> {
    log::info!(
        "Writing {} radii x {} genes to {:?}",
        table.n_radii(),
        table.n_genes(),
        path
    );
    let mut writer = table_writer(path, delimiter)?;

    let mut header = Vec::with_capacity(table.n_genes() + 1);
    header.push("radius".to_string());
    header.extend(table.gene_names.iter().cloned());
    writer.write_record(&header)?;

    for (radius, row) in table.radii.iter().zip(table.values.outer_iter()) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(radius.to_string());
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    finish_table(writer)
}

/// Writes the one-row statistic table, one column per gene.
pub fn write_summary(path: &Path, summary: &StatisticSummary, delimiter: u8) -> Result<(), IoError> {
    log::info!("Writing statistic for {} genes to {:?}", summary.gene_names.len(), path);
    let mut writer = table_writer(path, delimiter)?;
    writer.write_record(&summary.gene_names)?;
    writer.write_record(summary.values.iter().map(|v| v.to_string()))?;
    finish_table(writer)
}

/// Writes long-format delta records (`radius, gene, weighted_k, unweighted_k, delta`).
pub fn write_delta_records(path: &Path, records: &[DeltaRecord], delimiter: u8) -> Result<(), IoError> {
    log::info!("Writing {} long-format delta records to {:?}", records.len(), path);
    let mut writer = table_writer(path, delimiter)?;
    for record in records {
        writer.serialize(record)?;
    }
    finish_table(writer)
}

/// Reads a K table written by [`write_k_table`]. The first column must be `radius`.
pub fn read_k_table(path: &Path, delimiter: u8) -> Result<KTable, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_string_lossy().into()));
    }
    log::info!("Loading K table from {:?}", path);

    let file = BufReader::new(File::open(path)?);
    let source: Box<dyn Read> = if is_gzip(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    if headers.get(0) != Some("radius") {
        return Err(IoError::Format(format!(
            "first column of {:?} must be 'radius', found {:?}",
            path,
            headers.get(0)
        )));
    }
    let gene_names: Vec<String> = headers.iter().skip(1).map(String::from).collect();
    let n_genes = gene_names.len();

    let mut radii = Vec::new();
    let mut flat = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != n_genes + 1 {
            return Err(IoError::Format(format!(
                "row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                n_genes + 1
            )));
        }
        for (col, field) in record.iter().enumerate() {
            let value: f64 = field.trim().parse().map_err(|_| {
                IoError::Format(format!("row {} column {}: '{}' is not a number", line + 1, col, field))
            })?;
            if col == 0 {
                radii.push(value);
            } else {
                flat.push(value);
            }
        }
    }

    let values = Array2::from_shape_vec((radii.len(), n_genes), flat)
        .map_err(|e| IoError::Format(format!("Failed to assemble K table: {}", e)))?;

    log::info!("K table loaded: {} radii x {} genes", radii.len(), n_genes);
    Ok(KTable::new(radii, gene_names, values)?)
}
