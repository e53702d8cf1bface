//! # RIPLEY-K-RUST Crate
//!
//! This library contains the core spatial statistics for the `ripley-k-rust` package:
//! a mark-weighted Ripley's K function over spatial transcriptomics spots, and the
//! statistic derived from the difference between its weighted and unweighted versions.
//! The binaries `compute-ripley-k`, `ripley-statistic` and `ripley-pipeline` call
//! functions from this library.

pub mod distance;
pub mod io;
pub mod ripley;
pub mod statistic;

use ndarray::Array2;
use thiserror::Error;

pub use ripley::{compute_ripley_k, compute_ripley_k_matrix, RipleyParams};
pub use statistic::{derive_statistic, DeltaRecord, RipleyStatistic, StatisticSummary};

/// Errors raised eagerly at the boundary of the K engine and the statistic derivation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RipleyError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("Radius mismatch: {0}")]
    RadiusMismatch(String),
    #[error("Empty selection: {0}")]
    EmptySelection(String),
}

/// Whether marks enter the K function as continuous weights or as presence/absence.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightMode {
    /// Protein intensity and gene expression are used as-is.
    #[default]
    Weighted,
    /// Every nonzero mark is replaced by 1 before computing.
    Unweighted,
}

impl WeightMode {
    /// Transforms one mark value according to the mode.
    #[inline]
    pub fn mark(self, value: f64) -> f64 {
        match self {
            WeightMode::Weighted => value,
            WeightMode::Unweighted => {
                if value != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeightMode::Weighted => "weighted",
            WeightMode::Unweighted => "unweighted",
        }
    }
}

impl std::str::FromStr for WeightMode {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weighted" | "w" => Ok(WeightMode::Weighted),
            "unweighted" | "u" => Ok(WeightMode::Unweighted),
            _ => Err("Unknown weight mode. Use 'weighted' or 'unweighted'."),
        }
    }
}

/// Ripley's K values in tabular form: one row per radius, one column per gene.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct KTable {
    /// Radii at which K was evaluated, in evaluation order
    pub radii: Vec<f64>,
    /// Gene labels, one per column of `values`
    pub gene_names: Vec<String>,
    /// K values, shape (n_radii, n_genes)
    pub values: Array2<f64>,
}

impl KTable {
    /// Builds a table, checking that `values` is shaped (radii × genes).
    pub fn new(
        radii: Vec<f64>,
        gene_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, RipleyError> {
        if values.dim() != (radii.len(), gene_names.len()) {
            return Err(RipleyError::ShapeMismatch(format!(
                "K table values are {:?} but there are {} radii and {} genes",
                values.dim(),
                radii.len(),
                gene_names.len()
            )));
        }
        Ok(KTable { radii, gene_names, values })
    }

    pub fn n_radii(&self) -> usize {
        self.radii.len()
    }

    pub fn n_genes(&self) -> usize {
        self.gene_names.len()
    }

    /// K values of one gene across all radii, looked up by label.
    pub fn gene_column(&self, gene: &str) -> Option<Vec<f64>> {
        let idx = self.gene_names.iter().position(|name| name == gene)?;
        Some(self.values.column(idx).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn weight_mode_parses_short_and_long_names() {
        assert_eq!("weighted".parse::<WeightMode>(), Ok(WeightMode::Weighted));
        assert_eq!("U".parse::<WeightMode>(), Ok(WeightMode::Unweighted));
        assert!("binary".parse::<WeightMode>().is_err());
    }

    #[test]
    fn unweighted_mark_is_presence_indicator() {
        assert_eq!(WeightMode::Unweighted.mark(3.7), 1.0);
        assert_eq!(WeightMode::Unweighted.mark(-2.0), 1.0);
        assert_eq!(WeightMode::Unweighted.mark(0.0), 0.0);
        assert_eq!(WeightMode::Weighted.mark(3.7), 3.7);
    }

    #[test]
    fn ktable_rejects_transposed_values() {
        let values = array![[1.0, 2.0, 3.0]];
        let err = KTable::new(vec![1.0, 2.0, 3.0], vec!["A".into()], values).unwrap_err();
        assert!(matches!(err, RipleyError::ShapeMismatch(_)));
    }

    #[test]
    fn ktable_gene_column_by_label() {
        let table = KTable::new(
            vec![1.0, 2.0],
            vec!["A".into(), "B".into()],
            array![[1.0, 10.0], [2.0, 20.0]],
        )
        .unwrap();
        assert_eq!(table.gene_column("B"), Some(vec![10.0, 20.0]));
        assert_eq!(table.gene_column("C"), None);
    }
}
