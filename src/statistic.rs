//! Module for the Ripley's K based statistic: weighted minus unweighted K,
//! averaged over a radius window.
use crate::{KTable, RipleyError};
use statrs::statistics::Statistics;

/// Default lower bound of the averaging window.
pub const DEFAULT_RADIUS_LOW: f64 = 1.0;

/// One value per gene: the mean difference over the selected radii.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct StatisticSummary {
    pub gene_names: Vec<String>,
    pub values: Vec<f64>,
    /// Window actually used, after default substitution
    pub radius_low: f64,
    pub radius_up: f64,
    /// Number of radii that fell inside the window
    pub n_radii_used: usize,
}

/// Output of [`derive_statistic`].
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct RipleyStatistic {
    /// Weighted minus unweighted K at every radius
    pub delta: KTable,
    pub summary: StatisticSummary,
}

/// Long-format row of the delta table, convenient for plotting.
#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub radius: f64,
    pub gene: String,
    pub weighted_k: f64,
    pub unweighted_k: f64,
    pub delta: f64,
}

/// Checks that two K tables share radii and gene columns, in the same order.
fn check_alignment(weighted: &KTable, unweighted: &KTable) -> Result<(), RipleyError> {
    if weighted.radii.len() != unweighted.radii.len() {
        return Err(RipleyError::RadiusMismatch(format!(
            "weighted table has {} radii, unweighted table has {}",
            weighted.radii.len(),
            unweighted.radii.len()
        )));
    }
    if let Some((i, (w, u))) = weighted
        .radii
        .iter()
        .zip(unweighted.radii.iter())
        .enumerate()
        .find(|(_, (w, u))| w != u)
    {
        return Err(RipleyError::RadiusMismatch(format!(
            "row {} has radius {} in the weighted table but {} in the unweighted table",
            i, w, u
        )));
    }
    if weighted.gene_names != unweighted.gene_names {
        return Err(RipleyError::ShapeMismatch(format!(
            "gene columns differ: {} weighted vs {} unweighted",
            weighted.n_genes(),
            unweighted.n_genes()
        )));
    }
    Ok(())
}

/// Subtracts the unweighted K table from the weighted one and averages the
/// difference per gene over radii in `[radius_low, radius_up]`.
///
/// `radius_up = None` selects up to the largest radius in the tables.
/// Fails with `RadiusMismatch` if the radius columns differ, `InvalidRange` for
/// an inverted window and `EmptySelection` when no radius falls in the window.
pub fn derive_statistic(
    weighted: &KTable,
    unweighted: &KTable,
    radius_low: f64,
    radius_up: Option<f64>,
) -> Result<RipleyStatistic, RipleyError> {
    check_alignment(weighted, unweighted)?;

    if weighted.radii.is_empty() {
        return Err(RipleyError::EmptySelection("K tables have no radii".into()));
    }

    let radius_up = radius_up
        .unwrap_or_else(|| weighted.radii.iter().copied().fold(f64::NEG_INFINITY, f64::max));
    if radius_low.is_nan() || radius_up.is_nan() || radius_low > radius_up {
        return Err(RipleyError::InvalidRange(format!(
            "radius window [{}, {}] is not a valid interval",
            radius_low, radius_up
        )));
    }

    let delta_values = &weighted.values - &unweighted.values;
    let delta = KTable::new(
        weighted.radii.clone(),
        weighted.gene_names.clone(),
        delta_values,
    )?;

    let selected: Vec<usize> = delta
        .radii
        .iter()
        .enumerate()
        .filter(|(_, &r)| r >= radius_low && r <= radius_up)
        .map(|(idx, _)| idx)
        .collect();

    if selected.is_empty() {
        return Err(RipleyError::EmptySelection(format!(
            "no radius in [{}, {}]; tables span {} to {}",
            radius_low,
            radius_up,
            delta.radii[0],
            delta.radii[delta.n_radii() - 1]
        )));
    }

    log::info!(
        "Averaging K differences for {} genes over {} radii in [{}, {}]",
        delta.n_genes(),
        selected.len(),
        radius_low,
        radius_up
    );

    let values: Vec<f64> = delta
        .values
        .columns()
        .into_iter()
        .map(|column| selected.iter().map(|&idx| column[idx]).mean())
        .collect();

    let summary = StatisticSummary {
        gene_names: delta.gene_names.clone(),
        values,
        radius_low,
        radius_up,
        n_radii_used: selected.len(),
    };

    Ok(RipleyStatistic { delta, summary })
}

/// Flattens the delta table to one record per (radius, gene), radius-major.
pub fn delta_records(
    weighted: &KTable,
    unweighted: &KTable,
    statistic: &RipleyStatistic,
) -> Result<Vec<DeltaRecord>, RipleyError> {
    check_alignment(weighted, unweighted)?;
    check_alignment(weighted, &statistic.delta)?;

    let mut records = Vec::with_capacity(weighted.n_radii() * weighted.n_genes());
    for (r_idx, &radius) in weighted.radii.iter().enumerate() {
        for (g_idx, gene) in weighted.gene_names.iter().enumerate() {
            records.push(DeltaRecord {
                radius,
                gene: gene.clone(),
                weighted_k: weighted.values[[r_idx, g_idx]],
                unweighted_k: unweighted.values[[r_idx, g_idx]],
                delta: statistic.delta.values[[r_idx, g_idx]],
            });
        }
    }
    Ok(records)
}
