//! Module for the mark-weighted Ripley's K function
use crate::distance::{apply_mode, masked_row_sums, pairwise_distances, weight_products};
use crate::{KTable, RipleyError, WeightMode};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;

/// Slack when deciding whether the last step still lands on `r_max`.
const RADIUS_EPS: f64 = 1e-9;

/// Upper bound on the number of radii in one evaluation.
pub const MAX_RADII: usize = 1_000_000;

/// Parameters of one K function evaluation.
/// Optional fields fall back to defaults derived from the data.
#[derive(Debug, Clone, PartialEq)]
pub struct RipleyParams {
    /// First radius (default 1)
    pub r_min: f64,
    /// Last radius, inclusive. Defaults to the smaller of max(x), max(y).
    pub r_max: Option<f64>,
    /// Spacing between radii (default 1)
    pub r_step: f64,
    /// Study area. Defaults to max(x) * max(y).
    pub area: Option<f64>,
    /// Weighted or presence/absence marks
    pub mode: WeightMode,
    /// Number of leading gene columns to analyse. Defaults to all of them.
    pub n_genes: Option<usize>,
    /// Gene labels for the tabular output. Defaults to `Gene_1..Gene_G`.
    pub gene_names: Option<Vec<String>>,
}

impl Default for RipleyParams {
    fn default() -> Self {
        RipleyParams {
            r_min: 1.0,
            r_max: None,
            r_step: 1.0,
            area: None,
            mode: WeightMode::Weighted,
            n_genes: None,
            gene_names: None,
        }
    }
}

/// Inputs after validation and default substitution.
struct ResolvedParams {
    radii: Vec<f64>,
    area: f64,
    n_genes: usize,
}

/// Largest coordinate on an axis, or `None` when the axis has no positive extent.
fn axis_extent(coords: &[f64]) -> Option<f64> {
    let max = coords.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (max.is_finite() && max > 0.0).then_some(max)
}

/// Default study area: the rectangle spanned by the origin and (max(x), max(y)).
/// An axis without positive extent contributes a side of 1.
pub fn default_area(x: &[f64], y: &[f64]) -> f64 {
    let side = |coords: &[f64], name: &str| match axis_extent(coords) {
        Some(extent) => extent,
        None => {
            log::warn!("No positive extent along {}; using a side of 1 for the default area", name);
            1.0
        }
    };
    side(x, "x") * side(y, "y")
}

/// Default last radius: the smaller of max(x), max(y), ignoring axes without positive extent.
pub fn default_r_max(x: &[f64], y: &[f64]) -> f64 {
    match (axis_extent(x), axis_extent(y)) {
        (Some(mx), Some(my)) => mx.min(my),
        (Some(m), None) | (None, Some(m)) => m,
        (None, None) => 0.0,
    }
}

/// Evenly spaced radii from `r_min` to `r_max`, both inclusive.
pub fn radius_sequence(r_min: f64, r_max: f64, r_step: f64) -> Result<Vec<f64>, RipleyError> {
    if !r_step.is_finite() || r_step <= 0.0 {
        return Err(RipleyError::InvalidRange(format!(
            "r_step must be positive, got {}",
            r_step
        )));
    }
    if !r_min.is_finite() || r_min < 0.0 {
        return Err(RipleyError::InvalidRange(format!(
            "r_min must be a nonnegative number, got {}",
            r_min
        )));
    }
    if !r_max.is_finite() || r_min > r_max {
        return Err(RipleyError::InvalidRange(format!(
            "r_min ({}) exceeds r_max ({})",
            r_min, r_max
        )));
    }

    let n_steps = ((r_max - r_min) / r_step + RADIUS_EPS).floor();
    if !n_steps.is_finite() || n_steps >= MAX_RADII as f64 {
        return Err(RipleyError::InvalidRange(format!(
            "r_step {} over [{}, {}] gives more than {} radii",
            r_step, r_min, r_max, MAX_RADII
        )));
    }
    let n_steps = n_steps as usize;
    Ok((0..=n_steps).map(|k| r_min + k as f64 * r_step).collect())
}

fn validate_shapes(
    x: &[f64],
    y: &[f64],
    protein: &[f64],
    genes: &Array2<f64>,
) -> Result<(), RipleyError> {
    let n = x.len();
    if n == 0 {
        return Err(RipleyError::ShapeMismatch("point set is empty".into()));
    }
    if y.len() != n {
        return Err(RipleyError::ShapeMismatch(format!(
            "x has {} points but y has {}",
            n,
            y.len()
        )));
    }
    if let Some(i) = x.iter().zip(y).position(|(a, b)| !a.is_finite() || !b.is_finite()) {
        return Err(RipleyError::InvalidRange(format!(
            "point {} has non-finite coordinates ({}, {})",
            i, x[i], y[i]
        )));
    }
    if protein.len() != n {
        return Err(RipleyError::ShapeMismatch(format!(
            "protein weights have {} values but there are {} points",
            protein.len(),
            n
        )));
    }
    if genes.nrows() != n {
        return Err(RipleyError::ShapeMismatch(format!(
            "gene matrix has {} rows but there are {} points",
            genes.nrows(),
            n
        )));
    }
    Ok(())
}

fn resolve_params(
    x: &[f64],
    y: &[f64],
    protein: &[f64],
    genes: &Array2<f64>,
    params: &RipleyParams,
) -> Result<ResolvedParams, RipleyError> {
    validate_shapes(x, y, protein, genes)?;

    let n_genes = params.n_genes.unwrap_or(genes.ncols());
    if n_genes == 0 || n_genes > genes.ncols() {
        return Err(RipleyError::ShapeMismatch(format!(
            "requested {} genes but the gene matrix has {} columns",
            n_genes,
            genes.ncols()
        )));
    }

    let r_max = params.r_max.unwrap_or_else(|| default_r_max(x, y));
    let radii = radius_sequence(params.r_min, r_max, params.r_step)?;

    let area = match params.area {
        Some(a) if !a.is_finite() || a <= 0.0 => {
            return Err(RipleyError::InvalidRange(format!("area must be positive, got {}", a)));
        }
        Some(a) => a,
        None => default_area(x, y),
    };

    Ok(ResolvedParams { radii, area, n_genes })
}

/// K values of a single gene across all radii.
/// Ratios that are not finite (spots whose row of weight products sums to zero)
/// are left out of the sum.
fn k_values_for_gene(
    distances: &Array2<f64>,
    gene: ArrayView1<f64>,
    protein: ArrayView1<f64>,
    radii: &[f64],
    area: f64,
) -> Vec<f64> {
    let products = weight_products(gene, protein);
    let denominators = products.sum_axis(Axis(1));

    radii
        .iter()
        .map(|&radius| {
            let within = masked_row_sums(distances, &products, radius);
            let total: f64 = within
                .iter()
                .zip(denominators.iter())
                .map(|(w, d)| w / d)
                .filter(|ratio| ratio.is_finite())
                .sum();
            total * area
        })
        .collect()
}

/// Validates inputs, then evaluates every gene at every radius.
/// Returns the radii together with the (n_genes, n_radii) matrix.
fn evaluate(
    x: &[f64],
    y: &[f64],
    protein: &[f64],
    genes: &Array2<f64>,
    params: &RipleyParams,
) -> Result<(Vec<f64>, Array2<f64>), RipleyError> {
    let resolved = resolve_params(x, y, protein, genes, params)?;
    let n_radii = resolved.radii.len();

    log::info!(
        "Computing {} Ripley's K for {} genes over {} points",
        params.mode.label(),
        resolved.n_genes,
        x.len()
    );
    log::info!(
        "  Radii: {} values from {} to {} (area = {})",
        n_radii,
        resolved.radii[0],
        resolved.radii[n_radii - 1],
        resolved.area
    );

    let distances = pairwise_distances(x, y);
    let protein_marks = apply_mode(ArrayView1::from(protein), params.mode);

    let rows: Vec<Vec<f64>> = (0..resolved.n_genes)
        .into_par_iter()
        .map(|g| {
            let gene_marks: Array1<f64> = apply_mode(genes.column(g), params.mode);
            let k = k_values_for_gene(
                &distances,
                gene_marks.view(),
                protein_marks.view(),
                &resolved.radii,
                resolved.area,
            );
            log::trace!("Gene column {} done: K(r_max) = {:.4}", g, k[n_radii - 1]);
            k
        })
        .collect();

    let k_matrix = Array2::from_shape_fn((resolved.n_genes, n_radii), |(g, r)| rows[g][r]);
    log::info!("Ripley's K computed with shape {:?}", k_matrix.dim());

    Ok((resolved.radii, k_matrix))
}

/// Calculates the raw Ripley's K matrix, shape (n_genes, n_radii).
///
/// Genes are evaluated in parallel on the global rayon pool; the result does not
/// depend on the number of threads. Marks are copied before binarization in
/// unweighted mode, so `protein` and `genes` are left untouched.
pub fn compute_ripley_k_matrix(
    x: &[f64],
    y: &[f64],
    protein: &[f64],
    genes: &Array2<f64>,
    params: &RipleyParams,
) -> Result<Array2<f64>, RipleyError> {
    evaluate(x, y, protein, genes, params).map(|(_, k_matrix)| k_matrix)
}

/// Calculates Ripley's K in tabular form: one row per radius, one column per gene.
/// When `params.gene_names` is `None`, genes are labelled `Gene_1..Gene_G` and a
/// notice is logged.
pub fn compute_ripley_k(
    x: &[f64],
    y: &[f64],
    protein: &[f64],
    genes: &Array2<f64>,
    params: &RipleyParams,
) -> Result<KTable, RipleyError> {
    let n_genes = params.n_genes.unwrap_or(genes.ncols());

    let gene_names = match &params.gene_names {
        Some(names) => {
            if names.len() != n_genes {
                return Err(RipleyError::ShapeMismatch(format!(
                    "{} gene names supplied for {} genes",
                    names.len(),
                    n_genes
                )));
            }
            names.clone()
        }
        None => {
            log::warn!("Gene names are not provided. Using default names.");
            (1..=n_genes).map(|i| format!("Gene_{}", i)).collect()
        }
    };

    let (radii, k_matrix) = evaluate(x, y, protein, genes, params)?;
    KTable::new(radii, gene_names, k_matrix.t().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn radius_sequence_is_inclusive() {
        assert_eq!(radius_sequence(1.0, 3.0, 1.0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(radius_sequence(2.0, 2.0, 1.0).unwrap(), vec![2.0]);
    }

    #[test]
    fn radius_sequence_does_not_overshoot() {
        let radii = radius_sequence(1.0, 2.0, 0.4).unwrap();
        assert_eq!(radii.len(), 3);
        assert_relative_eq!(radii[2], 1.8);

        let radii = radius_sequence(0.0, 1.0, 0.1).unwrap();
        assert_eq!(radii.len(), 11);
        assert_relative_eq!(radii[10], 1.0);
    }

    #[test]
    fn radius_sequence_rejects_bad_ranges() {
        for (r_min, r_max, r_step) in [
            (1.0, 3.0, 0.0),
            (1.0, 3.0, -1.0),
            (4.0, 3.0, 1.0),
            (-1.0, 3.0, 1.0),
            (1.0, f64::NAN, 1.0),
        ] {
            assert!(matches!(
                radius_sequence(r_min, r_max, r_step),
                Err(RipleyError::InvalidRange(_))
            ));
        }
    }

    #[test]
    fn radius_sequence_rejects_oversized_step_count() {
        for (r_min, r_max, r_step) in [
            (0.0, 3.0, 1e-300),
            (0.0, f64::MAX, 1.0),
            (0.0, 1.0, 1e-6),
        ] {
            assert!(matches!(
                radius_sequence(r_min, r_max, r_step),
                Err(RipleyError::InvalidRange(_))
            ));
        }
        assert_eq!(radius_sequence(0.0, 1.0, 1e-5).unwrap().len(), 100_001);
    }

    #[test]
    fn default_area_uses_bounding_rectangle() {
        assert_eq!(default_area(&[0.0, 4.0, 2.0], &[1.0, 3.0, 0.0]), 12.0);
    }

    #[test]
    fn default_area_treats_flat_axis_as_unit() {
        assert_eq!(default_area(&[0.0, 1.0, 3.0], &[0.0, 0.0, 0.0]), 3.0);
        assert_eq!(default_area(&[0.0], &[0.0]), 1.0);
    }

    #[test]
    fn default_r_max_skips_flat_axis() {
        assert_eq!(default_r_max(&[0.0, 5.0], &[0.0, 8.0]), 5.0);
        assert_eq!(default_r_max(&[0.0, 1.0, 3.0], &[0.0, 0.0, 0.0]), 3.0);
        assert_eq!(default_r_max(&[0.0], &[0.0]), 0.0);
    }
}
