//! Module for the dense pairwise distance matrix and per-gene weight products
use crate::WeightMode;
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};

/// Calculates the full N x N Euclidean distance matrix between spots.
/// The matrix is symmetric with a zero diagonal.
/// Rows are filled in parallel on the global rayon pool.
///
/// # Arguments
/// * `x` - Spot coordinates on the first axis
/// * `y` - Spot coordinates on the second axis, same length as `x`
pub fn pairwise_distances(x: &[f64], y: &[f64]) -> Array2<f64> {
    let n = x.len();
    log::debug!("Computing pairwise distance matrix ({} x {})", n, n);

    let mut dist = Array2::<f64>::zeros((n, n));
    Zip::indexed(&mut dist).par_for_each(|(i, j), d| {
        *d = (x[i] - x[j]).hypot(y[i] - y[j]);
    });

    dist
}

/// Applies the weight mode to a mark vector, always returning a fresh copy.
/// The caller's marks are never modified.
pub fn apply_mode(marks: ArrayView1<f64>, mode: WeightMode) -> Array1<f64> {
    marks.mapv(|v| mode.mark(v))
}

/// Outer product of one gene's marks with the protein marks:
/// `products[[i, j]] = gene[i] * protein[j]`.
pub fn weight_products(gene: ArrayView1<f64>, protein: ArrayView1<f64>) -> Array2<f64> {
    let gene_col = gene.insert_axis(Axis(1)); // (n, 1)
    let protein_row = protein.insert_axis(Axis(0)); // (1, n)
    gene_col.dot(&protein_row)
}

/// Row sums of `weights` restricted to entries whose distance is within `radius` (inclusive).
pub fn masked_row_sums(distances: &Array2<f64>, weights: &Array2<f64>, radius: f64) -> Array1<f64> {
    distances
        .outer_iter()
        .zip(weights.outer_iter())
        .map(|(d_row, w_row)| {
            d_row
                .iter()
                .zip(w_row.iter())
                .filter(|(&d, _)| d <= radius)
                .map(|(_, &w)| w)
                .sum::<f64>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn distances_are_symmetric_with_zero_diagonal() {
        let x = [0.0, 3.0, 1.5, 7.0];
        let y = [0.0, 4.0, 2.0, -1.0];
        let dist = pairwise_distances(&x, &y);

        assert_eq!(dist.dim(), (4, 4));
        for i in 0..4 {
            assert_eq!(dist[[i, i]], 0.0);
            for j in 0..4 {
                assert_eq!(dist[[i, j]], dist[[j, i]]);
            }
        }
        assert_relative_eq!(dist[[0, 1]], 5.0);
    }

    #[test]
    fn weight_products_is_outer_product() {
        let gene = array![1.0, 0.0, 2.0];
        let protein = array![3.0, 4.0, 5.0];
        let products = weight_products(gene.view(), protein.view());

        assert_eq!(
            products,
            array![[3.0, 4.0, 5.0], [0.0, 0.0, 0.0], [6.0, 8.0, 10.0]]
        );
    }

    #[test]
    fn masked_row_sums_include_boundary() {
        let dist = pairwise_distances(&[0.0, 1.0, 3.0], &[0.0, 0.0, 0.0]);
        let weights = Array2::<f64>::ones((3, 3));

        assert_eq!(masked_row_sums(&dist, &weights, 1.0), array![2.0, 2.0, 1.0]);
        assert_eq!(masked_row_sums(&dist, &weights, 2.0), array![2.0, 3.0, 2.0]);
        assert_eq!(masked_row_sums(&dist, &weights, 0.0), array![1.0, 1.0, 1.0]);
    }

    #[test]
    fn apply_mode_copies_and_binarizes() {
        let marks = array![0.0, 2.5, -1.0, 0.0];
        let binary = apply_mode(marks.view(), WeightMode::Unweighted);

        assert_eq!(binary, array![0.0, 1.0, 1.0, 0.0]);
        assert_eq!(marks, array![0.0, 2.5, -1.0, 0.0]);
    }
}
