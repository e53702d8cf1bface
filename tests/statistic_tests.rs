//! Tests for the weighted minus unweighted statistic, on tables produced by the engine.

use approx::assert_relative_eq;
use ndarray::array;
use ripley_k_rust::{
    compute_ripley_k, derive_statistic, statistic::delta_records, KTable, RipleyError,
    RipleyParams, WeightMode,
};

fn spot_fixture() -> (Vec<f64>, Vec<f64>, Vec<f64>, ndarray::Array2<f64>) {
    let x = vec![0.0, 1.0, 2.0, 3.0, 1.0, 4.0];
    let y = vec![0.0, 1.0, 0.0, 2.0, 3.0, 4.0];
    let protein = vec![5.0, 0.0, 2.0, 1.5, 3.0, 0.5];
    let genes = array![
        [3.0, 0.0],
        [1.0, 2.0],
        [0.0, 4.0],
        [2.0, 1.0],
        [5.0, 0.0],
        [1.0, 1.0]
    ];
    (x, y, protein, genes)
}

/// Identical tables give an all-zero delta and statistic for any window.
#[test]
fn test_identical_tables_give_zero_statistic() {
    let (x, y, protein, genes) = spot_fixture();
    let table = compute_ripley_k(&x, &y, &protein, &genes, &RipleyParams::default()).unwrap();

    for (low, up) in [(1.0, Some(1.0)), (1.0, None), (2.0, Some(4.0))] {
        let stat = derive_statistic(&table, &table, low, up).unwrap();
        assert!(stat.delta.values.iter().all(|&v| v == 0.0));
        assert!(stat.summary.values.iter().all(|&v| v == 0.0));
        assert_eq!(stat.delta.radii, table.radii);
    }
}

/// The statistic on engine output equals a hand-rolled mean of the differences.
#[test]
fn test_statistic_matches_manual_mean() {
    let (x, y, protein, genes) = spot_fixture();
    let base = RipleyParams {
        r_min: 1.0,
        r_max: Some(4.0),
        r_step: 0.5,
        gene_names: Some(vec!["CD3E".into(), "PCNA".into()]),
        ..RipleyParams::default()
    };
    let weighted = compute_ripley_k(&x, &y, &protein, &genes, &base).unwrap();
    let unweighted = compute_ripley_k(
        &x,
        &y,
        &protein,
        &genes,
        &RipleyParams { mode: WeightMode::Unweighted, ..base.clone() },
    )
    .unwrap();

    let stat = derive_statistic(&weighted, &unweighted, 1.5, Some(3.0)).unwrap();

    // radii 1.5, 2.0, 2.5, 3.0 are rows 1..=4
    assert_eq!(stat.summary.n_radii_used, 4);
    for g in 0..2 {
        let expected: f64 = (1..=4)
            .map(|r| weighted.values[[r, g]] - unweighted.values[[r, g]])
            .sum::<f64>()
            / 4.0;
        assert_relative_eq!(stat.summary.values[g], expected, epsilon = 1e-9);
    }
    assert_eq!(stat.summary.gene_names, vec!["CD3E", "PCNA"]);
}

/// The worked derivation example: mean of 3 and 4.
#[test]
fn test_window_example() {
    let weighted = KTable::new(vec![1.0, 2.0, 3.0], vec!["G".into()], array![[5.0], [7.0], [9.0]]).unwrap();
    let unweighted = KTable::new(vec![1.0, 2.0, 3.0], vec!["G".into()], array![[2.0], [3.0], [4.0]]).unwrap();

    let stat = derive_statistic(&weighted, &unweighted, 1.0, Some(2.0)).unwrap();

    assert_relative_eq!(stat.summary.values[0], 3.5);
    assert_eq!(stat.summary.radius_up, 2.0);
}

/// Tables computed over different radii cannot be combined.
#[test]
fn test_tables_with_different_radii_are_rejected() {
    let (x, y, protein, genes) = spot_fixture();
    let coarse = compute_ripley_k(&x, &y, &protein, &genes, &RipleyParams::default()).unwrap();
    let fine = compute_ripley_k(
        &x,
        &y,
        &protein,
        &genes,
        &RipleyParams { r_step: 0.5, ..RipleyParams::default() },
    )
    .unwrap();

    assert!(matches!(
        derive_statistic(&coarse, &fine, 1.0, None),
        Err(RipleyError::RadiusMismatch(_))
    ));
}

#[test]
fn test_delta_records_cover_every_cell() {
    let (x, y, protein, genes) = spot_fixture();
    let weighted = compute_ripley_k(&x, &y, &protein, &genes, &RipleyParams::default()).unwrap();
    let unweighted = compute_ripley_k(
        &x,
        &y,
        &protein,
        &genes,
        &RipleyParams { mode: WeightMode::Unweighted, ..RipleyParams::default() },
    )
    .unwrap();
    let stat = derive_statistic(&weighted, &unweighted, 1.0, None).unwrap();

    let records = delta_records(&weighted, &unweighted, &stat).unwrap();

    assert_eq!(records.len(), weighted.n_radii() * weighted.n_genes());
    for record in &records {
        assert_relative_eq!(record.delta, record.weighted_k - record.unweighted_k, epsilon = 1e-12);
    }
}
