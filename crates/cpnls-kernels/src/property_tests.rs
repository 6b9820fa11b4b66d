//! Property-based tests for the dense kernels
//!
//! These tests check the factorization and reshaping identities the solver
//! relies on for random small inputs.

use super::*;
use proptest::prelude::*;
use scirs2_core::ndarray_ext::{Array1, Array2};

/// Row-major matrix from a pool of random entries
fn matrix(rows: usize, cols: usize, pool: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| pool[(i * cols + j) % pool.len()])
}

/// Lower triangular matrix with diagonal entries in `[1, 2)`
fn lower_triangular(n: usize, pool: &[f64]) -> Array2<f64> {
    let mut l = matrix(n, n, pool);
    for i in 0..n {
        l[[i, i]] = 1.5 + 0.5 * l[[i, i]];
        for j in (i + 1)..n {
            l[[i, j]] = 0.0;
        }
    }
    l
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .fold(0.0, |acc, (x, y)| acc.max((x - y).abs()))
}

proptest! {
    /// Test that flattening then reshaping returns the original list
    #[test]
    fn test_flatten_reshape_roundtrip(
        shapes in prop::collection::vec((1usize..6, 1usize..4), 1..5),
        pool in prop::collection::vec(-1.0f64..1.0, 1..32),
    ) {
        let list: Vec<Array2<f64>> = shapes
            .iter()
            .map(|&(rows, cols)| matrix(rows, cols, &pool))
            .collect();

        let flat = flatten(&list);
        prop_assert_eq!(flat.len(), num_variables(&list));
        let back = reshape_into_matrices(&flat.view(), &list).unwrap();
        prop_assert_eq!(back, list);
    }

    /// Test that a flat vector of the wrong length is rejected
    #[test]
    fn test_reshape_rejects_wrong_length(rows in 1usize..6, cols in 1usize..4) {
        let template = vec![Array2::<f64>::zeros((rows, cols))];
        let flat = Array1::<f64>::zeros(rows * cols + 1);
        prop_assert!(reshape_into_matrices(&flat.view(), &template).is_err());
    }

    /// Test that the Cholesky factor is lower triangular and reconstructs A
    #[test]
    fn test_cholesky_reconstructs_spd(
        n in 1usize..6,
        pool in prop::collection::vec(-1.0f64..1.0, 36),
    ) {
        // B·Bᵀ + n·I is symmetric positive definite
        let b = matrix(n, n, &pool);
        let mut a = b.dot(&b.t());
        for i in 0..n {
            a[[i, i]] += n as f64;
        }

        let l = cholesky(&a.view()).unwrap();
        for i in 0..n {
            prop_assert!(l[[i, i]] > 0.0);
            for j in (i + 1)..n {
                prop_assert_eq!(l[[i, j]], 0.0);
            }
        }
        let llt = l.dot(&l.t());
        prop_assert!(max_abs_diff(&llt, &a) < 1e-10 * (1.0 + n as f64));
    }

    /// Test all four triangular solve variants against their defining products
    #[test]
    fn test_triangular_solve_variants(
        n in 1usize..6,
        cols in 1usize..4,
        pool in prop::collection::vec(-1.0f64..1.0, 36),
        rhs_pool in prop::collection::vec(-1.0f64..1.0, 24),
    ) {
        let l = lower_triangular(n, &pool);
        let u = l.t().to_owned();
        let b_left = matrix(n, cols, &rhs_pool);
        let b_right = matrix(cols, n, &rhs_pool);

        for (m, lower) in [(&l, true), (&u, false)] {
            for transpose in [false, true] {
                let op = if transpose { m.t().to_owned() } else { m.clone() };

                let x = solve_triangular(&m.view(), &b_left.view(), lower, true, transpose).unwrap();
                prop_assert!(max_abs_diff(&op.dot(&x), &b_left) < 1e-9);

                let y = solve_triangular(&m.view(), &b_right.view(), lower, false, transpose).unwrap();
                prop_assert!(max_abs_diff(&y.dot(&op), &b_right) < 1e-9);
            }
        }
    }

    /// Test that X·(L·Lᵀ) = B holds after the two-sided Cholesky solve
    #[test]
    fn test_cholesky_solve_right_inverts(
        n in 1usize..6,
        rows in 1usize..4,
        pool in prop::collection::vec(-1.0f64..1.0, 36),
        rhs_pool in prop::collection::vec(-1.0f64..1.0, 24),
    ) {
        let l = lower_triangular(n, &pool);
        let a = l.dot(&l.t());
        let b = matrix(rows, n, &rhs_pool);

        let chol = cholesky(&a.view()).unwrap();
        let x = cholesky_solve_right(&chol.view(), &b.view()).unwrap();
        prop_assert!(max_abs_diff(&x.dot(&a), &b) < 1e-9);
    }

    /// Test that a Gram matrix is symmetric with a non-negative diagonal
    #[test]
    fn test_gram_is_symmetric(
        rows in 1usize..8,
        rank in 1usize..4,
        pool in prop::collection::vec(-1.0f64..1.0, 1..32),
    ) {
        let a = matrix(rows, rank, &pool);
        let g = gram_matrix(&a.view());
        prop_assert_eq!(g.dim(), (rank, rank));
        for i in 0..rank {
            prop_assert!(g[[i, i]] >= 0.0);
            for j in 0..rank {
                prop_assert!((g[[i, j]] - g[[j, i]]).abs() < 1e-12);
            }
        }
    }
}
