//! Matricized Tensor Times Khatri-Rao Product (MTTKRP)
//!
//! `M = X₍ₙ₎ · (U_{N-1} ⊙ ... ⊙ U_{n+1} ⊙ U_{n-1} ⊙ ... ⊙ U₀)`
//!
//! computed without forming the Khatri-Rao product: the tensor is contracted
//! one mode at a time, from the last mode down, skipping mode `n`.

use crate::contractions::{contract_mode_carry, contract_mode_first};
use crate::error::{KernelError, KernelResult};
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array, Array2, ArrayView, Ix2, IxDyn};

/// Check that `factors` conform to `shape` and share one rank
///
/// Returns the common rank.
pub fn validate_factors<T>(
    operation: &str,
    shape: &[usize],
    factors: &[Array2<T>],
) -> KernelResult<usize> {
    if factors.is_empty() {
        return Err(KernelError::empty_input(operation, "factors"));
    }
    if factors.len() != shape.len() {
        return Err(KernelError::dimension_mismatch(
            operation,
            shape.to_vec(),
            factors.iter().map(|f| f.nrows()).collect(),
            format!(
                "Expected one factor per mode ({} modes, {} factors)",
                shape.len(),
                factors.len()
            ),
        ));
    }
    let rank = factors[0].ncols();
    for (i, factor) in factors.iter().enumerate() {
        if factor.ncols() != rank {
            return Err(KernelError::rank_mismatch(operation, rank, factor.ncols(), i));
        }
        if factor.nrows() != shape[i] {
            return Err(KernelError::dimension_mismatch(
                operation,
                vec![shape[i], rank],
                factor.shape().to_vec(),
                format!("Factor {} rows must equal mode size {}", i, shape[i]),
            ));
        }
    }
    Ok(rank)
}

/// MTTKRP of `tensor` with every factor except `mode`
///
/// Result shape is `(I_mode, R)`. For a one-mode tensor the Khatri-Rao
/// product is empty and the tensor is repeated across the `R` columns.
///
/// # Complexity
///
/// Time: O(∏ Iₖ × R) dominated by the first contraction
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::Array2;
/// use cpnls_core::DenseND;
/// use cpnls_kernels::mttkrp;
///
/// let tensor = DenseND::<f64>::ones(&[2, 3, 4]);
/// let factors = vec![
///     Array2::<f64>::ones((2, 3)),
///     Array2::<f64>::ones((3, 3)),
///     Array2::<f64>::ones((4, 3)),
/// ];
/// let m = mttkrp(&tensor.view(), &factors, 0).unwrap();
/// assert_eq!(m.shape(), &[2, 3]);
/// assert_eq!(m[[0, 0]], 12.0);
/// ```
pub fn mttkrp<T: CpScalar>(
    tensor: &ArrayView<T, IxDyn>,
    factors: &[Array2<T>],
    mode: usize,
) -> KernelResult<Array2<T>> {
    let shape = tensor.shape();
    let rank = validate_factors("mttkrp", shape, factors)?;
    if mode >= shape.len() {
        return Err(KernelError::invalid_mode(
            mode,
            shape.len(),
            "mttkrp: mode out of bounds",
        ));
    }

    if shape.len() == 1 {
        let column = tensor.iter().copied().collect::<Vec<T>>();
        return Ok(Array2::from_shape_fn((shape[0], rank), |(i, _)| column[i]));
    }

    // Descending order keeps every remaining axis index equal to its mode id
    let mut partial: Option<Array<T, IxDyn>> = None;
    for m in (0..shape.len()).rev().filter(|&m| m != mode) {
        let next = match &partial {
            None => contract_mode_first(tensor, &factors[m].view(), m)?,
            Some(p) => contract_mode_carry(&p.view(), &factors[m].view(), m)?,
        };
        partial = Some(next);
    }

    let partial = partial
        .ok_or_else(|| KernelError::operation_error("mttkrp", "no mode was contracted"))?;
    partial
        .into_dimensionality::<Ix2>()
        .map_err(|e| KernelError::operation_error("mttkrp", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    fn iota(shape: &[usize]) -> Array<f64, IxDyn> {
        let n: usize = shape.iter().product();
        Array::from_shape_vec(IxDyn(shape), (0..n).map(|x| (x as f64) * 0.1).collect()).unwrap()
    }

    #[test]
    fn test_mttkrp_matches_loops_every_mode() {
        let x = iota(&[2, 3, 4]);
        let factors = vec![
            array![[1.0, 0.5], [-1.0, 2.0]],
            array![[0.3, 1.0], [1.0, 1.0], [2.0, -0.5]],
            array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.5]],
        ];

        for mode in 0..3 {
            let m = mttkrp(&x.view(), &factors, mode).unwrap();
            for r in 0..2 {
                for idx in 0..x.shape()[mode] {
                    let mut expected = 0.0;
                    for i in 0..2 {
                        for j in 0..3 {
                            for k in 0..4 {
                                let coords = [i, j, k];
                                if coords[mode] != idx {
                                    continue;
                                }
                                let mut w = x[[i, j, k]];
                                for (n, &c) in coords.iter().enumerate() {
                                    if n != mode {
                                        w *= factors[n][[c, r]];
                                    }
                                }
                                expected += w;
                            }
                        }
                    }
                    assert!((m[[idx, r]] - expected).abs() < 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_mttkrp_single_mode() {
        let x = iota(&[3]);
        let factors = vec![Array2::<f64>::zeros((3, 2))];
        let m = mttkrp(&x.view(), &factors, 0).unwrap();
        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[2, 0]], m[[2, 1]]);
        assert!((m[[2, 1]] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_mttkrp_rejects_bad_factors() {
        let x = iota(&[2, 3]);
        let wrong_rows = vec![Array2::<f64>::ones((2, 2)), Array2::<f64>::ones((4, 2))];
        assert!(matches!(
            mttkrp(&x.view(), &wrong_rows, 0),
            Err(KernelError::DimensionMismatch { .. })
        ));

        let wrong_rank = vec![Array2::<f64>::ones((2, 2)), Array2::<f64>::ones((3, 3))];
        assert!(matches!(
            mttkrp(&x.view(), &wrong_rank, 0),
            Err(KernelError::RankMismatch { .. })
        ));
    }
}
