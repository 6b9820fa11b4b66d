//! Single-mode tensor contractions against factor matrices
//!
//! These are the two einsum shapes that the gradient engine chains together:
//!
//! - [`contract_mode_first`]: `abc,bR->acR`, the first contraction of the raw
//!   tensor introduces a trailing rank axis
//! - [`contract_mode_carry`]: `abR,bR->aR`, later contractions share the
//!   rank index with the partially contracted tensor
//!
//! Chaining `N-1` of them against every factor but one yields the MTTKRP.

use crate::error::{KernelError, KernelResult};
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array, ArrayView, ArrayView2, Axis, IxDyn};

/// Contract mode `axis` of a raw tensor against a factor matrix
///
/// `out[i₀, .., î_axis, .., r] = Σⱼ X[i₀, .., j, ..] · F[j, r]`
///
/// The contracted axis is removed and a rank axis of length `R` is appended.
///
/// # Complexity
///
/// Time: O(∏ Iₖ × R)
/// Space: O(∏_{k≠axis} Iₖ × R)
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::{Array, Array2, IxDyn};
/// use cpnls_kernels::contract_mode_first;
///
/// let x = Array::<f64, _>::ones(IxDyn(&[2, 3, 4]));
/// let f = Array2::<f64>::ones((4, 5));
/// let out = contract_mode_first(&x.view(), &f.view(), 2).unwrap();
/// assert_eq!(out.shape(), &[2, 3, 5]);
/// assert_eq!(out[[0, 0, 0]], 4.0);
/// ```
pub fn contract_mode_first<T: CpScalar>(
    tensor: &ArrayView<T, IxDyn>,
    factor: &ArrayView2<T>,
    axis: usize,
) -> KernelResult<Array<T, IxDyn>> {
    let shape = tensor.shape();
    if axis >= shape.len() {
        return Err(KernelError::invalid_mode(
            axis,
            shape.len(),
            "contract_mode_first: axis out of bounds",
        ));
    }
    if shape[axis] != factor.nrows() {
        return Err(KernelError::dimension_mismatch(
            "contract_mode_first",
            vec![shape[axis], factor.ncols()],
            factor.shape().to_vec(),
            format!("Factor rows must equal the size of mode {}", axis),
        ));
    }

    let rank = factor.ncols();
    let mut out_shape: Vec<usize> = shape
        .iter()
        .enumerate()
        .filter(|&(k, _)| k != axis)
        .map(|(_, &s)| s)
        .collect();
    out_shape.push(rank);
    let rank_axis = Axis(out_shape.len() - 1);

    let mut out = Array::<T, IxDyn>::zeros(IxDyn(&out_shape));
    for j in 0..shape[axis] {
        let slab = tensor.index_axis(Axis(axis), j);
        for r in 0..rank {
            let w = factor[[j, r]];
            if w != T::zero() {
                out.index_axis_mut(rank_axis, r).scaled_add(w, &slab);
            }
        }
    }

    Ok(out)
}

/// Contract mode `axis` of a partially contracted tensor that already
/// carries a trailing rank axis
///
/// `out[i₀, .., î_axis, .., r] = Σⱼ M[i₀, .., j, .., r] · F[j, r]`
///
/// `axis` must not be the trailing rank axis.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::{Array, Array2, IxDyn};
/// use cpnls_kernels::contract_mode_carry;
///
/// let m = Array::<f64, _>::ones(IxDyn(&[2, 3, 5]));
/// let f = Array2::<f64>::from_elem((3, 5), 2.0);
/// let out = contract_mode_carry(&m.view(), &f.view(), 1).unwrap();
/// assert_eq!(out.shape(), &[2, 5]);
/// assert_eq!(out[[1, 4]], 6.0);
/// ```
pub fn contract_mode_carry<T: CpScalar>(
    partial: &ArrayView<T, IxDyn>,
    factor: &ArrayView2<T>,
    axis: usize,
) -> KernelResult<Array<T, IxDyn>> {
    let shape = partial.shape();
    if shape.len() < 2 || axis >= shape.len() - 1 {
        return Err(KernelError::invalid_mode(
            axis,
            shape.len().saturating_sub(1),
            "contract_mode_carry: axis must precede the rank axis",
        ));
    }
    let rank = shape[shape.len() - 1];
    if shape[axis] != factor.nrows() || rank != factor.ncols() {
        return Err(KernelError::dimension_mismatch(
            "contract_mode_carry",
            vec![shape[axis], rank],
            factor.shape().to_vec(),
            format!("Factor must be {}x{} to contract mode {}", shape[axis], rank, axis),
        ));
    }

    let out_shape: Vec<usize> = shape
        .iter()
        .enumerate()
        .filter(|&(k, _)| k != axis)
        .map(|(_, &s)| s)
        .collect();
    let rank_axis = Axis(out_shape.len() - 1);

    let mut out = Array::<T, IxDyn>::zeros(IxDyn(&out_shape));
    for j in 0..shape[axis] {
        let slab = partial.index_axis(Axis(axis), j);
        for r in 0..rank {
            let w = factor[[j, r]];
            if w != T::zero() {
                out.index_axis_mut(rank_axis, r)
                    .scaled_add(w, &slab.index_axis(rank_axis, r));
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::{array, Array2};

    fn iota(shape: &[usize]) -> Array<f64, IxDyn> {
        let n: usize = shape.iter().product();
        Array::from_shape_vec(IxDyn(shape), (0..n).map(|x| x as f64).collect()).unwrap()
    }

    #[test]
    fn test_first_contraction_matches_loops() {
        let x = iota(&[2, 3, 4]);
        let f = array![[1.0, 0.5], [2.0, -1.0], [0.0, 3.0]];
        let out = contract_mode_first(&x.view(), &f.view(), 1).unwrap();
        assert_eq!(out.shape(), &[2, 4, 2]);

        for i in 0..2 {
            for k in 0..4 {
                for r in 0..2 {
                    let expected: f64 = (0..3).map(|j| x[[i, j, k]] * f[[j, r]]).sum();
                    assert!((out[[i, k, r]] - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_carry_contraction_matches_loops() {
        let m = iota(&[3, 2, 2]);
        let f = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let out = contract_mode_carry(&m.view(), &f.view(), 0).unwrap();
        assert_eq!(out.shape(), &[2, 2]);

        for i in 0..2 {
            for r in 0..2 {
                let expected: f64 = (0..3).map(|j| m[[j, i, r]] * f[[j, r]]).sum();
                assert!((out[[i, r]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_first_contraction_of_vector() {
        let x = iota(&[3]);
        let f = Array2::<f64>::ones((3, 2));
        let out = contract_mode_first(&x.view(), &f.view(), 0).unwrap();
        assert_eq!(out.shape(), &[2]);
        assert_eq!(out[[0]], 3.0);
    }

    #[test]
    fn test_contraction_shape_errors() {
        let x = iota(&[2, 3]);
        let f = Array2::<f64>::ones((4, 2));
        assert!(contract_mode_first(&x.view(), &f.view(), 1).is_err());
        assert!(contract_mode_first(&x.view(), &f.view(), 2).is_err());

        let m = iota(&[3, 2]);
        let g = Array2::<f64>::ones((3, 2));
        assert!(contract_mode_carry(&m.view(), &g.view(), 1).is_err());
    }
}
