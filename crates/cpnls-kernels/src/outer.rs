//! Composing a full tensor from CP factor matrices
//!
//! `X = Σᵣ U₀[:, r] ∘ U₁[:, r] ∘ ... ∘ U_{N-1}[:, r]`

use crate::error::KernelResult;
use crate::mttkrp::validate_factors;
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array, Array2, Axis, IxDyn};

/// Build the dense tensor represented by a list of CP factor matrices
///
/// The rank axis is carried through successive outer products and summed
/// out at the end.
///
/// # Complexity
///
/// Time: O(R × ∏ Iₖ)
/// Space: O(R × ∏ Iₖ)
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::cp_compose;
///
/// let a = array![[1.0], [2.0]];
/// let b = array![[3.0], [4.0], [5.0]];
/// let x = cp_compose(&[a, b]).unwrap();
/// assert_eq!(x.shape(), &[2, 3]);
/// assert_eq!(x[[1, 2]], 10.0);
/// ```
pub fn cp_compose<T: CpScalar>(factors: &[Array2<T>]) -> KernelResult<Array<T, IxDyn>> {
    let shape: Vec<usize> = factors.iter().map(|f| f.nrows()).collect();
    let rank = validate_factors("cp_compose", &shape, factors)?;

    // acc has shape (I₀, .., I_{n-1}, R)
    let mut acc: Array<T, IxDyn> = factors[0].clone().into_dyn();
    for (n, factor) in factors.iter().enumerate().skip(1) {
        let mut next_shape = shape[..=n].to_vec();
        next_shape.push(rank);
        let mut next = Array::<T, IxDyn>::zeros(IxDyn(&next_shape));

        for i in 0..factor.nrows() {
            let mut slab = next.index_axis_mut(Axis(n), i);
            for r in 0..rank {
                let w = factor[[i, r]];
                if w != T::zero() {
                    slab.index_axis_mut(Axis(n), r)
                        .scaled_add(w, &acc.index_axis(Axis(n), r));
                }
            }
        }
        acc = next;
    }

    Ok(acc.sum_axis(Axis(factors.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    #[test]
    fn test_compose_rank2_three_modes() {
        let a = array![[1.0, 2.0], [0.5, -1.0]];
        let b = array![[1.0, 0.0], [2.0, 1.0], [0.0, 3.0]];
        let c = array![[1.0, 1.0], [-1.0, 2.0]];
        let x = cp_compose(&[a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(x.shape(), &[2, 3, 2]);

        for i in 0..2 {
            for j in 0..3 {
                for k in 0..2 {
                    let expected: f64 = (0..2).map(|r| a[[i, r]] * b[[j, r]] * c[[k, r]]).sum();
                    assert!((x[[i, j, k]] - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_compose_single_mode_sums_columns() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let x = cp_compose(&[a]).unwrap();
        assert_eq!(x.shape(), &[2]);
        assert_eq!(x[[1]], 7.0);
    }

    #[test]
    fn test_compose_rejects_rank_mismatch() {
        let a = Array2::<f64>::ones((2, 2));
        let b = Array2::<f64>::ones((2, 3));
        assert!(cp_compose(&[a, b]).is_err());
    }
}
