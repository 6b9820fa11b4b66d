//! Gauss-Newton gradient with shared partial contractions
//!
//! For every mode `n`:
//!
//! `gₙ = Aₙ·γ(n, n) − T ×̄ {Aₖ : k ≠ n}`
//!
//! The second term is an MTTKRP for each mode. Computing the N of them
//! independently repeats most of the contraction work, so the engine keeps a
//! stack of partially contracted tensors, each tagged with the modes it still
//! has. Target modes are taken from a work queue; for target `i` the stack is
//! popped until its top still contains `i`, then extended one contraction at
//! a time until `i` is the only mode left. Each extension contracts the last
//! remaining mode, or the one before it when the last mode is `i`.
//!
//! With the queue `0, 1, .., N-1` the first target pays `N-1` contractions
//! and later targets mostly reuse prefixes of the stack.

use crate::error::{NlsError, NlsResult};
use crate::gram::Coupling;
use cpnls_core::DenseND;
use cpnls_kernels::{CpScalar, KernelError, TensorBackend};
use scirs2_core::ndarray_ext::{Array, Array2, Ix2, IxDyn};
use std::collections::VecDeque;

/// A stack entry: the tensor contracted against every mode not in `modes`
///
/// Axes of `tensor` are `modes` in order followed by the rank axis.
struct Partial<T> {
    modes: Vec<usize>,
    tensor: Array<T, IxDyn>,
}

/// Gradient of `½‖T − [[A]]‖²` with respect to every factor
///
/// The caller is responsible for `factors` conforming to `tensor`
/// (see [`crate::utils::validate_problem`]); kernel shape errors are
/// propagated otherwise.
pub fn gradient<T, B>(
    backend: &B,
    tensor: &DenseND<T>,
    factors: &[Array2<T>],
    coupling: &Coupling<T>,
) -> NlsResult<Vec<Array2<T>>>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let n_modes = factors.len();
    let root_modes: Vec<usize> = (0..n_modes).collect();
    let mut queue: VecDeque<usize> = root_modes.iter().copied().collect();
    let mut stack: Vec<Partial<T>> = Vec::with_capacity(n_modes);
    let mut grads: Vec<Option<Array2<T>>> = vec![None; n_modes];

    while let Some(target) = queue.pop_front() {
        while stack
            .last()
            .is_some_and(|top| !top.modes.contains(&target))
        {
            stack.pop();
        }

        loop {
            let (modes, view, carries_rank) = match stack.last() {
                Some(top) => (&top.modes, top.tensor.view(), true),
                None => (&root_modes, tensor.view(), false),
            };
            if modes.len() <= 1 {
                break;
            }

            let last = modes.len() - 1;
            let axis = if modes[last] == target { last - 1 } else { last };
            let mode = modes[axis];
            let next = backend.contract_mode(&view, &factors[mode].view(), axis, carries_rank)?;

            let mut remaining = modes.clone();
            remaining.remove(axis);
            stack.push(Partial {
                modes: remaining,
                tensor: next,
            });
        }

        let contracted = match stack.last() {
            Some(top) => top
                .tensor
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|e| KernelError::operation_error("gradient", e.to_string()))?
                .to_owned(),
            None => {
                // Single-mode tensor: the contraction is T itself, repeated
                // across the rank columns
                let rank = factors[target].ncols();
                let column: Vec<T> = tensor.view().iter().copied().collect();
                Array2::from_shape_fn((column.len(), rank), |(i, _)| column[i])
            }
        };

        let mut g = backend.matmul(&factors[target].view(), &coupling.gamma(target, target).view());
        g -= &contracted;
        grads[target] = Some(g);
    }

    grads
        .into_iter()
        .enumerate()
        .map(|(mode, g)| {
            g.ok_or_else(|| {
                NlsError::from(KernelError::operation_error(
                    "gradient",
                    format!("mode {} was never visited", mode),
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gram::{compute_gamma, compute_gram};
    use cpnls_kernels::{mttkrp, LocalBackend};
    use scirs2_core::ndarray_ext::array;

    fn check_against_mttkrp(tensor: &DenseND<f64>, factors: &[Array2<f64>]) {
        let backend = LocalBackend;
        let gamma = compute_gamma(&backend, &compute_gram(&backend, factors));
        let grads = gradient(&backend, tensor, factors, &gamma).unwrap();

        for (n, g) in grads.iter().enumerate() {
            let m = mttkrp(&tensor.view(), factors, n).unwrap();
            let expected = factors[n].dot(gamma.gamma(n, n)) - m;
            for (a, b) in g.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-10, "mode {}: {} vs {}", n, a, b);
            }
        }
    }

    #[test]
    fn test_gradient_three_modes() {
        let tensor = DenseND::<f64>::random_uniform_seeded(&[3, 4, 2], -1.0, 1.0, 7);
        let factors = vec![
            array![[1.0, 0.5], [0.0, 1.0], [-1.0, 2.0]],
            array![[0.3, 1.0], [1.0, 1.0], [2.0, -0.5], [0.1, 0.2]],
            array![[1.0, 0.0], [0.5, 0.5]],
        ];
        check_against_mttkrp(&tensor, &factors);
    }

    #[test]
    fn test_gradient_five_modes() {
        let tensor = DenseND::<f64>::random_uniform_seeded(&[2, 3, 2, 3, 2], -1.0, 1.0, 11);
        let factors: Vec<Array2<f64>> = [2usize, 3, 2, 3, 2]
            .iter()
            .enumerate()
            .map(|(n, &rows)| {
                DenseND::<f64>::random_uniform_seeded(&[rows, 3], -1.0, 1.0, 100 + n as u64)
                    .into_array()
                    .into_dimensionality::<Ix2>()
                    .unwrap()
            })
            .collect();
        check_against_mttkrp(&tensor, &factors);
    }

    #[test]
    fn test_gradient_single_mode() {
        let tensor = DenseND::from_vec(vec![1.0, 2.0, 3.0], &[3]).unwrap();
        let factors = vec![array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]];
        let backend = LocalBackend;
        let gamma = compute_gamma(&backend, &compute_gram(&backend, &factors));
        let grads = gradient(&backend, &tensor, &factors, &gamma).unwrap();

        // γ(0,0) is all ones: g = A·1 − [T T]
        let expected = array![[0.0, 0.0], [-1.0, -1.0], [-1.0, -1.0]];
        assert_eq!(grads[0], expected);
    }

    #[test]
    fn test_gradient_two_modes() {
        let tensor = DenseND::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        let factors = vec![
            array![[1.0], [2.0]],
            array![[0.5], [-1.0], [1.0]],
        ];
        check_against_mttkrp(&tensor, &factors);
    }
}
