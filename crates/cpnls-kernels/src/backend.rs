//! The backend contract consumed by the CP solvers
//!
//! Every heavy operation the solver performs goes through a
//! [`TensorBackend`]: contractions, Gram matrices, Cholesky, triangular
//! solves and the list reductions that drive CG. The default method bodies
//! run in-process on scirs2 arrays; [`LocalBackend`] uses them unchanged.
//!
//! A multi-process backend overrides the methods it distributes. Two rules
//! apply to such implementations:
//!
//! - every process receives the same sequence of calls, so each method must
//!   behave as a collective operation;
//! - scalar reductions (`mult_lists`, `list_vecnorm`, ...) must return the
//!   same replicated value on every process, because the solver branches on
//!   them.
//!
//! The solver only logs when [`TensorBackend::is_master_proc`] is true.

use crate::contractions::{contract_mode_carry, contract_mode_first};
use crate::error::KernelResult;
use crate::hadamard::{gram_matrix, hadamard, hadamard_inplace};
use crate::linalg::{cholesky, solve_triangular};
use crate::lists;
use crate::mttkrp::mttkrp;
use crate::outer::cp_compose;
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array, Array1, Array2, ArrayView, ArrayView1, ArrayView2, IxDyn};

/// Tensor operations the CP solvers delegate
///
/// Calls are synchronous and blocking from the solver's point of view.
pub trait TensorBackend<T: CpScalar>: Send + Sync {
    /// Whether this process should write log output
    fn is_master_proc(&self) -> bool {
        true
    }

    /// `a · b`
    fn matmul(&self, a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T> {
        a.dot(b)
    }

    /// `aᵀ · b`
    fn matmul_tn(&self, a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T> {
        a.t().dot(b)
    }

    /// `aᵀ · a`
    fn gram(&self, a: &ArrayView2<T>) -> Array2<T> {
        gram_matrix(a)
    }

    /// `a ⊙ b`
    fn hadamard(&self, a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T> {
        hadamard(a, b)
    }

    /// `acc ← acc ⊙ b`
    fn hadamard_assign(&self, acc: &mut Array2<T>, b: &ArrayView2<T>) {
        hadamard_inplace(&mut acc.view_mut(), b)
    }

    /// Contract mode `axis` of `tensor` against `factor`
    ///
    /// When `carries_rank` is false the tensor is raw and a trailing rank
    /// axis is introduced (`abc,bR->acR`); otherwise the tensor's trailing
    /// axis is the rank axis and is shared (`abR,bR->aR`).
    fn contract_mode(
        &self,
        tensor: &ArrayView<T, IxDyn>,
        factor: &ArrayView2<T>,
        axis: usize,
        carries_rank: bool,
    ) -> KernelResult<Array<T, IxDyn>> {
        if carries_rank {
            contract_mode_carry(tensor, factor, axis)
        } else {
            contract_mode_first(tensor, factor, axis)
        }
    }

    /// MTTKRP of `tensor` with all factors except `mode`
    fn mttkrp(
        &self,
        tensor: &ArrayView<T, IxDyn>,
        factors: &[Array2<T>],
        mode: usize,
    ) -> KernelResult<Array2<T>> {
        mttkrp(tensor, factors, mode)
    }

    /// Dense tensor represented by CP factors
    fn compose(&self, factors: &[Array2<T>]) -> KernelResult<Array<T, IxDyn>> {
        cp_compose(factors)
    }

    /// Lower Cholesky factor
    fn cholesky(&self, a: &ArrayView2<T>) -> KernelResult<Array2<T>> {
        cholesky(a)
    }

    /// Triangular solve, see [`crate::linalg::solve_triangular`]
    fn solve_triangular(
        &self,
        l: &ArrayView2<T>,
        rhs: &ArrayView2<T>,
        lower: bool,
        from_left: bool,
        transpose: bool,
    ) -> KernelResult<Array2<T>> {
        solve_triangular(l, rhs, lower, from_left, transpose)
    }

    /// Frobenius norm of a dense tensor
    fn norm(&self, tensor: &ArrayView<T, IxDyn>) -> T {
        tensor.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt()
    }

    /// Dot product of two vectors
    fn dot(&self, a: &ArrayView1<T>, b: &ArrayView1<T>) -> T {
        a.dot(b)
    }

    /// Zero list shaped like `template`
    fn zeros_like(&self, template: &[Array2<T>]) -> Vec<Array2<T>> {
        lists::zeros_like(template)
    }

    /// Block-wise sum of two lists
    fn list_add(&self, a: &[Array2<T>], b: &[Array2<T>]) -> KernelResult<Vec<Array2<T>>> {
        lists::list_add(a, b)
    }

    /// Block-wise scaling
    fn scalar_mul(&self, s: T, a: &[Array2<T>]) -> Vec<Array2<T>> {
        lists::scalar_mul(s, a)
    }

    /// `y ← y + α·x`
    fn list_axpy(&self, alpha: T, x: &[Array2<T>], y: &mut [Array2<T>]) -> KernelResult<()> {
        lists::list_axpy(alpha, x, y)
    }

    /// Inner product of two lists
    fn mult_lists(&self, a: &[Array2<T>], b: &[Array2<T>]) -> KernelResult<T> {
        lists::mult_lists(a, b)
    }

    /// Norm of a list
    fn list_vecnorm(&self, a: &[Array2<T>]) -> T {
        lists::list_vecnorm(a)
    }

    /// Squared norm of a list
    fn list_vecnormsq(&self, a: &[Array2<T>]) -> T {
        lists::list_vecnormsq(a)
    }

    /// Concatenate a list into a vector
    fn flatten(&self, list: &[Array2<T>]) -> Array1<T> {
        lists::flatten(list)
    }

    /// Split a vector into a list shaped like `template`
    fn reshape_into_matrices(
        &self,
        vec: &ArrayView1<T>,
        template: &[Array2<T>],
    ) -> KernelResult<Vec<Array2<T>>> {
        lists::reshape_into_matrices(vec, template)
    }
}

/// Single-process backend running every operation in the calling thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalBackend;

impl<T: CpScalar> TensorBackend<T> for LocalBackend {}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    /// Backend that claims to be a non-master rank
    struct WorkerRank;

    impl TensorBackend<f64> for WorkerRank {
        fn is_master_proc(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_local_backend_defaults() {
        let b = LocalBackend;
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(TensorBackend::<f64>::is_master_proc(&b));
        assert_eq!(b.matmul_tn(&a.view(), &a.view()), b.gram(&a.view()));
        assert_eq!(b.matmul(&a.view(), &a.view())[[0, 0]], 7.0);
        assert_eq!(b.hadamard(&a.view(), &a.view())[[1, 1]], 16.0);
    }

    #[test]
    fn test_contract_mode_dispatch() {
        let b = LocalBackend;
        let x = Array::<f64, _>::ones(IxDyn(&[2, 3]));
        let f = Array2::<f64>::ones((3, 4));
        let first = b.contract_mode(&x.view(), &f.view(), 1, false).unwrap();
        assert_eq!(first.shape(), &[2, 4]);

        let g = Array2::<f64>::ones((2, 4));
        let carried = b.contract_mode(&first.view(), &g.view(), 0, true).unwrap();
        assert_eq!(carried.shape(), &[4]);
        assert_eq!(carried[[0]], 6.0);
    }

    #[test]
    fn test_overridden_master_flag() {
        assert!(!WorkerRank.is_master_proc());
        let v = array![1.0, 2.0];
        assert_eq!(WorkerRank.dot(&v.view(), &v.view()), 5.0);
    }
}
