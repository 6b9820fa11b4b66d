//! Block-diagonal Cholesky preconditioner
//!
//! Each mode's diagonal Hessian block acts as `X ↦ X·Mₙ` with
//! `Mₙ = γ(n, n) + Regu·diag(γ(n, n))`, so the preconditioner stores the
//! lower Cholesky factor `Lₙ` of `Mₙ` and applies `Mₙ⁻¹` from the right with
//! two triangular solves.

use crate::error::{NlsError, NlsResult};
use crate::gram::Coupling;
use crate::operator::LinearOperator;
use cpnls_kernels::{CpScalar, KernelError, TensorBackend};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1};

/// Lower Cholesky factors of the damped diagonal Hessian blocks
#[derive(Debug, Clone)]
pub struct BlockDiagPreconditioner<T> {
    factors: Vec<Array2<T>>,
}

impl<T: CpScalar> BlockDiagPreconditioner<T> {
    /// Factor `γ(n, n) + Regu·diag(γ(n, n))` for every mode
    ///
    /// Fails with [`NlsError::PreconditionerFailure`] naming the first mode
    /// whose damped block is not positive definite.
    pub fn build<B>(backend: &B, coupling: &Coupling<T>, regu: T) -> NlsResult<Self>
    where
        B: TensorBackend<T> + ?Sized,
    {
        let mut factors = Vec::with_capacity(coupling.n_modes());
        for n in 0..coupling.n_modes() {
            let mut block = coupling.gamma(n, n).clone();
            for j in 0..block.nrows() {
                let d = block[[j, j]];
                block[[j, j]] = d + regu * d;
            }
            let l = backend
                .cholesky(&block.view())
                .map_err(|source| NlsError::PreconditionerFailure { mode: n, source })?;
            factors.push(l);
        }
        Ok(Self { factors })
    }

    /// Lower Cholesky factor for `mode`
    pub fn factor(&self, mode: usize) -> &Array2<T> {
        &self.factors[mode]
    }

    pub fn n_modes(&self) -> usize {
        self.factors.len()
    }

    /// `Yₙ` with `Yₙ·Lₙ·Lₙᵀ = Xₙ` for every mode
    pub fn apply<B>(&self, backend: &B, x: &[Array2<T>]) -> NlsResult<Vec<Array2<T>>>
    where
        B: TensorBackend<T> + ?Sized,
    {
        if x.len() != self.factors.len() {
            return Err(NlsError::ModeCountMismatch {
                tensor_modes: self.factors.len(),
                factors: x.len(),
            });
        }
        x.iter()
            .zip(self.factors.iter())
            .map(|(xn, l)| -> NlsResult<Array2<T>> {
                let z = backend.solve_triangular(&l.view(), &xn.view(), true, false, true)?;
                let y = backend.solve_triangular(&l.view(), &z.view(), true, false, false)?;
                Ok(y)
            })
            .collect()
    }

    /// The same preconditioner on flat vectors shaped like `template`
    pub fn flat<'p, B>(
        &'p self,
        backend: &'p B,
        template: &'p [Array2<T>],
    ) -> FlatBlockPreconditioner<'p, T, B>
    where
        B: TensorBackend<T> + ?Sized,
    {
        FlatBlockPreconditioner {
            inner: self,
            backend,
            template,
        }
    }
}

/// [`BlockDiagPreconditioner`] acting on concatenated vectors
pub struct FlatBlockPreconditioner<'p, T: CpScalar, B: TensorBackend<T> + ?Sized> {
    inner: &'p BlockDiagPreconditioner<T>,
    backend: &'p B,
    template: &'p [Array2<T>],
}

impl<T, B> LinearOperator<T> for FlatBlockPreconditioner<'_, T, B>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    fn dim(&self) -> usize {
        cpnls_kernels::num_variables(self.template)
    }

    fn matvec(&self, x: &ArrayView1<T>) -> NlsResult<Array1<T>> {
        let blocks = self.backend.reshape_into_matrices(x, self.template)?;
        if blocks.len() != self.inner.n_modes() {
            return Err(KernelError::operation_error(
                "preconditioner",
                "template does not match the preconditioner's mode count",
            )
            .into());
        }
        let y = self.inner.apply(self.backend, &blocks)?;
        Ok(self.backend.flatten(&y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gram::{compute_gamma, compute_gram};
    use cpnls_kernels::{flatten, LocalBackend};
    use scirs2_core::ndarray_ext::array;

    fn setup() -> (Vec<Array2<f64>>, Coupling<f64>) {
        let backend = LocalBackend;
        let a = vec![
            array![[1.0, 0.2], [0.3, 1.0], [0.5, -0.4]],
            array![[0.8, 0.1], [0.2, 0.9]],
            array![[1.0, 0.0], [0.4, 1.2]],
        ];
        let gamma = compute_gamma(&backend, &compute_gram(&backend, &a));
        (a, gamma)
    }

    #[test]
    fn test_apply_inverts_damped_block() {
        let backend = LocalBackend;
        let (a, gamma) = setup();
        let regu = 0.25;
        let p = BlockDiagPreconditioner::build(&backend, &gamma, regu).unwrap();

        let x = vec![
            array![[1.0, 2.0], [0.0, -1.0], [0.5, 0.5]],
            array![[0.3, 0.3], [1.0, 0.0]],
            array![[-2.0, 1.0], [0.0, 0.1]],
        ];
        let y = p.apply(&backend, &x).unwrap();

        for n in 0..a.len() {
            let mut m = gamma.gamma(n, n).clone();
            for j in 0..2 {
                m[[j, j]] *= 1.0 + regu;
            }
            let back = y[n].dot(&m);
            for (u, v) in back.iter().zip(x[n].iter()) {
                assert!((u - v).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn test_factor_is_lower_triangular() {
        let backend = LocalBackend;
        let (_, gamma) = setup();
        let p = BlockDiagPreconditioner::build(&backend, &gamma, 0.0).unwrap();
        assert_eq!(p.n_modes(), 3);
        assert_eq!(p.factor(1)[[0, 1]], 0.0);
    }

    #[test]
    fn test_singular_block_reports_mode() {
        let backend = LocalBackend;
        // A zero column in A₀ leaves γ(1,1) = G₀ ⊙ G₂ singular while
        // γ(0,0) = G₁ ⊙ G₂ stays the identity
        let a = vec![
            array![[1.0, 0.0], [2.0, 0.0]],
            array![[1.0, 0.0], [0.0, 1.0]],
            array![[1.0, 0.0], [0.0, 1.0]],
        ];
        let gamma = compute_gamma(&backend, &compute_gram(&backend, &a));
        let err = BlockDiagPreconditioner::build(&backend, &gamma, 0.0).unwrap_err();
        assert!(matches!(
            err,
            NlsError::PreconditionerFailure { mode: 1, .. }
        ));
    }

    #[test]
    fn test_flat_matches_list() {
        let backend = LocalBackend;
        let (a, gamma) = setup();
        let p = BlockDiagPreconditioner::build(&backend, &gamma, 0.1).unwrap();
        let x = vec![
            array![[1.0, 2.0], [0.0, -1.0], [0.5, 0.5]],
            array![[0.3, 0.3], [1.0, 0.0]],
            array![[-2.0, 1.0], [0.0, 0.1]],
        ];
        let flat = p.flat(&backend, &a);
        assert_eq!(LinearOperator::<f64>::dim(&flat), 14);
        let y = flat.matvec(&flatten(&x).view()).unwrap();
        assert_eq!(y, flatten(&p.apply(&backend, &x).unwrap()));
    }
}
