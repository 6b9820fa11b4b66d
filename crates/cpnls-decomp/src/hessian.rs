//! Implicit damped Gauss-Newton Hessian
//!
//! For `JᵀJ` of the CP model the block coupling modes `n` and `p` acts on a
//! factor-shaped direction as
//!
//! - `n = p`: `X ↦ X·γ(n, n)`
//! - `n ≠ p`: `X ↦ Aₙ·(γ(n, p) ⊙ XᵀAₚ)`
//!
//! and damping adds `Regu·Xₙ·diag(γ(n, n))` (Jacobi scaling of the
//! diagonal blocks). The block preconditioner in [`crate::precond`] uses the
//! same damped diagonal blocks.
//!
//! The full `(Σ Iₙ·R)²` matrix is never formed; one product costs
//! `O(N²·R²·max Iₙ)`.

use crate::error::{NlsError, NlsResult};
use crate::gram::Coupling;
use crate::operator::LinearOperator;
use cpnls_kernels::{CpScalar, KernelError, LocalBackend, TensorBackend};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1};

/// `JᵀJ + Regu·D` at the current factors, applied without materializing it
pub struct GaussNewtonHessian<'a, T: CpScalar, B: TensorBackend<T> + ?Sized = LocalBackend> {
    backend: &'a B,
    factors: &'a [Array2<T>],
    coupling: &'a Coupling<T>,
    regu: T,
}

impl<'a, T, B> GaussNewtonHessian<'a, T, B>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    pub fn new(backend: &'a B, factors: &'a [Array2<T>], coupling: &'a Coupling<T>, regu: T) -> Self {
        Self {
            backend,
            factors,
            coupling,
            regu,
        }
    }

    pub fn factors(&self) -> &'a [Array2<T>] {
        self.factors
    }

    pub fn regu(&self) -> T {
        self.regu
    }

    /// `Y = H·X` on factor-shaped lists
    pub fn apply(&self, x: &[Array2<T>]) -> NlsResult<Vec<Array2<T>>> {
        let n_modes = self.factors.len();
        if x.len() != n_modes {
            return Err(NlsError::ModeCountMismatch {
                tensor_modes: n_modes,
                factors: x.len(),
            });
        }
        for (n, (xn, an)) in x.iter().zip(self.factors.iter()).enumerate() {
            if xn.dim() != an.dim() {
                return Err(KernelError::dimension_mismatch(
                    "hessian_apply",
                    an.shape().to_vec(),
                    xn.shape().to_vec(),
                    format!("Direction block {} must match its factor", n),
                )
                .into());
            }
        }

        // XₚᵀAₚ is shared by every n ≠ p
        let cross: Vec<Array2<T>> = x
            .iter()
            .zip(self.factors.iter())
            .map(|(xp, ap)| self.backend.matmul_tn(&xp.view(), &ap.view()))
            .collect();

        let mut out = Vec::with_capacity(n_modes);
        for n in 0..n_modes {
            let gamma_nn = self.coupling.gamma(n, n);
            let mut y = self.backend.matmul(&x[n].view(), &gamma_nn.view());

            for (p, b) in cross.iter().enumerate() {
                if p == n {
                    continue;
                }
                let weighted = self
                    .backend
                    .hadamard(&self.coupling.gamma(n, p).view(), &b.view());
                y += &self
                    .backend
                    .matmul(&self.factors[n].view(), &weighted.view());
            }

            if self.regu != T::zero() {
                for (j, &d) in gamma_nn.diag().iter().enumerate() {
                    y.column_mut(j).scaled_add(self.regu * d, &x[n].column(j));
                }
            }
            out.push(y);
        }
        Ok(out)
    }

    /// The same operator acting on concatenated vectors
    pub fn flat(&self) -> FlatHessian<'_, 'a, T, B> {
        FlatHessian { inner: self }
    }
}

/// [`GaussNewtonHessian`] on flat vectors, for generic CG
pub struct FlatHessian<'h, 'a, T: CpScalar, B: TensorBackend<T> + ?Sized> {
    inner: &'h GaussNewtonHessian<'a, T, B>,
}

impl<T, B> LinearOperator<T> for FlatHessian<'_, '_, T, B>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    fn dim(&self) -> usize {
        cpnls_kernels::num_variables(self.inner.factors)
    }

    fn matvec(&self, x: &ArrayView1<T>) -> NlsResult<Array1<T>> {
        let backend = self.inner.backend;
        let blocks = backend.reshape_into_matrices(x, self.inner.factors)?;
        let y = self.inner.apply(&blocks)?;
        Ok(backend.flatten(&y))
    }
}

/// `⟨X, H·X⟩ / ⟨X, X⟩`
pub fn rayleigh_quotient<T, B>(hessian: &GaussNewtonHessian<'_, T, B>, x: &[Array2<T>]) -> NlsResult<T>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let backend = hessian.backend;
    let hx = hessian.apply(x)?;
    let num = backend.mult_lists(x, &hx)?;
    let den = backend.list_vecnormsq(x);
    if den == T::zero() {
        return Err(NlsError::InvalidConfig(
            "Rayleigh quotient of a zero direction".into(),
        ));
    }
    Ok(num / den)
}

/// Estimate the largest eigenvalue of `H` by power iteration
///
/// Starts from `start`, normalizes after every product and returns the
/// final Rayleigh quotient together with the normalized direction.
pub fn power_iteration<T, B>(
    hessian: &GaussNewtonHessian<'_, T, B>,
    start: Vec<Array2<T>>,
    iters: usize,
) -> NlsResult<(T, Vec<Array2<T>>)>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let backend = hessian.backend;
    let mut v = start;
    for _ in 0..iters {
        let norm = backend.list_vecnorm(&v);
        if norm == T::zero() {
            break;
        }
        v = backend.scalar_mul(T::one() / norm, &v);
        v = hessian.apply(&v)?;
    }

    let norm = backend.list_vecnorm(&v);
    if norm == T::zero() {
        return Ok((T::zero(), v));
    }
    let v = backend.scalar_mul(T::one() / norm, &v);
    let lambda = rayleigh_quotient(hessian, &v)?;
    Ok((lambda, v))
}
