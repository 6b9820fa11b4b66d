//! Damped ALS sweeps in residual form
//!
//! Mode by mode, with `Γₙ = ⊙_{k≠n} Gₖ` at the current factors:
//!
//! `Aₙ ← Aₙ + (MTTKRP(T, A, n) − Aₙ·Γₙ)·(Γₙ + Regu·I)⁻¹`
//!
//! With `Regu = 0` this is the exact ALS update; the residual form keeps the
//! damped update anchored at the previous factor.

use crate::error::{NlsError, NlsResult};
use crate::step::{CpStep, StepReport};
use cpnls_core::DenseND;
use cpnls_kernels::{CpScalar, LocalBackend, TensorBackend};
use scirs2_core::ndarray_ext::Array2;
use std::marker::PhantomData;

/// One full ALS sweep per [`CpStep::step`]
#[derive(Debug, Clone, Default)]
pub struct AlsStepper<T, B = LocalBackend> {
    backend: B,
    sweeps: usize,
    _marker: PhantomData<T>,
}

impl<T: CpScalar> AlsStepper<T, LocalBackend> {
    pub fn new() -> Self {
        Self::with_backend(LocalBackend)
    }
}

impl<T, B> AlsStepper<T, B>
where
    T: CpScalar,
    B: TensorBackend<T>,
{
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            sweeps: 0,
            _marker: PhantomData,
        }
    }

    /// Number of completed sweeps
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }
}

impl<T, B> CpStep<T> for AlsStepper<T, B>
where
    T: CpScalar,
    B: TensorBackend<T>,
{
    #[tracing::instrument(level = "debug", skip_all, fields(sweep = self.sweeps))]
    fn step(
        &mut self,
        tensor: &DenseND<T>,
        factors: &mut [Array2<T>],
        regu: T,
    ) -> NlsResult<StepReport> {
        let backend = &self.backend;
        let mut grams: Vec<Array2<T>> = factors.iter().map(|a| backend.gram(&a.view())).collect();
        let rank = factors.first().map_or(0, |a| a.ncols());

        for n in 0..factors.len() {
            let mut gamma = Array2::<T>::ones((rank, rank));
            for (k, g) in grams.iter().enumerate() {
                if k != n {
                    backend.hadamard_assign(&mut gamma, &g.view());
                }
            }

            let mut rhs = backend.mttkrp(&tensor.view(), factors, n)?;
            rhs -= &backend.matmul(&factors[n].view(), &gamma.view());

            for j in 0..rank {
                gamma[[j, j]] += regu;
            }
            let l = backend
                .cholesky(&gamma.view())
                .map_err(|source| NlsError::SingularNormalEquations { mode: n, source })?;

            // rhs·(L·Lᵀ)⁻¹
            let z = backend.solve_triangular(&l.view(), &rhs.view(), true, false, true)?;
            let update = backend.solve_triangular(&l.view(), &z.view(), true, false, false)?;

            factors[n] += &update;
            grams[n] = backend.gram(&factors[n].view());
        }

        self.sweeps += 1;
        Ok(StepReport::als())
    }
}
