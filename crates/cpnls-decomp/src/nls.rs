//! Damped Gauss-Newton (NLS) steps
//!
//! One step at factors `A` with damping `Regu`:
//!
//! 1. Gram matrices and coupling matrices of `A`
//! 2. gradient `g`
//! 3. block preconditioner (when enabled)
//! 4. PCG on `H·δ = −g` with `tol = max(atol, cg_tol·‖g‖)`
//! 5. `Aₙ += δₙ`, then `atol = num·‖δ‖` for the next step
//!
//! There are no retries: a preconditioner failure is returned to the caller,
//! which may repeat the step with larger damping.

use crate::config::NlsConfig;
use crate::error::NlsResult;
use crate::gradient::gradient;
use crate::gram::{compute_gamma, compute_gram, Coupling};
use crate::hessian::GaussNewtonHessian;
use crate::pcg::{cg, pcg, pcg_tolerance, SolverInfo};
use crate::precond::BlockDiagPreconditioner;
use crate::step::{CpStep, StepReport};
use crate::utils::{fitness, residual_norm, validate_problem};
use cpnls_core::DenseND;
use cpnls_kernels::{CpScalar, LocalBackend, TensorBackend};
use scirs2_core::ndarray_ext::Array2;

/// Stateful NLS step: carries the absolute CG tolerance and the running CG
/// iteration count between steps
#[derive(Debug, Clone)]
pub struct NlsStepper<T, B = LocalBackend> {
    backend: B,
    config: NlsConfig,
    atol: T,
    total_cg_iterations: usize,
    steps: usize,
}

impl<T: CpScalar> NlsStepper<T, LocalBackend> {
    pub fn new(config: NlsConfig) -> NlsResult<Self> {
        Self::with_backend(LocalBackend, config)
    }
}

impl<T, B> NlsStepper<T, B>
where
    T: CpScalar,
    B: TensorBackend<T>,
{
    pub fn with_backend(backend: B, config: NlsConfig) -> NlsResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            atol: T::zero(),
            total_cg_iterations: 0,
            steps: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &NlsConfig {
        &self.config
    }

    /// Absolute CG tolerance for the next step
    pub fn atol(&self) -> T {
        self.atol
    }

    /// CG iterations summed over every step taken so far
    pub fn total_cg_iterations(&self) -> usize {
        self.total_cg_iterations
    }

    /// Number of completed steps
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn linearize(
        &self,
        tensor: &DenseND<T>,
        factors: &[Array2<T>],
        regu: T,
    ) -> NlsResult<(Coupling<T>, Vec<Array2<T>>, Option<BlockDiagPreconditioner<T>>)> {
        let grams = compute_gram(&self.backend, factors);
        let coupling = compute_gamma(&self.backend, &grams);
        let g = gradient(&self.backend, tensor, factors, &coupling)?;
        let precond = if self.config.preconditioned {
            Some(BlockDiagPreconditioner::build(&self.backend, &coupling, regu)?)
        } else {
            None
        };
        Ok((coupling, g, precond))
    }

    fn tolerance(&self, g: &[Array2<T>]) -> T {
        let cg_tol = T::from_f64_lossy(self.config.cg_tol);
        pcg_tolerance(self.atol, cg_tol, self.backend.list_vecnorm(g))
    }

    fn apply_update(
        &mut self,
        factors: &mut [Array2<T>],
        delta: &[Array2<T>],
        info: SolverInfo,
    ) -> NlsResult<StepReport> {
        self.backend.list_axpy(T::one(), delta, factors)?;

        let delta_norm = self.backend.list_vecnorm(delta);
        self.atol = T::from_f64_lossy(self.config.num) * delta_norm;
        self.total_cg_iterations += info.iterations;
        self.steps += 1;

        if self.backend.is_master_proc() {
            tracing::debug!(
                step = self.steps,
                cg_iterations = info.iterations,
                cg_status = ?info.status,
                cg_residual = info.residual,
                delta_norm = delta_norm.to_f64_lossy(),
                "NLS step finished"
            );
        }
        Ok(StepReport::nls(info))
    }

    /// One step solving the Gauss-Newton system through the flat-vector
    /// operator route ([`cg`] over [`crate::LinearOperator`]s)
    ///
    /// Produces the same update as [`CpStep::step`] up to rounding.
    #[tracing::instrument(level = "debug", skip_all, fields(step = self.steps))]
    pub fn step_flat(
        &mut self,
        tensor: &DenseND<T>,
        factors: &mut [Array2<T>],
        regu: T,
    ) -> NlsResult<StepReport> {
        let (coupling, g, precond) = self.linearize(tensor, factors, regu)?;
        let tol = self.tolerance(&g);

        let (delta, info) = {
            let hessian = GaussNewtonHessian::new(&self.backend, &*factors, &coupling, regu);
            let rhs = self.backend.flatten(&self.backend.scalar_mul(-T::one(), &g));
            let flat_precond = precond
                .as_ref()
                .map(|p| p.flat(&self.backend, &*factors));
            let (x, info) = cg(
                &hessian.flat(),
                &rhs.view(),
                flat_precond.as_ref(),
                tol,
                self.config.maxiter,
            )?;
            (self.backend.reshape_into_matrices(&x.view(), factors)?, info)
        };

        self.apply_update(factors, &delta, info)
    }
}

impl<T, B> CpStep<T> for NlsStepper<T, B>
where
    T: CpScalar,
    B: TensorBackend<T>,
{
    #[tracing::instrument(level = "debug", skip_all, fields(step = self.steps))]
    fn step(
        &mut self,
        tensor: &DenseND<T>,
        factors: &mut [Array2<T>],
        regu: T,
    ) -> NlsResult<StepReport> {
        let (coupling, g, precond) = self.linearize(tensor, factors, regu)?;
        let tol = self.tolerance(&g);

        let (delta, info) = {
            let hessian = GaussNewtonHessian::new(&self.backend, &*factors, &coupling, regu);
            pcg(
                &hessian,
                &self.backend,
                &g,
                precond.as_ref(),
                tol,
                self.config.maxiter,
            )?
        };

        self.apply_update(factors, &delta, info)
    }
}

/// Gauss-Newton optimizer owning the target tensor and the factors
///
/// Shapes are checked once at construction; every [`step`](Self::step)
/// afterwards updates the factors in place.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_core::DenseND;
/// use cpnls_decomp::{CpNlsOptimizer, NlsConfig};
///
/// let a = array![[1.0], [2.0]];
/// let b = array![[1.0], [0.5], [-1.0]];
/// let tensor = DenseND::from_array(cpnls_kernels::cp_compose(&[a, b]).unwrap());
///
/// let init = vec![array![[1.1], [1.9]], array![[0.9], [0.6], [-1.0]]];
/// let mut opt = CpNlsOptimizer::new(tensor, init, NlsConfig::default()).unwrap();
/// let before = opt.residual().unwrap();
/// for _ in 0..5 {
///     opt.step(1e-4).unwrap();
/// }
/// assert!(opt.residual().unwrap() < before);
/// ```
#[derive(Debug, Clone)]
pub struct CpNlsOptimizer<T, B = LocalBackend> {
    tensor: DenseND<T>,
    factors: Vec<Array2<T>>,
    stepper: NlsStepper<T, B>,
}

impl<T: CpScalar> CpNlsOptimizer<T, LocalBackend> {
    pub fn new(tensor: DenseND<T>, factors: Vec<Array2<T>>, config: NlsConfig) -> NlsResult<Self> {
        Self::with_backend(LocalBackend, tensor, factors, config)
    }
}

impl<T, B> CpNlsOptimizer<T, B>
where
    T: CpScalar,
    B: TensorBackend<T>,
{
    pub fn with_backend(
        backend: B,
        tensor: DenseND<T>,
        factors: Vec<Array2<T>>,
        config: NlsConfig,
    ) -> NlsResult<Self> {
        validate_problem(&tensor, &factors)?;
        Ok(Self {
            tensor,
            factors,
            stepper: NlsStepper::with_backend(backend, config)?,
        })
    }

    /// One damped Gauss-Newton step
    ///
    /// Returns the updated factors and the total CG iterations so far.
    pub fn step(&mut self, regu: T) -> NlsResult<(&[Array2<T>], usize)> {
        self.stepper.step(&self.tensor, &mut self.factors, regu)?;
        Ok((&self.factors, self.stepper.total_cg_iterations()))
    }

    /// [`step`](Self::step) through the flat linear-operator route
    pub fn step_flat(&mut self, regu: T) -> NlsResult<(&[Array2<T>], usize)> {
        self.stepper
            .step_flat(&self.tensor, &mut self.factors, regu)?;
        Ok((&self.factors, self.stepper.total_cg_iterations()))
    }

    pub fn tensor(&self) -> &DenseND<T> {
        &self.tensor
    }

    pub fn factors(&self) -> &[Array2<T>] {
        &self.factors
    }

    pub fn into_factors(self) -> Vec<Array2<T>> {
        self.factors
    }

    pub fn stepper(&self) -> &NlsStepper<T, B> {
        &self.stepper
    }

    pub fn total_cg_iterations(&self) -> usize {
        self.stepper.total_cg_iterations()
    }

    /// `‖T − [[A]]‖` at the current factors
    pub fn residual(&self) -> NlsResult<T> {
        residual_norm(self.stepper.backend(), &self.tensor, &self.factors)
    }

    pub fn fitness(&self) -> NlsResult<T> {
        fitness(self.stepper.backend(), &self.tensor, &self.factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NlsError;
    use scirs2_core::ndarray_ext::array;

    fn problem() -> (DenseND<f64>, Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let truth = vec![
            array![[1.0, 0.2], [0.4, 1.0], [-0.5, 0.3]],
            array![[0.8, -0.6], [0.1, 0.9], [0.7, 0.2]],
            array![[1.2, 0.1], [-0.3, 1.0]],
        ];
        let tensor = DenseND::from_array(cpnls_kernels::cp_compose(&truth).unwrap());
        let init: Vec<Array2<f64>> = truth.iter().map(|a| a * 1.05 + 0.02).collect();
        (tensor, truth, init)
    }

    #[test]
    fn test_construction_checks_shapes() {
        let (tensor, _, mut init) = problem();
        init[2] = Array2::zeros((3, 2));
        let err = CpNlsOptimizer::new(tensor, init, NlsConfig::default()).unwrap_err();
        assert_eq!(
            err,
            NlsError::DimensionMismatch {
                mode: 2,
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_steps_reduce_residual_and_count_iterations() {
        let (tensor, _, init) = problem();
        let config = NlsConfig::default().with_cg_tol(1e-6);
        let mut opt = CpNlsOptimizer::new(tensor, init, config).unwrap();

        let r0 = opt.residual().unwrap();
        let (_, after_one) = opt.step(1e-4).unwrap();
        assert!(after_one > 0);
        for _ in 0..5 {
            opt.step(1e-4).unwrap();
        }
        assert!(opt.residual().unwrap() < 1e-2 * r0);
        assert!(opt.total_cg_iterations() >= after_one);
        assert_eq!(opt.stepper().steps(), 6);
    }

    #[test]
    fn test_atol_tracks_update_norm() {
        let (tensor, _, init) = problem();
        let config = NlsConfig::default().with_num(0.5);
        let mut stepper = NlsStepper::new(config).unwrap();
        let mut factors = init.clone();
        stepper.step(&tensor, &mut factors, 1e-3).unwrap();

        let delta: Vec<Array2<f64>> = factors.iter().zip(init.iter()).map(|(a, b)| a - b).collect();
        let expected = 0.5 * cpnls_kernels::list_vecnorm(&delta);
        assert!((stepper.atol() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_flat_route_matches_list_route() {
        let (tensor, _, init) = problem();
        let config = NlsConfig::default().with_cg_tol(1e-10);

        let mut list = CpNlsOptimizer::new(tensor.clone(), init.clone(), config).unwrap();
        let mut flat = CpNlsOptimizer::new(tensor, init, config).unwrap();
        list.step(1e-3).unwrap();
        flat.step_flat(1e-3).unwrap();

        for (a, b) in list.factors().iter().zip(flat.factors().iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn test_unpreconditioned_step() {
        let (tensor, _, init) = problem();
        let config = NlsConfig::default().with_preconditioner(false);
        let mut opt = CpNlsOptimizer::new(tensor, init, config).unwrap();
        let r0 = opt.residual().unwrap();
        opt.step(1e-3).unwrap();
        assert!(opt.residual().unwrap() < r0);
    }
}
