//! Controllers that alternate between ALS sweeps and NLS steps
//!
//! Both controllers own the tensor and factors and compose two [`CpStep`]
//! implementations, dispatching on their current [`SolverMode`].
//!
//! - [`AlsNlsController`] starts with ALS and switches to NLS for good once
//!   ALS steps become small or too many sweeps have run.
//! - [`SafeNlsController`] starts with NLS, runs it in batches, and falls
//!   back to a block of ALS sweeps whenever a batch makes the residual worse.

use crate::als::AlsStepper;
use crate::config::{HybridConfig, NlsConfig, SafeHybridConfig};
use crate::error::NlsResult;
use crate::nls::NlsStepper;
use crate::step::CpStep;
use crate::utils::{residual_norm, validate_problem};
use cpnls_core::DenseND;
use cpnls_kernels::{CpScalar, LocalBackend, TensorBackend};
use scirs2_core::ndarray_ext::Array2;

/// Which stepper the next call uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMode {
    Als,
    Nls,
}

/// ALS first, then NLS once ALS stalls
///
/// The first call is a bootstrap ALS sweep without any comparison. Each
/// later ALS call measures `‖A_new − A_prev‖`; the controller switches to
/// NLS permanently when that falls below `switch_tol` or once the sweep
/// counter (bootstrap included) exceeds `count_tol`.
#[derive(Debug, Clone)]
pub struct AlsNlsController<T, A = AlsStepper<T>, N = NlsStepper<T>, B = LocalBackend> {
    tensor: DenseND<T>,
    factors: Vec<Array2<T>>,
    als: A,
    nls: N,
    backend: B,
    config: HybridConfig,
    mode: SolverMode,
    first_call: bool,
    als_count: usize,
}

impl<T: CpScalar> AlsNlsController<T> {
    pub fn new(
        tensor: DenseND<T>,
        factors: Vec<Array2<T>>,
        config: HybridConfig,
        nls_config: NlsConfig,
    ) -> NlsResult<Self> {
        Self::with_steppers(
            LocalBackend,
            tensor,
            factors,
            config,
            AlsStepper::new(),
            NlsStepper::new(nls_config)?,
        )
    }
}

impl<T, A, N, B> AlsNlsController<T, A, N, B>
where
    T: CpScalar,
    A: CpStep<T>,
    N: CpStep<T>,
    B: TensorBackend<T>,
{
    pub fn with_steppers(
        backend: B,
        tensor: DenseND<T>,
        factors: Vec<Array2<T>>,
        config: HybridConfig,
        als: A,
        nls: N,
    ) -> NlsResult<Self> {
        config.validate()?;
        validate_problem(&tensor, &factors)?;
        Ok(Self {
            tensor,
            factors,
            als,
            nls,
            backend,
            config,
            mode: SolverMode::Als,
            first_call: true,
            als_count: 0,
        })
    }

    /// One outer iteration with damping `regu`; returns the updated factors
    #[tracing::instrument(level = "debug", skip_all, fields(mode = ?self.mode))]
    pub fn step(&mut self, regu: T) -> NlsResult<&[Array2<T>]> {
        match self.mode {
            SolverMode::Nls => {
                self.nls.step(&self.tensor, &mut self.factors, regu)?;
            }
            SolverMode::Als if self.first_call => {
                self.als.step(&self.tensor, &mut self.factors, regu)?;
                self.als_count += 1;
                self.first_call = false;
            }
            SolverMode::Als => {
                let prev = self.factors.clone();
                self.als.step(&self.tensor, &mut self.factors, regu)?;
                self.als_count += 1;

                let mut change = self.factors.clone();
                self.backend.list_axpy(-T::one(), &prev, &mut change)?;
                let change = self.backend.list_vecnorm(&change);

                let count_reached = self.als_count > self.config.count_tol;
                let step_small = change < T::from_f64_lossy(self.config.switch_tol);
                if count_reached || step_small {
                    self.mode = SolverMode::Nls;
                    if self.backend.is_master_proc() {
                        tracing::info!(
                            als_sweeps = self.als_count,
                            step_norm = change.to_f64_lossy(),
                            count_reached,
                            step_small,
                            "switching from ALS to NLS"
                        );
                    }
                }
            }
        }
        Ok(&self.factors)
    }

    pub fn mode(&self) -> SolverMode {
        self.mode
    }

    /// ALS sweeps run so far, bootstrap included
    pub fn als_count(&self) -> usize {
        self.als_count
    }

    pub fn factors(&self) -> &[Array2<T>] {
        &self.factors
    }

    pub fn into_factors(self) -> Vec<Array2<T>> {
        self.factors
    }

    pub fn tensor(&self) -> &DenseND<T> {
        &self.tensor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn nls_stepper(&self) -> &N {
        &self.nls
    }
}

/// NLS in residual-checked batches, with ALS as the fallback
///
/// In NLS mode a call snapshots the factors, runs `nls_iter` NLS steps and
/// recomputes the true residual. If it is no worse than the residual the
/// caller passed in, the batch is kept; otherwise the snapshot is restored
/// and the controller moves to ALS mode. ALS mode runs one sweep per call
/// and returns to NLS after `als_iter` sweeps. Once the caller's fitness
/// reaches `fitness_threshold`, NLS steps use `converged_regu` instead of
/// the supplied damping.
///
/// If any step of a batch fails, the snapshot is restored before the error
/// is returned, so the call can be retried with a larger damping.
#[derive(Debug, Clone)]
pub struct SafeNlsController<T, A = AlsStepper<T>, N = NlsStepper<T>, B = LocalBackend> {
    tensor: DenseND<T>,
    factors: Vec<Array2<T>>,
    als: A,
    nls: N,
    backend: B,
    config: SafeHybridConfig,
    mode: SolverMode,
    als_count: usize,
    nls_steps: usize,
    prev_res: T,
}

impl<T: CpScalar> SafeNlsController<T> {
    pub fn new(
        tensor: DenseND<T>,
        factors: Vec<Array2<T>>,
        config: SafeHybridConfig,
        nls_config: NlsConfig,
    ) -> NlsResult<Self> {
        Self::with_steppers(
            LocalBackend,
            tensor,
            factors,
            config,
            AlsStepper::new(),
            NlsStepper::new(nls_config)?,
        )
    }
}

impl<T, A, N, B> SafeNlsController<T, A, N, B>
where
    T: CpScalar,
    A: CpStep<T>,
    N: CpStep<T>,
    B: TensorBackend<T>,
{
    pub fn with_steppers(
        backend: B,
        tensor: DenseND<T>,
        factors: Vec<Array2<T>>,
        config: SafeHybridConfig,
        als: A,
        nls: N,
    ) -> NlsResult<Self> {
        config.validate()?;
        validate_problem(&tensor, &factors)?;
        let prev_res = residual_norm(&backend, &tensor, &factors)?;
        Ok(Self {
            tensor,
            factors,
            als,
            nls,
            backend,
            config,
            mode: SolverMode::Nls,
            als_count: 0,
            nls_steps: 0,
            prev_res,
        })
    }

    /// One outer iteration
    ///
    /// `residual` and `fitness` describe the current factors as seen by the
    /// caller; the residual is the baseline an NLS batch must not exceed.
    #[tracing::instrument(level = "debug", skip_all, fields(mode = ?self.mode))]
    pub fn step(&mut self, regu: T, residual: T, fitness: T) -> NlsResult<&[Array2<T>]> {
        self.prev_res = residual;
        match self.mode {
            SolverMode::Nls => {
                self.als_count = 0;
                let snapshot = self.factors.clone();
                let regu = if fitness >= T::from_f64_lossy(self.config.fitness_threshold) {
                    T::from_f64_lossy(self.config.converged_regu)
                } else {
                    regu
                };

                // A failed batch leaves the factors as they were before the call
                let mut batch = || -> NlsResult<T> {
                    for _ in 0..self.config.nls_iter {
                        self.nls.step(&self.tensor, &mut self.factors, regu)?;
                    }
                    residual_norm(&self.backend, &self.tensor, &self.factors)
                };
                let current = match batch() {
                    Ok(current) => current,
                    Err(err) => {
                        self.factors = snapshot;
                        return Err(err);
                    }
                };

                if current <= self.prev_res {
                    self.prev_res = current;
                    self.nls_steps += self.config.nls_iter;
                } else {
                    self.factors = snapshot;
                    self.mode = SolverMode::Als;
                    if self.backend.is_master_proc() {
                        tracing::info!(
                            before = self.prev_res.to_f64_lossy(),
                            after = current.to_f64_lossy(),
                            "NLS batch increased the residual, switching to ALS"
                        );
                    }
                }
            }
            SolverMode::Als => {
                self.als.step(&self.tensor, &mut self.factors, regu)?;
                self.als_count += 1;
                if self.als_count == self.config.als_iter {
                    self.mode = SolverMode::Nls;
                    if self.backend.is_master_proc() {
                        tracing::info!(als_sweeps = self.als_count, "switching from ALS to NLS");
                    }
                }
            }
        }

        if self.backend.is_master_proc() {
            tracing::debug!(nls_steps = self.nls_steps, "safe NLS step finished");
        }
        Ok(&self.factors)
    }

    pub fn mode(&self) -> SolverMode {
        self.mode
    }

    /// NLS steps kept so far
    pub fn nls_steps(&self) -> usize {
        self.nls_steps
    }

    /// ALS sweeps since the last NLS batch
    pub fn als_count(&self) -> usize {
        self.als_count
    }

    /// Residual the next NLS batch is compared against, if the caller
    /// passes it back unchanged
    pub fn prev_residual(&self) -> T {
        self.prev_res
    }

    pub fn factors(&self) -> &[Array2<T>] {
        &self.factors
    }

    pub fn into_factors(self) -> Vec<Array2<T>> {
        self.factors
    }

    pub fn tensor(&self) -> &DenseND<T> {
        &self.tensor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NlsError;
    use crate::step::StepReport;
    use crate::utils::fitness;
    use cpnls_kernels::KernelError;
    use scirs2_core::ndarray_ext::array;

    /// Counts calls and leaves the factors alone
    #[derive(Default)]
    struct Idle {
        calls: usize,
    }

    impl CpStep<f64> for Idle {
        fn step(
            &mut self,
            _tensor: &DenseND<f64>,
            _factors: &mut [Array2<f64>],
            _regu: f64,
        ) -> NlsResult<StepReport> {
            self.calls += 1;
            Ok(StepReport::als())
        }
    }

    /// Moves every entry by a fixed amount
    struct Shift(f64);

    impl CpStep<f64> for Shift {
        fn step(
            &mut self,
            _tensor: &DenseND<f64>,
            factors: &mut [Array2<f64>],
            _regu: f64,
        ) -> NlsResult<StepReport> {
            for f in factors.iter_mut() {
                f.mapv_inplace(|v| v + self.0);
            }
            Ok(StepReport::als())
        }
    }

    /// Shifts the factors on its first call and fails on every later one
    #[derive(Default)]
    struct FailsSecond {
        calls: usize,
    }

    impl CpStep<f64> for FailsSecond {
        fn step(
            &mut self,
            _tensor: &DenseND<f64>,
            factors: &mut [Array2<f64>],
            _regu: f64,
        ) -> NlsResult<StepReport> {
            self.calls += 1;
            if self.calls > 1 {
                return Err(NlsError::PreconditionerFailure {
                    mode: 0,
                    source: KernelError::not_positive_definite("cholesky", "pivot 0"),
                });
            }
            for f in factors.iter_mut() {
                f.mapv_inplace(|v| v + 0.3);
            }
            Ok(StepReport::als())
        }
    }

    fn exact_problem() -> (DenseND<f64>, Vec<Array2<f64>>) {
        let a = vec![
            array![[1.0, 0.0], [0.5, 1.0]],
            array![[1.0, 0.5], [0.0, 1.0], [1.0, 1.0]],
        ];
        let tensor = DenseND::from_array(cpnls_kernels::cp_compose(&a).unwrap());
        (tensor, a)
    }

    #[test]
    fn test_bootstrap_then_small_step_switches() {
        let (tensor, a) = exact_problem();
        let mut ctl = AlsNlsController::with_steppers(
            LocalBackend,
            tensor,
            a,
            HybridConfig::default(),
            Idle::default(),
            Idle::default(),
        )
        .unwrap();

        ctl.step(0.0).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Als);
        assert_eq!(ctl.als_count(), 1);

        // An ALS step that does not move the factors is below switch_tol
        ctl.step(0.0).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Nls);

        ctl.step(0.0).unwrap();
        assert_eq!(ctl.nls_stepper().calls, 1);
    }

    #[test]
    fn test_count_limit_switches() {
        let (tensor, a) = exact_problem();
        let config = HybridConfig::default().with_switch_tol(0.0).with_count_tol(3);
        let mut ctl =
            AlsNlsController::with_steppers(LocalBackend, tensor, a, config, Shift(0.5), Idle::default())
                .unwrap();

        for _ in 0..3 {
            ctl.step(0.0).unwrap();
            assert_eq!(ctl.mode(), SolverMode::Als);
        }
        ctl.step(0.0).unwrap();
        assert_eq!(ctl.als_count(), 4);
        assert_eq!(ctl.mode(), SolverMode::Nls);
    }

    #[test]
    fn test_safe_rejects_worse_batch() {
        let (tensor, a) = exact_problem();
        let config = SafeHybridConfig::default().with_als_iter(2);
        let mut ctl = SafeNlsController::with_steppers(
            LocalBackend,
            tensor,
            a.clone(),
            config,
            Idle::default(),
            Shift(0.1),
        )
        .unwrap();
        assert_eq!(ctl.mode(), SolverMode::Nls);

        let res = ctl.prev_residual();
        ctl.step(1e-2, res, 1.0).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Als);
        assert_eq!(ctl.factors(), &a[..]);
        assert_eq!(ctl.nls_steps(), 0);

        ctl.step(1e-2, res, 1.0).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Als);
        ctl.step(1e-2, res, 1.0).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Nls);
    }

    #[test]
    fn test_safe_keeps_improving_batch() {
        let (tensor, truth) = exact_problem();
        let start: Vec<Array2<f64>> = truth.iter().map(|m| m * 1.02).collect();
        let mut ctl =
            SafeNlsController::new(tensor.clone(), start, SafeHybridConfig::default(), NlsConfig::default())
                .unwrap();

        let backend = LocalBackend;
        let res = ctl.prev_residual();
        let fit = fitness(&backend, &tensor, ctl.factors()).unwrap();
        ctl.step(1e-3, res, fit).unwrap();
        assert_eq!(ctl.mode(), SolverMode::Nls);
        assert_eq!(ctl.nls_steps(), 2);
        assert!(ctl.prev_residual() < res);
    }

    #[test]
    fn test_safe_failed_batch_restores_factors() {
        let (tensor, a) = exact_problem();
        let config = SafeHybridConfig::default().with_nls_iter(2);
        let mut ctl = SafeNlsController::with_steppers(
            LocalBackend,
            tensor,
            a.clone(),
            config,
            Idle::default(),
            FailsSecond::default(),
        )
        .unwrap();

        let res = ctl.prev_residual();
        let err = ctl.step(1e-2, res, 0.5).unwrap_err();
        assert!(matches!(err, NlsError::PreconditionerFailure { mode: 0, .. }));
        assert_eq!(ctl.factors(), &a[..]);
        assert_eq!(ctl.mode(), SolverMode::Nls);
        assert_eq!(ctl.nls_steps(), 0);
    }
}
