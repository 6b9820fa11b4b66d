//! Solver parameters
//!
//! Plain parameter structs with defaults, `with_*` builders and a
//! `validate()` check. All of them (de)serialize with serde, so a run can be
//! described in a config file.

use crate::error::{NlsError, NlsResult};
use serde::{Deserialize, Serialize};

/// Parameters of one Gauss-Newton step and its inner PCG solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlsConfig {
    /// Relative CG tolerance; the solve stops once `‖r‖ < max(atol, cg_tol·‖g‖)`
    pub cg_tol: f64,

    /// Hard cap on CG iterations per outer step
    pub maxiter: usize,

    /// Scale of the absolute CG tolerance carried between steps
    /// (`atol = num·‖delta‖` after every step)
    pub num: f64,

    /// Use the block-diagonal Cholesky preconditioner
    pub preconditioned: bool,
}

impl Default for NlsConfig {
    fn default() -> Self {
        Self {
            cg_tol: 1e-4,
            maxiter: 200,
            num: 0.0,
            preconditioned: true,
        }
    }
}

impl NlsConfig {
    pub fn with_cg_tol(mut self, cg_tol: f64) -> Self {
        self.cg_tol = cg_tol;
        self
    }

    pub fn with_maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = maxiter;
        self
    }

    pub fn with_num(mut self, num: f64) -> Self {
        self.num = num;
        self
    }

    pub fn with_preconditioner(mut self, preconditioned: bool) -> Self {
        self.preconditioned = preconditioned;
        self
    }

    pub fn validate(&self) -> NlsResult<()> {
        if !(self.cg_tol.is_finite() && self.cg_tol >= 0.0) {
            return Err(NlsError::InvalidTolerance(self.cg_tol));
        }
        if !(self.num.is_finite() && self.num >= 0.0) {
            return Err(NlsError::InvalidConfig(format!(
                "num must be a non-negative finite number, got {}",
                self.num
            )));
        }
        if self.maxiter == 0 {
            return Err(NlsError::InvalidConfig("maxiter must be at least 1".into()));
        }
        Ok(())
    }
}

/// Switching rule of the step-size triggered ALS/NLS controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Switch to NLS once an ALS sweep moves the factors by less than this
    pub switch_tol: f64,

    /// Switch to NLS once more than this many ALS sweeps have run
    pub count_tol: usize,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            switch_tol: 0.1,
            count_tol: 50,
        }
    }
}

impl HybridConfig {
    pub fn with_switch_tol(mut self, switch_tol: f64) -> Self {
        self.switch_tol = switch_tol;
        self
    }

    pub fn with_count_tol(mut self, count_tol: usize) -> Self {
        self.count_tol = count_tol;
        self
    }

    pub fn validate(&self) -> NlsResult<()> {
        if !(self.switch_tol.is_finite() && self.switch_tol >= 0.0) {
            return Err(NlsError::InvalidTolerance(self.switch_tol));
        }
        Ok(())
    }
}

/// Switching rule of the residual-guarded NLS/ALS controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeHybridConfig {
    /// ALS sweeps to run after a rejected NLS batch before retrying NLS
    pub als_iter: usize,

    /// NLS steps per batch between residual checks
    pub nls_iter: usize,

    /// Fitness from which NLS steps use `converged_regu`
    pub fitness_threshold: f64,

    /// Damping used once the fit is good enough
    pub converged_regu: f64,
}

impl Default for SafeHybridConfig {
    fn default() -> Self {
        Self {
            als_iter: 10,
            nls_iter: 2,
            fitness_threshold: 0.999,
            converged_regu: 1e-5,
        }
    }
}

impl SafeHybridConfig {
    pub fn with_als_iter(mut self, als_iter: usize) -> Self {
        self.als_iter = als_iter;
        self
    }

    pub fn with_nls_iter(mut self, nls_iter: usize) -> Self {
        self.nls_iter = nls_iter;
        self
    }

    pub fn with_fitness_threshold(mut self, fitness_threshold: f64) -> Self {
        self.fitness_threshold = fitness_threshold;
        self
    }

    pub fn with_converged_regu(mut self, converged_regu: f64) -> Self {
        self.converged_regu = converged_regu;
        self
    }

    pub fn validate(&self) -> NlsResult<()> {
        if self.als_iter == 0 || self.nls_iter == 0 {
            return Err(NlsError::InvalidConfig(
                "als_iter and nls_iter must be at least 1".into(),
            ));
        }
        if !(self.converged_regu.is_finite() && self.converged_regu > 0.0) {
            return Err(NlsError::InvalidConfig(format!(
                "converged_regu must be positive, got {}",
                self.converged_regu
            )));
        }
        Ok(())
    }
}

/// Geometric damping decay used by [`crate::cp_nls`]
///
/// Outer iteration `k` uses `max(floor, initial·decayᵏ)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingSchedule {
    pub initial: f64,
    pub decay: f64,
    pub floor: f64,
}

impl Default for DampingSchedule {
    fn default() -> Self {
        Self {
            initial: 1e-2,
            decay: 0.5,
            floor: 1e-6,
        }
    }
}

impl DampingSchedule {
    /// Constant damping `regu` at every iteration
    pub fn constant(regu: f64) -> Self {
        Self {
            initial: regu,
            decay: 1.0,
            floor: regu,
        }
    }

    /// Damping for outer iteration `iter`
    pub fn at(&self, iter: usize) -> f64 {
        let exp = i32::try_from(iter).unwrap_or(i32::MAX);
        (self.initial * self.decay.powi(exp)).max(self.floor)
    }

    pub fn validate(&self) -> NlsResult<()> {
        let positive = |x: f64| x.is_finite() && x > 0.0;
        if !positive(self.initial) || !positive(self.floor) {
            return Err(NlsError::InvalidConfig(
                "damping initial value and floor must be positive".into(),
            ));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(NlsError::InvalidConfig(format!(
                "damping decay must lie in (0, 1], got {}",
                self.decay
            )));
        }
        Ok(())
    }
}

/// Everything [`crate::cp_nls`] needs besides the tensor and rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpNlsConfig {
    pub nls: NlsConfig,
    pub hybrid: HybridConfig,
    pub damping: DampingSchedule,
}

impl CpNlsConfig {
    pub fn with_nls(mut self, nls: NlsConfig) -> Self {
        self.nls = nls;
        self
    }

    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    pub fn with_damping(mut self, damping: DampingSchedule) -> Self {
        self.damping = damping;
        self
    }

    pub fn validate(&self) -> NlsResult<()> {
        self.nls.validate()?;
        self.hybrid.validate()?;
        self.damping.validate()
    }
}
