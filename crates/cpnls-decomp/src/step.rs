//! The "one outer step" capability shared by ALS and NLS

use crate::error::NlsResult;
use crate::pcg::SolverInfo;
use cpnls_core::DenseND;
use cpnls_kernels::CpScalar;
use scirs2_core::ndarray_ext::Array2;

/// Which kind of update a step performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Als,
    Nls,
}

/// Outcome of one outer step
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub kind: StepKind,
    /// Inner solve statistics, for NLS steps
    pub cg: Option<SolverInfo>,
}

impl StepReport {
    pub fn als() -> Self {
        Self {
            kind: StepKind::Als,
            cg: None,
        }
    }

    pub fn nls(info: SolverInfo) -> Self {
        Self {
            kind: StepKind::Nls,
            cg: Some(info),
        }
    }

    pub fn cg_iterations(&self) -> usize {
        self.cg.as_ref().map_or(0, |info| info.iterations)
    }
}

/// Update `factors` in place by one outer iteration with damping `regu`
///
/// Implementors assume `factors` already conform to `tensor`.
pub trait CpStep<T: CpScalar> {
    fn step(
        &mut self,
        tensor: &DenseND<T>,
        factors: &mut [Array2<T>],
        regu: T,
    ) -> NlsResult<StepReport>;
}
