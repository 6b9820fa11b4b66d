//! Error type for the Gauss-Newton CP solvers
//!
//! PCG reaching its iteration cap or meeting non-positive curvature is not an
//! error; it is reported through [`crate::SolverInfo`]. Everything here is fatal for the step that raised it.

use cpnls_kernels::KernelError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NlsError {
    #[error("Invalid rank: {0}")]
    InvalidRank(usize),

    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mode count mismatch: tensor has {tensor_modes} modes, got {factors} factor matrices")]
    ModeCountMismatch { tensor_modes: usize, factors: usize },

    #[error("Dimension mismatch in mode {mode}: tensor size {expected}, factor has {actual} rows")]
    DimensionMismatch {
        mode: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Rank mismatch at factor {mode}: expected {expected} columns, got {actual}")]
    RankMismatch {
        mode: usize,
        expected: usize,
        actual: usize,
    },

    /// Damped diagonal Hessian block is not positive definite; retry the
    /// step with a larger damping factor
    #[error("Preconditioner failure in mode {mode}: {source}")]
    PreconditionerFailure {
        mode: usize,
        #[source]
        source: KernelError,
    },

    #[error("ALS normal equations for mode {mode} could not be factored: {source}")]
    SingularNormalEquations {
        mode: usize,
        #[source]
        source: KernelError,
    },

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

/// Result type for solver operations
pub type NlsResult<T> = Result<T, NlsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_preconditioner_failure_keeps_source() {
        let err = NlsError::PreconditionerFailure {
            mode: 2,
            source: KernelError::not_positive_definite("cholesky", "pivot 0"),
        };
        assert!(err.to_string().contains("mode 2"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kernel_error_conversion() {
        let err: NlsError = KernelError::invalid_mode(4, 3, "test").into();
        assert!(matches!(err, NlsError::Kernel(_)));
        assert!(err.to_string().contains("Invalid mode 4"));
    }
}
