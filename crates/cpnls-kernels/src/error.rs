//! Error types for tensor kernel operations

use std::fmt;

/// Error type for tensor kernel operations
#[derive(Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Dimension mismatch between operands
    DimensionMismatch {
        operation: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
        context: String,
    },

    /// Invalid mode/axis specification
    InvalidMode {
        mode: usize,
        max_mode: usize,
        context: String,
    },

    /// Factor matrices with differing column counts
    RankMismatch {
        operation: String,
        expected_rank: usize,
        actual_rank: usize,
        factor_index: usize,
    },

    /// Empty input not allowed
    EmptyInput {
        operation: String,
        parameter: String,
    },

    /// Cholesky factorization hit a non-positive pivot
    NotPositiveDefinite { operation: String, message: String },

    /// Zero on the diagonal of a triangular system
    SingularTriangular { operation: String, index: usize },

    /// Generic operation error with context
    OperationError { operation: String, message: String },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::DimensionMismatch {
                operation,
                expected,
                actual,
                context,
            } => write!(
                f,
                "{}: dimension mismatch - expected {:?}, got {:?}. {}",
                operation, expected, actual, context
            ),

            KernelError::InvalidMode {
                mode,
                max_mode,
                context,
            } => write!(
                f,
                "Invalid mode {}: must be < {}. {}",
                mode, max_mode, context
            ),

            KernelError::RankMismatch {
                operation,
                expected_rank,
                actual_rank,
                factor_index,
            } => write!(
                f,
                "{}: rank mismatch at factor {}: expected rank {}, got {}",
                operation, factor_index, expected_rank, actual_rank
            ),

            KernelError::EmptyInput {
                operation,
                parameter,
            } => write!(
                f,
                "{}: empty input not allowed for parameter '{}'",
                operation, parameter
            ),

            KernelError::NotPositiveDefinite { operation, message } => write!(
                f,
                "{}: matrix is not positive definite: {}",
                operation, message
            ),

            KernelError::SingularTriangular { operation, index } => write!(
                f,
                "{}: singular triangular matrix, zero pivot at {}",
                operation, index
            ),

            KernelError::OperationError { operation, message } => {
                write!(f, "{}: {}", operation, message)
            }
        }
    }
}

impl std::error::Error for KernelError {}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Create a dimension mismatch error
    pub fn dimension_mismatch(
        operation: impl Into<String>,
        expected: Vec<usize>,
        actual: Vec<usize>,
        context: impl Into<String>,
    ) -> Self {
        KernelError::DimensionMismatch {
            operation: operation.into(),
            expected,
            actual,
            context: context.into(),
        }
    }

    /// Create an invalid mode error
    pub fn invalid_mode(mode: usize, max_mode: usize, context: impl Into<String>) -> Self {
        KernelError::InvalidMode {
            mode,
            max_mode,
            context: context.into(),
        }
    }

    /// Create a rank mismatch error
    pub fn rank_mismatch(
        operation: impl Into<String>,
        expected_rank: usize,
        actual_rank: usize,
        factor_index: usize,
    ) -> Self {
        KernelError::RankMismatch {
            operation: operation.into(),
            expected_rank,
            actual_rank,
            factor_index,
        }
    }

    /// Create an empty input error
    pub fn empty_input(operation: impl Into<String>, parameter: impl Into<String>) -> Self {
        KernelError::EmptyInput {
            operation: operation.into(),
            parameter: parameter.into(),
        }
    }

    /// Create a not-positive-definite error
    pub fn not_positive_definite(
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        KernelError::NotPositiveDefinite {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a singular triangular error
    pub fn singular_triangular(operation: impl Into<String>, index: usize) -> Self {
        KernelError::SingularTriangular {
            operation: operation.into(),
            index,
        }
    }

    /// Create a generic operation error
    pub fn operation_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        KernelError::OperationError {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
