//! # cpnls-kernels
//!
//! Tensor kernels used by the Gauss-Newton CP solver, and the backend
//! contract that the solver talks to.
//!
//! **Key pieces:**
//! - **Mode contractions** - contract one mode of a tensor against a factor
//!   matrix, either introducing the rank index or carrying it along
//! - **MTTKRP** - all-but-one-mode contraction against the factor matrices
//! - **Gram / Hadamard** - the R×R building blocks of the CP normal equations
//! - **Dense linear algebra** - Cholesky (via `scirs2_linalg`) and triangular solves
//! - **Factor lists** - vector-space arithmetic over lists of factor-shaped matrices
//! - **[`TensorBackend`]** - the operations the solver delegates, with the
//!   single-process [`LocalBackend`]
//!
//! ## Quick Start
//!
//! ```rust
//! use scirs2_core::ndarray_ext::Array2;
//! use cpnls_core::DenseND;
//! use cpnls_kernels::{mttkrp, LocalBackend, TensorBackend};
//!
//! let tensor = DenseND::<f64>::ones(&[3, 4, 5]);
//! let factors = vec![
//!     Array2::<f64>::ones((3, 2)),
//!     Array2::<f64>::ones((4, 2)),
//!     Array2::<f64>::ones((5, 2)),
//! ];
//! let m = mttkrp(&tensor.view(), &factors, 1).unwrap();
//! assert_eq!(m.shape(), &[4, 2]);
//! assert_eq!(m[[0, 0]], 15.0);
//!
//! let backend = LocalBackend;
//! assert!(TensorBackend::<f64>::is_master_proc(&backend));
//! ```
//!
//! ## SciRS2 Integration
//!
//! This crate uses `scirs2-core` for all array operations and `scirs2-linalg`
//! for factorizations. Direct use of `ndarray` is not permitted.

#![deny(warnings)]

pub mod backend;
pub mod contractions;
pub mod error;
pub mod hadamard;
pub mod linalg;
pub mod lists;
pub mod mttkrp;
pub mod outer;
pub mod scalar;

// Re-exports
pub use backend::{LocalBackend, TensorBackend};
pub use contractions::*;
pub use error::{KernelError, KernelResult};
pub use hadamard::*;
pub use linalg::*;
pub use lists::*;
pub use mttkrp::*;
pub use outer::*;
pub use scalar::CpScalar;

#[cfg(test)]
mod property_tests;
