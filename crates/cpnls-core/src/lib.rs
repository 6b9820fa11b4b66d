//! # cpnls-core
//!
//! Dense tensor type shared by the cpnls CP decomposition crates.
//!
//! The decomposition target of a CP problem is an immutable N-way array.
//! [`DenseND`] wraps scirs2_core's dynamic-dimensionality arrays and adds
//! the handful of tensor-level operations the solvers need: creation,
//! deterministic random filling, Frobenius norms and element-wise difference.
//!
//! ## Quick Start
//!
//! ```
//! use cpnls_core::DenseND;
//!
//! let tensor = DenseND::<f64>::random_uniform_seeded(&[4, 5, 6], 0.0, 1.0, 7);
//! assert_eq!(tensor.shape(), &[4, 5, 6]);
//! assert_eq!(tensor.rank(), 3);
//! assert!(tensor.frobenius_norm() > 0.0);
//! ```
//!
//! ## SciRS2 Integration
//!
//! Storage and random number generation go through `scirs2_core`
//! (`ndarray_ext` and `random`); `ndarray` and `rand` are not used directly.

#![deny(warnings)]

pub mod dense;

pub use dense::DenseND;
