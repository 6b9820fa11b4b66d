//! # cpnls-decomp - Gauss-Newton CP Decomposition
//!
//! Damped Gauss-Newton (nonlinear least squares) optimization of the CP model,
//! with a preconditioned conjugate gradient inner solver and two ALS/NLS hybrid
//! controllers.
//!
//! ## Overview
//!
//! The CP model of an N-mode tensor T is a list of factor matrices
//! `A₀ … A_{N−1}`, with `Aₙ` of shape `(Iₙ, R)`:
//!
//! ```text
//! T ≈ [[A₀, …, A_{N−1}]] = Σᵣ a₀ᵣ ⊗ a₁ᵣ ⊗ … ⊗ a_{N−1,r}
//! ```
//!
//! One NLS step linearizes the residual at the current factors and solves the
//! damped normal equations `(JᵀJ + Regu·D)·δ = −Jᵀr` matrix-free:
//!
//! - [`gram`] - Grams `Gₙ = AₙᵀAₙ` and the coupling products `Γ(n,p)`
//! - [`gradient`] - all N MTTKRPs from a shared contraction tree
//! - [`hessian`] - the implicit Gauss-Newton matrix with Jacobi damping
//! - [`precond`] - the Cholesky-factored block-diagonal preconditioner
//! - [`pcg`] - preconditioned CG over factor lists, and a flat-vector variant
//!   driven through [`crate::LinearOperator`]
//! - [`nls`] - the step, its accumulated state, and [`crate::CpNlsOptimizer`]
//!
//! ALS sweeps ([`als`]) converge cheaply far from a minimum; NLS steps
//! converge fast close to one. [`hybrid`] combines them:
//!
//! - [`crate::AlsNlsController`] runs ALS until the factors stop moving,
//!   then switches to NLS for good
//! - [`crate::SafeNlsController`] runs NLS in small batches and falls back to
//!   ALS whenever a batch makes the residual worse
//!
//! ## Quick Start
//!
//! ```
//! use cpnls_core::DenseND;
//! use cpnls_decomp::{CpNlsOptimizer, NlsConfig};
//! use scirs2_core::ndarray_ext::array;
//!
//! let truth = vec![
//!     array![[1.0, 0.2], [0.3, 1.0], [0.5, -0.5]],
//!     array![[1.0, 0.0], [0.4, 1.0]],
//!     array![[0.8, 0.3], [-0.2, 1.0], [0.6, 0.6], [0.1, 0.9]],
//! ];
//! let tensor = DenseND::from_array(cpnls_kernels::cp_compose(&truth)?);
//! let start: Vec<_> = truth.iter().map(|a| a * 0.95 + 0.02).collect();
//!
//! let mut opt = CpNlsOptimizer::new(tensor, start, NlsConfig::default())?;
//! let r0 = opt.residual()?;
//! for _ in 0..5 {
//!     opt.step(1e-6)?;
//! }
//! assert!(opt.residual()? < r0);
//! println!("CG iterations: {}", opt.total_cg_iterations());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! For a full decomposition from random factors see [`crate::cp_nls`].
//!
//! ## SciRS2 Integration
//!
//! All array operations use `scirs2_core::ndarray_ext`; the dense
//! factorizations go through `cpnls_kernels`, which wraps `scirs2_linalg`.
//! Random initialization uses `scirs2_core::random`.
//! Direct use of `ndarray` or `rand` is forbidden per project policy.
//!
//! ## References
//!
//! - Kolda & Bader (2009), "Tensor Decompositions and Applications"
//! - Sorber, Van Barel & De Lathauwer (2013), "Optimization-Based Algorithms
//!   for Tensor Decompositions"
//! - Singh, Ma, Yang & Solomonik (2021), "Comparison of Accuracy and
//!   Scalability of Gauss-Newton and Alternating Least Squares for CP
//!   Decomposition"

#![deny(warnings)]

pub mod als;
pub mod config;
pub mod cp;
pub mod error;
pub mod gradient;
pub mod gram;
pub mod hessian;
pub mod hybrid;
pub mod nls;
pub mod operator;
pub mod pcg;
pub mod precond;
pub mod step;
pub mod utils;


// Re-exports
pub use als::AlsStepper;
pub use config::{CpNlsConfig, DampingSchedule, HybridConfig, NlsConfig, SafeHybridConfig};
pub use cp::*;
pub use error::{NlsError, NlsResult};
pub use gradient::gradient;
pub use gram::{compute_gamma, compute_gram, Coupling};
pub use hessian::{power_iteration, rayleigh_quotient, FlatHessian, GaussNewtonHessian};
pub use hybrid::{AlsNlsController, SafeNlsController, SolverMode};
pub use nls::{CpNlsOptimizer, NlsStepper};
pub use operator::{IdentityOperator, LinearOperator};
pub use pcg::{cg, pcg, pcg_tolerance, PcgStatus, SolverInfo};
pub use precond::{BlockDiagPreconditioner, FlatBlockPreconditioner};
pub use step::{CpStep, StepKind, StepReport};
pub use utils::{fitness, fitness_from_residual, residual_norm, validate_problem};
