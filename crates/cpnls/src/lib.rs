//! # cpnls - Gauss-Newton CP Decomposition
//!
//! This is the **meta crate** that re-exports all cpnls components for
//! convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use cpnls::prelude::*;
//!
//! let tensor = DenseND::<f64>::random_uniform_seeded(&[6, 5, 4], 0.0, 1.0, 42);
//! let cp = cp_nls(&tensor, 2, 10, 1e-6, InitStrategy::Seeded(1), &CpNlsConfig::default())?;
//! assert_eq!(cp.factors.len(), 3);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Core Tensor Type ([`core`])
//!
//! The dense N-mode tensor the solvers fit.
//!
//! ```
//! use cpnls::core::DenseND;
//!
//! let tensor = DenseND::<f64>::ones(&[2, 3, 4]);
//! assert_eq!(tensor.shape(), &[2, 3, 4]);
//! ```
//!
//! ### Kernels ([`kernels`])
//!
//! Mode contractions, MTTKRP, Gram and Hadamard products, Cholesky, factor
//! list arithmetic, and the [`kernels::TensorBackend`] the solvers call.
//!
//! ```
//! use cpnls::kernels::{gram_matrix, hadamard};
//! use scirs2_core::ndarray_ext::array;
//!
//! let a = array![[1.0, 2.0], [3.0, 4.0]];
//! let g = gram_matrix(&a.view());
//! let h = hadamard(&g.view(), &g.view());
//! assert_eq!(h[[0, 0]], 100.0);
//! ```
//!
//! ### Solvers ([`decomp`])
//!
//! Damped Gauss-Newton steps with preconditioned CG, ALS sweeps, and the two
//! ALS/NLS controllers.
//!
//! ```
//! use cpnls::decomp::{NlsConfig, SafeHybridConfig};
//!
//! let nls = NlsConfig::default().with_cg_tol(1e-3).with_maxiter(50);
//! let safe = SafeHybridConfig::default().with_nls_iter(3);
//! assert!(nls.validate().is_ok() && safe.validate().is_ok());
//! ```

#![deny(warnings)]

// Re-export all components
pub use cpnls_core as core;
pub use cpnls_decomp as decomp;
pub use cpnls_kernels as kernels;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use cpnls::prelude::*;
    //!
    //! let tensor = DenseND::<f64>::zeros(&[10, 20, 30]);
    //! let config = CpNlsConfig::default();
    //! ```

    // Core types
    pub use crate::core::DenseND;

    // Solvers
    pub use crate::decomp::{
        cp_nls, AlsNlsController, CpDecomp, CpNlsConfig, CpNlsOptimizer, DampingSchedule,
        HybridConfig, InitStrategy, NlsConfig, NlsError, NlsResult, SafeHybridConfig,
        SafeNlsController, SolverInfo, SolverMode,
    };

    // Common kernels
    pub use crate::kernels::{cp_compose, mttkrp, CpScalar, LocalBackend, TensorBackend};
}
