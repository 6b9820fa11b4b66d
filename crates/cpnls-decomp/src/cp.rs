//! CP decomposition driver on top of the ALS/NLS controller
//!
//! The CP decomposition factorizes a tensor X into a sum of rank-1 tensors:
//!
//! X ≈ Σᵣ λᵣ (u₁ᵣ ⊗ u₂ᵣ ⊗ ... ⊗ uₙᵣ)
//!
//! [`cp_nls`] initializes the factors, then runs [`AlsNlsController`] with a
//! geometric damping schedule until the fit stops improving.
//!
//! # SciRS2 Integration
//!
//! All array operations use `scirs2_core::ndarray_ext`.
//! Random initialization uses `scirs2_core::random`.

use crate::als::AlsStepper;
use crate::config::CpNlsConfig;
use crate::error::{NlsError, NlsResult};
use crate::hybrid::AlsNlsController;
use crate::nls::NlsStepper;
use crate::utils::{fitness_from_residual, residual_norm};
use cpnls_core::DenseND;
use cpnls_kernels::{cp_compose, CpScalar, LocalBackend, TensorBackend};
use scirs2_core::ndarray_ext::{Array1, Array2};
use scirs2_core::random::{thread_rng, Distribution, RandNormal as Normal, Rng, SeedableRng, StdRng};

/// Initialization strategy for the factor matrices
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InitStrategy {
    /// Random initialization from uniform distribution [0, 1]
    Random,
    /// Random initialization from normal distribution N(0, 1)
    RandomNormal,
    /// Uniform [0, 1] from a fixed seed, for reproducible runs
    Seeded(u64),
}

/// CP decomposition result
#[derive(Debug, Clone)]
pub struct CpDecomp<T> {
    /// Factor matrices, one for each mode
    /// Each matrix has shape (Iₙ, R) where Iₙ is the mode size and R is the rank
    pub factors: Vec<Array2<T>>,

    /// Weights for each rank-1 component (optional)
    /// If None, weights are absorbed into the factor matrices
    pub weights: Option<Array1<T>>,

    /// Final fit value
    /// fit = 1 - ||X - X_reconstructed|| / ||X||
    pub fit: T,

    /// Number of outer iterations performed
    pub iters: usize,

    /// CG iterations summed over every NLS step
    pub cg_iters: usize,
}

impl<T: CpScalar> CpDecomp<T> {
    /// Reconstruct the dense tensor
    ///
    /// # Complexity
    ///
    /// Time: O(R × ∏ᵢ Iᵢ)
    /// Space: O(R × ∏ᵢ Iᵢ)
    pub fn reconstruct(&self, shape: &[usize]) -> NlsResult<DenseND<T>> {
        if shape.len() != self.factors.len() {
            return Err(NlsError::ModeCountMismatch {
                tensor_modes: shape.len(),
                factors: self.factors.len(),
            });
        }
        for (mode, (factor, &size)) in self.factors.iter().zip(shape.iter()).enumerate() {
            if factor.nrows() != size {
                return Err(NlsError::DimensionMismatch {
                    mode,
                    expected: size,
                    actual: factor.nrows(),
                });
            }
        }

        // Fold the weights into the first factor
        let mut factors = self.factors.clone();
        if let (Some(weights), Some(first)) = (&self.weights, factors.first_mut()) {
            for (r, &w) in weights.iter().enumerate() {
                first.column_mut(r).mapv_inplace(|x| x * w);
            }
        }

        Ok(DenseND::from_array(cp_compose(&factors)?))
    }

    /// Extract weights from factor matrices by normalizing columns
    ///
    /// Each factor matrix column is normalized to unit length,
    /// and the norms are accumulated as weights.
    pub fn extract_weights(&mut self) {
        let rank = self.factors.first().map_or(0, |f| f.ncols());
        let mut weights = self
            .weights
            .take()
            .unwrap_or_else(|| Array1::<T>::ones(rank));

        for factor in &mut self.factors {
            for (r, mut column) in factor.columns_mut().into_iter().enumerate() {
                let norm = column.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt();
                if norm > T::epsilon() {
                    weights[r] *= norm;
                    column.mapv_inplace(|x| x / norm);
                }
            }
        }

        self.weights = Some(weights);
    }
}

fn uniform_factors<T: CpScalar, R: Rng>(rng: &mut R, shape: &[usize], rank: usize) -> Vec<Array2<T>> {
    shape
        .iter()
        .map(|&mode_size| {
            Array2::from_shape_fn((mode_size, rank), |_| T::from_f64_lossy(rng.random::<f64>()))
        })
        .collect()
}

/// Initialize factor matrices for `shape` based on strategy
pub fn initialize_factors<T: CpScalar>(
    shape: &[usize],
    rank: usize,
    init: InitStrategy,
) -> NlsResult<Vec<Array2<T>>> {
    match init {
        InitStrategy::Random => Ok(uniform_factors(&mut thread_rng(), shape, rank)),
        InitStrategy::Seeded(seed) => Ok(uniform_factors(&mut StdRng::seed_from_u64(seed), shape, rank)),
        InitStrategy::RandomNormal => {
            let normal =
                Normal::new(0.0, 1.0).map_err(|e| NlsError::InvalidConfig(e.to_string()))?;
            let mut rng = thread_rng();
            Ok(shape
                .iter()
                .map(|&mode_size| {
                    Array2::from_shape_fn((mode_size, rank), |_| {
                        T::from_f64_lossy(normal.sample(&mut rng))
                    })
                })
                .collect())
        }
    }
}

/// Compute a CP decomposition with the ALS/NLS hybrid
///
/// # Arguments
///
/// * `tensor` - Input tensor to decompose
/// * `rank` - Target CP rank (number of components)
/// * `max_iters` - Maximum number of outer iterations
/// * `tol` - Convergence tolerance on fit improvement
/// * `init` - Initialization strategy
/// * `config` - NLS, switching and damping parameters
///
/// # Errors
///
/// Returns error if:
/// - Rank is 0
/// - Tolerance is invalid (negative or >= 1)
/// - The configuration is invalid
/// - A preconditioner or ALS factorization fails
///
/// # Examples
///
/// ```
/// use cpnls_core::DenseND;
/// use cpnls_decomp::{cp_nls, CpNlsConfig, InitStrategy};
///
/// let tensor = DenseND::<f64>::random_uniform_seeded(&[6, 5, 4], 0.0, 1.0, 1);
/// let cp = cp_nls(&tensor, 3, 20, 1e-6, InitStrategy::Seeded(7), &CpNlsConfig::default()).unwrap();
/// assert_eq!(cp.factors.len(), 3);
/// assert!(cp.iters <= 20);
/// println!("fit = {:.4}, CG iterations = {}", cp.fit, cp.cg_iters);
/// ```
pub fn cp_nls<T: CpScalar>(
    tensor: &DenseND<T>,
    rank: usize,
    max_iters: usize,
    tol: f64,
    init: InitStrategy,
    config: &CpNlsConfig,
) -> NlsResult<CpDecomp<T>> {
    if rank == 0 {
        return Err(NlsError::InvalidRank(rank));
    }
    if !(0.0..1.0).contains(&tol) {
        return Err(NlsError::InvalidTolerance(tol));
    }
    config.validate()?;

    let backend = LocalBackend;
    let factors = initialize_factors(tensor.shape(), rank, init)?;
    let tensor_norm = backend.norm(&tensor.view());

    let mut controller = AlsNlsController::with_steppers(
        backend,
        tensor.clone(),
        factors,
        config.hybrid,
        AlsStepper::new(),
        NlsStepper::new(config.nls)?,
    )?;

    let tol = T::from_f64_lossy(tol);
    let mut prev_fit = T::zero();
    let mut fit = T::zero();
    let mut iters = 0;

    for iter in 0..max_iters {
        iters = iter + 1;
        let regu = T::from_f64_lossy(config.damping.at(iter));
        controller.step(regu)?;

        let residual = residual_norm(&backend, tensor, controller.factors())?;
        fit = fitness_from_residual(tensor_norm, residual);
        tracing::debug!(
            iter,
            mode = ?controller.mode(),
            fit = fit.to_f64_lossy(),
            "cp_nls iteration"
        );

        if iter > 0 && (fit - prev_fit).abs() < tol {
            break;
        }
        prev_fit = fit;
    }

    let cg_iters = controller.nls_stepper().total_cg_iterations();
    tracing::info!(iters, cg_iters, fit = fit.to_f64_lossy(), "cp_nls finished");

    Ok(CpDecomp {
        factors: controller.into_factors(),
        weights: None,
        fit,
        iters,
        cg_iters,
    })
}
