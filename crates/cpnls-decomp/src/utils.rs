//! Problem validation and reconstruction quality

use crate::error::{NlsError, NlsResult};
use cpnls_core::DenseND;
use cpnls_kernels::{CpScalar, TensorBackend};
use scirs2_core::ndarray_ext::Array2;

/// Check that `factors` describe a CP model of `tensor`'s shape
///
/// Returns the shared rank. Errors name the first offending mode.
pub fn validate_problem<T: CpScalar>(
    tensor: &DenseND<T>,
    factors: &[Array2<T>],
) -> NlsResult<usize> {
    let shape = tensor.shape();
    if factors.len() != shape.len() {
        return Err(NlsError::ModeCountMismatch {
            tensor_modes: shape.len(),
            factors: factors.len(),
        });
    }

    let rank = factors.first().map_or(0, |f| f.ncols());
    if rank == 0 {
        return Err(NlsError::InvalidRank(rank));
    }

    for (mode, (factor, &size)) in factors.iter().zip(shape.iter()).enumerate() {
        if factor.nrows() != size {
            return Err(NlsError::DimensionMismatch {
                mode,
                expected: size,
                actual: factor.nrows(),
            });
        }
        if factor.ncols() != rank {
            return Err(NlsError::RankMismatch {
                mode,
                expected: rank,
                actual: factor.ncols(),
            });
        }
    }
    Ok(rank)
}

/// `‖T − [[A]]‖_F`, by composing the model explicitly
///
/// Costs one dense tensor of the input's size; this is the figure the
/// controllers compare, not the cheaper Gram-based estimate.
pub fn residual_norm<T, B>(backend: &B, tensor: &DenseND<T>, factors: &[Array2<T>]) -> NlsResult<T>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let model = backend.compose(factors)?;
    let diff = &tensor.view() - &model;
    Ok(backend.norm(&diff.view()))
}

/// `1 − ‖T − [[A]]‖ / ‖T‖`
///
/// A zero tensor has fitness 1 when the model is zero too, and `−∞`
/// otherwise.
pub fn fitness<T, B>(backend: &B, tensor: &DenseND<T>, factors: &[Array2<T>]) -> NlsResult<T>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let residual = residual_norm(backend, tensor, factors)?;
    Ok(fitness_from_residual(backend.norm(&tensor.view()), residual))
}

/// `1 − residual / ‖T‖` for an already computed residual
pub fn fitness_from_residual<T: CpScalar>(tensor_norm: T, residual: T) -> T {
    if tensor_norm == T::zero() {
        if residual == T::zero() {
            T::one()
        } else {
            T::neg_infinity()
        }
    } else {
        T::one() - residual / tensor_norm
    }
}
