//! Dense factorizations and triangular solves
//!
//! Cholesky is delegated to `scirs2_linalg`; the triangular solves are plain
//! substitution because the right-hand sides here are factor-shaped matrices
//! solved from either side.

use crate::error::{KernelError, KernelResult};
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array2, ArrayView2};

/// Lower Cholesky factor `L` with `A = L·Lᵀ`
///
/// # Errors
///
/// Returns [`KernelError::NotPositiveDefinite`] if `A` is not symmetric
/// positive definite (or is not square).
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::cholesky;
///
/// let a = array![[4.0, 2.0], [2.0, 3.0]];
/// let l = cholesky(&a.view()).unwrap();
/// assert!((l[[0, 0]] - 2.0_f64).abs() < 1e-12);
/// assert_eq!(l[[0, 1]], 0.0);
/// ```
pub fn cholesky<T: CpScalar>(a: &ArrayView2<T>) -> KernelResult<Array2<T>> {
    if a.nrows() != a.ncols() {
        return Err(KernelError::dimension_mismatch(
            "cholesky",
            vec![a.nrows(), a.nrows()],
            a.shape().to_vec(),
            "Cholesky factorization requires a square matrix",
        ));
    }

    let l = scirs2_linalg::cholesky(a, None)
        .map_err(|e| KernelError::not_positive_definite("cholesky", e.to_string()))?;

    // Some backends report success on a non-finite factor instead of failing
    if l.iter().any(|x| !x.is_finite()) {
        return Err(KernelError::not_positive_definite(
            "cholesky",
            "factor contains non-finite entries",
        ));
    }

    // A zero pivot means the input was only semidefinite
    if let Some(i) = (0..l.nrows()).find(|&i| l[[i, i]] <= T::zero()) {
        return Err(KernelError::not_positive_definite(
            "cholesky",
            format!("non-positive pivot at index {}", i),
        ));
    }

    Ok(l)
}

/// Solve a triangular system with a matrix right-hand side
///
/// With `op(L) = Lᵀ` if `transpose` else `L`, solves
/// - `op(L)·X = B` when `from_left`
/// - `X·op(L) = B` otherwise
///
/// `lower` states which triangle of `l` holds the matrix; the other triangle
/// is ignored.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::solve_triangular;
///
/// let l = array![[2.0, 0.0], [1.0, 1.0]];
/// let b = array![[2.0, 2.0]];
/// // Solve X·L = B
/// let x = solve_triangular(&l.view(), &b.view(), true, false, false).unwrap();
/// assert!((x[[0, 0]] - 0.0_f64).abs() < 1e-12);
/// assert!((x[[0, 1]] - 2.0_f64).abs() < 1e-12);
/// ```
pub fn solve_triangular<T: CpScalar>(
    l: &ArrayView2<T>,
    rhs: &ArrayView2<T>,
    lower: bool,
    from_left: bool,
    transpose: bool,
) -> KernelResult<Array2<T>> {
    let n = l.nrows();
    if l.ncols() != n {
        return Err(KernelError::dimension_mismatch(
            "solve_triangular",
            vec![n, n],
            l.shape().to_vec(),
            "Triangular matrix must be square",
        ));
    }
    let solved_dim = if from_left { rhs.nrows() } else { rhs.ncols() };
    if solved_dim != n {
        return Err(KernelError::dimension_mismatch(
            "solve_triangular",
            vec![n],
            rhs.shape().to_vec(),
            "Right-hand side does not conform to the triangular matrix",
        ));
    }

    // X·op(L) = B  <=>  op(L)ᵀ·Xᵀ = Bᵀ, so a right solve is a left solve with
    // the transpose flag flipped, applied to the rows of B.
    let op_transposed = if from_left { transpose } else { !transpose };
    // op(L) is lower triangular iff exactly one of (upper storage, transpose) holds
    let op_lower = lower != op_transposed;
    let entry = |i: usize, j: usize| if op_transposed { l[[j, i]] } else { l[[i, j]] };

    let mut x = if from_left {
        rhs.to_owned()
    } else {
        rhs.t().to_owned()
    };

    for col in 0..x.ncols() {
        if op_lower {
            for i in 0..n {
                let mut sum = x[[i, col]];
                for j in 0..i {
                    sum -= entry(i, j) * x[[j, col]];
                }
                let d = entry(i, i);
                if d == T::zero() {
                    return Err(KernelError::singular_triangular("solve_triangular", i));
                }
                x[[i, col]] = sum / d;
            }
        } else {
            for i in (0..n).rev() {
                let mut sum = x[[i, col]];
                for j in (i + 1)..n {
                    sum -= entry(i, j) * x[[j, col]];
                }
                let d = entry(i, i);
                if d == T::zero() {
                    return Err(KernelError::singular_triangular("solve_triangular", i));
                }
                x[[i, col]] = sum / d;
            }
        }
    }

    Ok(if from_left { x } else { x.t().to_owned() })
}

/// Solve the SPD system `X·(L·Lᵀ) = B` given the lower Cholesky factor `L`
///
/// With `Z = X·L`: solve `Z·Lᵀ = B` first, then `X·L = Z`.
pub fn cholesky_solve_right<T: CpScalar>(
    l: &ArrayView2<T>,
    rhs: &ArrayView2<T>,
) -> KernelResult<Array2<T>> {
    let z = solve_triangular(l, rhs, true, false, true)?;
    solve_triangular(l, &z.view(), true, false, false)
}
