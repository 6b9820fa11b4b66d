//! Hadamard (element-wise) products and Gram matrices
//!
//! The CP normal equations are assembled entirely from R×R matrices: the
//! Gram matrix `AᵀA` of each factor and Hadamard products of those.

use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array2, ArrayView2, ArrayViewMut2, Zip};

/// Element-wise product of two matrices
///
/// # Panics
///
/// Panics if the shapes of A and B don't match
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::hadamard;
///
/// let a = array![[1.0, 2.0], [3.0, 4.0]];
/// let b = array![[5.0, 6.0], [7.0, 8.0]];
/// let c = hadamard(&a.view(), &b.view());
/// assert_eq!(c[[1, 1]], 32.0);
/// ```
pub fn hadamard<T: CpScalar>(a: &ArrayView2<T>, b: &ArrayView2<T>) -> Array2<T> {
    assert_eq!(
        a.shape(),
        b.shape(),
        "Shapes must match for Hadamard product: {:?} vs {:?}",
        a.shape(),
        b.shape()
    );
    a * b
}

/// In-place element-wise product: `a ← a ⊙ b`
///
/// # Panics
///
/// Panics if the shapes of A and B don't match
pub fn hadamard_inplace<T: CpScalar>(a: &mut ArrayViewMut2<T>, b: &ArrayView2<T>) {
    assert_eq!(
        a.shape(),
        b.shape(),
        "Shapes must match for Hadamard product: {:?} vs {:?}",
        a.shape(),
        b.shape()
    );
    Zip::from(a).and(b).for_each(|x, &y| *x *= y);
}

/// Gram matrix `FᵀF` of a factor matrix, shape (R, R)
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::gram_matrix;
///
/// let f = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
/// let g = gram_matrix(&f.view());
/// assert_eq!(g[[0, 0]], 35.0);
/// assert_eq!(g[[0, 1]], g[[1, 0]]);
/// ```
pub fn gram_matrix<T: CpScalar>(factor: &ArrayView2<T>) -> Array2<T> {
    factor.t().dot(factor)
}
