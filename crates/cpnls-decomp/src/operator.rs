//! Matrix-free linear operators on flat vectors

use crate::error::NlsResult;
use cpnls_kernels::CpScalar;
use scirs2_core::ndarray_ext::{Array1, ArrayView1};

/// A square linear map `x ↦ Ax` that is only available through products
pub trait LinearOperator<T: CpScalar> {
    /// Length of the vectors the operator acts on
    fn dim(&self) -> usize;

    /// `A·x`
    fn matvec(&self, x: &ArrayView1<T>) -> NlsResult<Array1<T>>;
}

/// `x ↦ x`
#[derive(Debug, Clone, Copy)]
pub struct IdentityOperator {
    pub dim: usize,
}

impl<T: CpScalar> LinearOperator<T> for IdentityOperator {
    fn dim(&self) -> usize {
        self.dim
    }

    fn matvec(&self, x: &ArrayView1<T>) -> NlsResult<Array1<T>> {
        Ok(x.to_owned())
    }
}
