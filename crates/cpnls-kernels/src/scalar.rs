//! Element type bound shared by every solver component

use scirs2_core::ndarray_ext::ScalarOperand;
use scirs2_core::numeric::{Float, FromPrimitive, NumAssign, NumCast};
use std::fmt::{Debug, Display};
use std::iter::Sum;

/// Floating-point element type accepted by the kernels and solvers
///
/// Implemented for `f32` and `f64` through the blanket impl.
pub trait CpScalar:
    Float
    + FromPrimitive
    + NumCast
    + NumAssign
    + Sum
    + ScalarOperand
    + Send
    + Sync
    + Debug
    + Display
    + 'static
{
    /// Convert an `f64` configuration constant into the element type
    fn from_f64_lossy(value: f64) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(Self::zero)
    }

    /// Convert to `f64` for logging and reporting
    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl<T> CpScalar for T where
    T: Float
        + FromPrimitive
        + NumCast
        + NumAssign
        + Sum
        + ScalarOperand
        + Send
        + Sync
        + Debug
        + Display
        + 'static
{
}
