//! Dense tensor type definition and basic operations
//!
//! Row-major (C-contiguous) storage is assumed throughout the stack: mode 0
//! is the slowest-varying index.

use scirs2_core::ndarray_ext::{Array, ArrayView, IxDyn};
use scirs2_core::numeric::{Float, Num, NumCast};
use scirs2_core::random::{SeedableRng, StdRng};
use std::ops::Sub;

/// Dense N-dimensional tensor backed by scirs2_core's ndarray
///
/// # Examples
///
/// ```
/// use cpnls_core::DenseND;
///
/// let tensor = DenseND::<f64>::zeros(&[2, 3, 4]);
/// assert_eq!(tensor.shape(), &[2, 3, 4]);
/// assert_eq!(tensor.len(), 24);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DenseND<T> {
    data: Array<T, IxDyn>,
}

impl<T> DenseND<T>
where
    T: Clone + Num,
{
    /// Create a tensor from an existing dynamic-dimension array
    pub fn from_array(array: Array<T, IxDyn>) -> Self {
        Self { data: array }
    }

    /// Create a tensor from row-major data with the given shape
    ///
    /// # Examples
    ///
    /// ```
    /// use cpnls_core::DenseND;
    ///
    /// let tensor = DenseND::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// assert_eq!(tensor.shape(), &[2, 3]);
    /// assert!(DenseND::from_vec(vec![1.0, 2.0], &[2, 3]).is_err());
    /// ```
    pub fn from_vec(vec: Vec<T>, shape: &[usize]) -> anyhow::Result<Self> {
        let total: usize = shape.iter().product();
        if vec.len() != total {
            anyhow::bail!(
                "Shape {:?} requires {} elements, but got {}",
                shape,
                total,
                vec.len()
            );
        }
        let array = Array::from_shape_vec(IxDyn(shape), vec)?;
        Ok(Self { data: array })
    }

    /// Tensor of zeros
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: Array::zeros(IxDyn(shape)),
        }
    }

    /// Tensor of ones
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: Array::ones(IxDyn(shape)),
        }
    }

    /// Tensor filled with `value`
    pub fn from_elem(shape: &[usize], value: T) -> Self {
        Self {
            data: Array::from_elem(IxDyn(shape), value),
        }
    }

    /// Number of modes
    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    /// Mode sizes
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor has zero elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Immutable reference to the underlying array
    pub fn as_array(&self) -> &Array<T, IxDyn> {
        &self.data
    }

    /// Consume the tensor and return the underlying array
    pub fn into_array(self) -> Array<T, IxDyn> {
        self.data
    }

    /// Immutable view of the tensor
    pub fn view(&self) -> ArrayView<'_, T, IxDyn> {
        self.data.view()
    }
}

impl<T> DenseND<T>
where
    T: Clone + Num + NumCast,
{
    /// Tensor with values drawn uniformly from `[low, high)` using the thread RNG
    ///
    /// Uses scirs2_core::random, never rand directly.
    pub fn random_uniform(shape: &[usize], low: f64, high: f64) -> Self {
        use scirs2_core::random::quick::random_f64;
        let range = high - low;
        let data = Array::from_shape_simple_fn(IxDyn(shape), || {
            let sample = low + random_f64() * range;
            T::from(sample).unwrap_or_else(T::zero)
        });
        Self { data }
    }

    /// Tensor with values drawn uniformly from `[low, high)` with a fixed seed
    ///
    /// Two calls with the same arguments produce identical tensors, which is
    /// what tests and multi-process runs rely on.
    ///
    /// # Examples
    ///
    /// ```
    /// use cpnls_core::DenseND;
    ///
    /// let a = DenseND::<f64>::random_uniform_seeded(&[3, 3], -1.0, 1.0, 42);
    /// let b = DenseND::<f64>::random_uniform_seeded(&[3, 3], -1.0, 1.0, 42);
    /// assert_eq!(a, b);
    /// ```
    pub fn random_uniform_seeded(shape: &[usize], low: f64, high: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = Array::from_shape_simple_fn(IxDyn(shape), || {
            let sample: f64 = rng.random_range(low..high);
            T::from(sample).unwrap_or_else(T::zero)
        });
        Self { data }
    }
}

impl<T: Float> DenseND<T> {
    /// Squared Frobenius norm: Σ x²
    pub fn norm_squared(&self) -> T {
        self.data.iter().fold(T::zero(), |acc, &x| acc + x * x)
    }

    /// Frobenius norm: sqrt(Σ x²)
    pub fn frobenius_norm(&self) -> T {
        self.norm_squared().sqrt()
    }
}

impl<T> std::ops::Index<&[usize]> for DenseND<T> {
    type Output = T;

    fn index(&self, index: &[usize]) -> &Self::Output {
        &self.data[IxDyn(index)]
    }
}

impl<'a, T> Sub<&'a DenseND<T>> for &'a DenseND<T>
where
    T: Clone + Num,
{
    type Output = DenseND<T>;

    /// Element-wise difference; panics on shape mismatch like ndarray does.
    fn sub(self, rhs: &'a DenseND<T>) -> DenseND<T> {
        DenseND {
            data: &self.data - &rhs.data,
        }
    }
}
