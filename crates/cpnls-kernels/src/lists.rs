//! Vector-space arithmetic over lists of factor-shaped matrices
//!
//! The Gauss-Newton unknown is the whole list `[A₀, .., A_{N-1}]`, so the
//! CG recurrences operate on lists: the inner product of two lists is the sum
//! of the Frobenius inner products of their blocks.
//!
//! [`flatten`] and [`reshape_into_matrices`] convert between a list and one
//! concatenated vector (row-major per block, blocks in mode order).

use crate::error::{KernelError, KernelResult};
use crate::scalar::CpScalar;
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1};

fn check_conformant<T>(operation: &str, a: &[Array2<T>], b: &[Array2<T>]) -> KernelResult<()> {
    if a.len() != b.len() {
        return Err(KernelError::operation_error(
            operation,
            format!("List lengths differ: {} vs {}", a.len(), b.len()),
        ));
    }
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        if x.shape() != y.shape() {
            return Err(KernelError::dimension_mismatch(
                operation,
                x.shape().to_vec(),
                y.shape().to_vec(),
                format!("Block {} shapes differ", i),
            ));
        }
    }
    Ok(())
}

/// Zero list shaped like `template`
pub fn zeros_like<T: CpScalar>(template: &[Array2<T>]) -> Vec<Array2<T>> {
    template.iter().map(|m| Array2::zeros(m.raw_dim())).collect()
}

/// Block-wise sum `a + b`
pub fn list_add<T: CpScalar>(a: &[Array2<T>], b: &[Array2<T>]) -> KernelResult<Vec<Array2<T>>> {
    check_conformant("list_add", a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
}

/// Block-wise scaling `s · a`
pub fn scalar_mul<T: CpScalar>(s: T, a: &[Array2<T>]) -> Vec<Array2<T>> {
    a.iter().map(|x| x * s).collect()
}

/// In-place `y ← y + α·x`
pub fn list_axpy<T: CpScalar>(
    alpha: T,
    x: &[Array2<T>],
    y: &mut [Array2<T>],
) -> KernelResult<()> {
    check_conformant("list_axpy", x, y)?;
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        yi.scaled_add(alpha, xi);
    }
    Ok(())
}

/// Sum of Frobenius inner products `Σₙ ⟨aₙ, bₙ⟩`
pub fn mult_lists<T: CpScalar>(a: &[Array2<T>], b: &[Array2<T>]) -> KernelResult<T> {
    check_conformant("mult_lists", a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.iter().zip(y.iter()).fold(T::zero(), |acc, (&p, &q)| acc + p * q))
        .sum())
}

/// Squared norm of the concatenated list
pub fn list_vecnormsq<T: CpScalar>(a: &[Array2<T>]) -> T {
    a.iter()
        .map(|x| x.iter().fold(T::zero(), |acc, &v| acc + v * v))
        .sum()
}

/// Norm of the concatenated list
pub fn list_vecnorm<T: CpScalar>(a: &[Array2<T>]) -> T {
    list_vecnormsq(a).sqrt()
}

/// Total number of entries across the list (`Σₙ Iₙ·R` for CP factors)
pub fn num_variables<T>(template: &[Array2<T>]) -> usize {
    template.iter().map(|m| m.len()).sum()
}

/// Concatenate the blocks of a list into one vector
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use cpnls_kernels::{flatten, reshape_into_matrices};
///
/// let list = vec![array![[1.0, 2.0]], array![[3.0], [4.0]]];
/// let v = flatten(&list);
/// assert_eq!(v.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
/// let back = reshape_into_matrices(&v.view(), &list).unwrap();
/// assert_eq!(back, list);
/// ```
pub fn flatten<T: CpScalar>(list: &[Array2<T>]) -> Array1<T> {
    let mut out = Vec::with_capacity(num_variables(list));
    for block in list {
        out.extend(block.iter().copied());
    }
    Array1::from_vec(out)
}

/// Split a flat vector into matrices shaped like `template`
pub fn reshape_into_matrices<T: CpScalar>(
    vec: &ArrayView1<T>,
    template: &[Array2<T>],
) -> KernelResult<Vec<Array2<T>>> {
    let expected = num_variables(template);
    if vec.len() != expected {
        return Err(KernelError::dimension_mismatch(
            "reshape_into_matrices",
            vec![expected],
            vec![vec.len()],
            "Vector length must equal the number of variables in the template",
        ));
    }

    let mut offset = 0;
    let mut out = Vec::with_capacity(template.len());
    for block in template {
        let (rows, cols) = block.dim();
        let data: Vec<T> = vec
            .iter()
            .skip(offset)
            .take(rows * cols)
            .copied()
            .collect();
        let m = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| KernelError::operation_error("reshape_into_matrices", e.to_string()))?;
        out.push(m);
        offset += rows * cols;
    }
    Ok(out)
}
