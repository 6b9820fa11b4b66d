//! Gram matrices and the coupling matrices built from them
//!
//! For factors `A₀, .., A_{N-1}` of rank `R`:
//!
//! - `Gₙ = Aₙᵀ Aₙ`
//! - `γ(n, p) = ⊙_{k ∉ {n, p}} Gₖ`, starting from the all-ones `R×R` matrix
//!
//! `γ` is symmetric in its two mode indices, so only the pairs `p ≥ n` are
//! computed and stored; [`Coupling::gamma`] answers both orders.

use cpnls_kernels::{CpScalar, TensorBackend};
use scirs2_core::ndarray_ext::Array2;

/// `Gₙ = Aₙᵀ Aₙ` for every mode
pub fn compute_gram<T, B>(backend: &B, factors: &[Array2<T>]) -> Vec<Array2<T>>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    factors.iter().map(|a| backend.gram(&a.view())).collect()
}

/// Coupling matrices for every mode pair
#[derive(Debug, Clone, PartialEq)]
pub struct Coupling<T> {
    /// `upper[n][p - n] = γ(n, p)` for `p ≥ n`
    upper: Vec<Vec<Array2<T>>>,
}

impl<T: CpScalar> Coupling<T> {
    /// Number of modes
    pub fn n_modes(&self) -> usize {
        self.upper.len()
    }

    /// `γ(n, p)`; symmetric in `n` and `p`
    ///
    /// # Panics
    ///
    /// Panics if either mode is out of range.
    pub fn gamma(&self, n: usize, p: usize) -> &Array2<T> {
        let (lo, hi) = if p >= n { (n, p) } else { (p, n) };
        &self.upper[lo][hi - lo]
    }
}

/// Build `γ(n, p)` from the Gram matrices
///
/// Cost is `O(N³·R²)` Hadamard work, independent of the tensor size.
pub fn compute_gamma<T, B>(backend: &B, grams: &[Array2<T>]) -> Coupling<T>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let n_modes = grams.len();
    let rank = grams.first().map_or(0, |g| g.nrows());

    let mut upper = Vec::with_capacity(n_modes);
    for n in 0..n_modes {
        let mut row = Vec::with_capacity(n_modes - n);
        for p in n..n_modes {
            let mut acc = Array2::<T>::ones((rank, rank));
            for (k, g) in grams.iter().enumerate() {
                if k != n && k != p {
                    backend.hadamard_assign(&mut acc, &g.view());
                }
            }
            row.push(acc);
        }
        upper.push(row);
    }

    Coupling { upper }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpnls_kernels::LocalBackend;
    use scirs2_core::ndarray_ext::array;

    fn factors() -> Vec<Array2<f64>> {
        vec![
            array![[1.0, 2.0], [0.0, 1.0]],
            array![[1.0, -1.0], [2.0, 0.5], [0.0, 1.0]],
            array![[0.5, 0.5], [1.0, 2.0]],
            array![[3.0, 0.0], [1.0, 1.0]],
        ]
    }

    #[test]
    fn test_gram_shapes_and_values() {
        let g = compute_gram(&LocalBackend, &factors());
        assert_eq!(g.len(), 4);
        assert_eq!(g[0], array![[1.0, 2.0], [2.0, 5.0]]);
        assert_eq!(g[1].shape(), &[2, 2]);
    }

    #[test]
    fn test_gamma_excludes_pair() {
        let backend = LocalBackend;
        let g = compute_gram(&backend, &factors());
        let gamma = compute_gamma(&backend, &g);
        assert_eq!(gamma.n_modes(), 4);

        let expected_01 = &g[2] * &g[3];
        assert_eq!(gamma.gamma(0, 1), &expected_01);
        assert_eq!(gamma.gamma(1, 0), &expected_01);

        let expected_22 = &(&g[0] * &g[1]) * &g[3];
        assert_eq!(gamma.gamma(2, 2), &expected_22);
    }

    #[test]
    fn test_gamma_single_mode_is_ones() {
        let backend = LocalBackend;
        let g = compute_gram(&backend, &[array![[1.0, 2.0], [3.0, 4.0]]]);
        let gamma = compute_gamma(&backend, &g);
        assert_eq!(gamma.gamma(0, 0), &Array2::<f64>::ones((2, 2)));
    }
}
