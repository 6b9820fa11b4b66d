//! Preconditioned conjugate gradients for the Gauss-Newton system
//!
//! Solves `H·x = −g` starting from `x₀ = 0`. The solver is a small state
//! machine (`Init → Iterating → Converged | MaxIterReached | Breakdown`) and
//! reports the iteration count it used through [`SolverInfo`]. Neither the
//! iteration cap nor a direction of non-positive curvature is an error: the
//! current iterate is returned.
//!
//! [`pcg`] works on factor-shaped lists with the implicit Hessian and the
//! block preconditioner. [`cg`] runs the same recurrence on flat vectors for
//! any [`LinearOperator`].

use crate::error::NlsResult;
use crate::hessian::GaussNewtonHessian;
use crate::operator::LinearOperator;
use crate::precond::BlockDiagPreconditioner;
use cpnls_kernels::{CpScalar, KernelError, TensorBackend};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1};
use std::fmt;

/// Solver state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcgStatus {
    Init,
    Iterating,
    Converged,
    MaxIterReached,
    /// A search direction had `pᵀHp ≤ 0`; the iterate before it is kept
    Breakdown,
}

impl PcgStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PcgStatus::Converged | PcgStatus::MaxIterReached | PcgStatus::Breakdown
        )
    }
}

/// Solver convergence information
#[derive(Debug, Clone, PartialEq)]
pub struct SolverInfo {
    /// Number of iterations performed
    pub iterations: usize,
    /// Final residual norm `‖−g − H·x‖`
    pub residual: f64,
    /// Absolute threshold the residual was tested against
    pub tolerance: f64,
    /// Final state
    pub status: PcgStatus,
}

impl SolverInfo {
    pub fn converged(&self) -> bool {
        self.status == PcgStatus::Converged
    }
}

impl fmt::Display for SolverInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PCG: {} in {} iterations, residual = {:.2e} (tol {:.2e})",
            match self.status {
                PcgStatus::Converged => "converged",
                PcgStatus::Breakdown => "stopped on non-positive curvature",
                _ => "did not converge",
            },
            self.iterations,
            self.residual,
            self.tolerance
        )
    }
}

/// `max(atol, cg_tol·‖g‖)`
pub fn pcg_tolerance<T: CpScalar>(atol: T, cg_tol: T, gradient_norm: T) -> T {
    atol.max(cg_tol * gradient_norm)
}

/// Solve `H·x = −g` on factor-shaped lists
///
/// `tol` is the absolute residual threshold (see [`pcg_tolerance`]). When
/// `preconditioner` is `None`, `z = r` and the recurrence is plain CG.
///
/// Without damping the Gauss-Newton matrix is only semidefinite, and close
/// to a minimum rounding can give a direction `pᵀHp ≤ 0`. The solve then
/// stops with [`PcgStatus::Breakdown`] and returns the iterate reached so far.
pub fn pcg<T, B>(
    hessian: &GaussNewtonHessian<'_, T, B>,
    backend: &B,
    gradient: &[Array2<T>],
    preconditioner: Option<&BlockDiagPreconditioner<T>>,
    tol: T,
    maxiter: usize,
) -> NlsResult<(Vec<Array2<T>>, SolverInfo)>
where
    T: CpScalar,
    B: TensorBackend<T> + ?Sized,
{
    let mut status = PcgStatus::Init;
    let mut x = backend.zeros_like(gradient);

    // r = −g − H·x₀ with x₀ = 0
    let mut r = backend.scalar_mul(-T::one(), gradient);
    let mut r_norm = backend.list_vecnorm(&r);
    let mut iterations = 0;

    let info = |iterations, r_norm: T, status| SolverInfo {
        iterations,
        residual: r_norm.to_f64_lossy(),
        tolerance: tol.to_f64_lossy(),
        status,
    };

    if r_norm < tol || r_norm == T::zero() {
        return Ok((x, info(0, r_norm, PcgStatus::Converged)));
    }
    if maxiter == 0 {
        return Ok((x, info(0, r_norm, PcgStatus::MaxIterReached)));
    }

    let precondition = |r: &[Array2<T>]| -> NlsResult<Vec<Array2<T>>> {
        match preconditioner {
            Some(p) => p.apply(backend, r),
            None => Ok(r.to_vec()),
        }
    };

    let mut z = precondition(&r)?;
    let mut p = z.clone();
    let mut rz = backend.mult_lists(&r, &z)?;

    while !status.is_terminal() {
        status = PcgStatus::Iterating;

        let hp = hessian.apply(&p)?;
        let curvature = backend.mult_lists(&p, &hp)?;
        if curvature <= T::zero() {
            status = PcgStatus::Breakdown;
            break;
        }
        let alpha = rz / curvature;

        backend.list_axpy(alpha, &p, &mut x)?;
        backend.list_axpy(-alpha, &hp, &mut r)?;
        iterations += 1;

        r_norm = backend.list_vecnorm(&r);
        if r_norm < tol {
            status = PcgStatus::Converged;
        } else if iterations >= maxiter {
            status = PcgStatus::MaxIterReached;
        } else {
            z = precondition(&r)?;
            let rz_new = backend.mult_lists(&r, &z)?;
            let beta = rz_new / rz;
            p = backend.scalar_mul(beta, &p);
            backend.list_axpy(T::one(), &z, &mut p)?;
            rz = rz_new;
        }
    }

    Ok((x, info(iterations, r_norm, status)))
}

/// Solve `A·x = b` for a symmetric positive definite operator on flat vectors
///
/// Same recurrence and stopping rule as [`pcg`]: `x₀ = 0`, stop once
/// `‖r‖ < tol`, after `maxiter` iterations, or on non-positive curvature.
pub fn cg<T, A, M>(
    a: &A,
    b: &ArrayView1<T>,
    preconditioner: Option<&M>,
    tol: T,
    maxiter: usize,
) -> NlsResult<(Array1<T>, SolverInfo)>
where
    T: CpScalar,
    A: LinearOperator<T> + ?Sized,
    M: LinearOperator<T> + ?Sized,
{
    if b.len() != a.dim() {
        return Err(KernelError::dimension_mismatch(
            "cg",
            vec![a.dim()],
            vec![b.len()],
            "Right-hand side length must match the operator dimension",
        )
        .into());
    }

    let info = |iterations, r_norm: T, status| SolverInfo {
        iterations,
        residual: r_norm.to_f64_lossy(),
        tolerance: tol.to_f64_lossy(),
        status,
    };

    let mut x = Array1::<T>::zeros(b.len());
    let mut r = b.to_owned();
    let mut r_norm = r.dot(&r).sqrt();
    if r_norm < tol || r_norm == T::zero() {
        return Ok((x, info(0, r_norm, PcgStatus::Converged)));
    }
    if maxiter == 0 {
        return Ok((x, info(0, r_norm, PcgStatus::MaxIterReached)));
    }

    let precondition = |r: &Array1<T>| -> NlsResult<Array1<T>> {
        match preconditioner {
            Some(m) => m.matvec(&r.view()),
            None => Ok(r.clone()),
        }
    };

    let mut z = precondition(&r)?;
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut iterations = 0;

    loop {
        let q = a.matvec(&p.view())?;
        let curvature = p.dot(&q);
        if curvature <= T::zero() {
            return Ok((x, info(iterations, r_norm, PcgStatus::Breakdown)));
        }
        let alpha = rz / curvature;

        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);
        iterations += 1;

        r_norm = r.dot(&r).sqrt();
        if r_norm < tol {
            return Ok((x, info(iterations, r_norm, PcgStatus::Converged)));
        }
        if iterations >= maxiter {
            return Ok((x, info(iterations, r_norm, PcgStatus::MaxIterReached)));
        }

        z = precondition(&r)?;
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + &(p * beta);
        rz = rz_new;
    }
}
