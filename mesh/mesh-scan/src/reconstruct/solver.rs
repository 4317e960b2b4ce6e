//! Conjugate gradient solve of the discrete Poisson equation.
//!
//! The system is the 7-point Laplacian on the interior nodes of a
//! [`CubeGrid`], scaled by `h²`, with the boundary held at zero:
//!
//! ```text
//! 6·χ[i] − Σ χ[neighbors of i] = b[i]
//! ```
//!
//! The operator is symmetric positive definite on the interior, so plain CG
//! converges. Matrix-vector products run in parallel; dot products are
//! accumulated sequentially so repeated solves give identical results.

use rayon::prelude::*;

use super::grid::CubeGrid;
use crate::error::{ScanError, ScanResult};

/// Stopping criteria for the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Maximum number of CG iterations per solve.
    pub max_iterations: usize,
    /// Stop when `‖r‖ / ‖b‖` falls below this.
    pub tolerance: f64,
}

/// Outcome of one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    /// Iterations performed.
    pub iterations: usize,
    /// Final relative residual `‖r‖ / ‖b‖`.
    pub relative_residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// Solve `A x = b` on the interior of `grid` in place, starting from the
/// contents of `x`.
///
/// Boundary entries of `b` and `x` must be zero and stay zero.
///
/// # Errors
///
/// Returns [`ScanError::ReconstructionFailed`] if the iteration produces
/// non-finite values.
pub fn solve(grid: &CubeGrid, b: &[f64], x: &mut [f64], config: &SolverConfig) -> ScanResult<SolveStats> {
    conjugate_gradient(|v, out| apply_laplacian(grid, v, out), b, x, config, grid.depth())
}

/// Conjugate gradient for a symmetric positive definite operator `apply`.
///
/// `depth` only labels the error.
///
/// # Errors
///
/// Returns [`ScanError::ReconstructionFailed`] if the iteration produces
/// non-finite values.
pub fn conjugate_gradient<F>(
    apply: F,
    b: &[f64],
    x: &mut [f64],
    config: &SolverConfig,
    depth: u32,
) -> ScanResult<SolveStats>
where
    F: Fn(&[f64], &mut [f64]),
{
    let b_norm = dot(b, b).sqrt();
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(SolveStats {
            iterations: 0,
            relative_residual: 0.0,
            converged: true,
        });
    }

    let mut ap = vec![0.0; x.len()];
    apply(x, &mut ap);
    let mut r: Vec<f64> = b.iter().zip(&ap).map(|(bi, ai)| bi - ai).collect();
    let mut p = r.clone();
    let mut rs_old = dot(&r, &r);

    let mut iterations = 0;
    while iterations < config.max_iterations {
        if rs_old.sqrt() <= config.tolerance * b_norm {
            break;
        }

        apply(&p, &mut ap);
        let p_ap = dot(&p, &ap);
        if !(p_ap.is_finite() && p_ap > 0.0) {
            break;
        }
        let alpha = rs_old / p_ap;

        x.par_iter_mut()
            .zip(p.par_iter())
            .for_each(|(xi, pi)| *xi = alpha.mul_add(*pi, *xi));
        r.par_iter_mut()
            .zip(ap.par_iter())
            .for_each(|(ri, ai)| *ri = (-alpha).mul_add(*ai, *ri));

        let rs_new = dot(&r, &r);
        let beta = rs_new / rs_old;
        p.par_iter_mut()
            .zip(r.par_iter())
            .for_each(|(pi, ri)| *pi = beta.mul_add(*pi, *ri));

        rs_old = rs_new;
        iterations += 1;
    }

    let relative_residual = rs_old.sqrt() / b_norm;
    if !relative_residual.is_finite() {
        return Err(ScanError::ReconstructionFailed {
            reason: format!("solver diverged at depth {depth}"),
        });
    }

    Ok(SolveStats {
        iterations,
        relative_residual,
        converged: relative_residual <= config.tolerance,
    })
}

/// `out = A x`, zero on the boundary.
pub fn apply_laplacian(grid: &CubeGrid, x: &[f64], out: &mut [f64]) {
    let n = grid.nodes_per_axis();
    let plane = n * n;

    out.par_chunks_mut(plane).enumerate().for_each(|(k, slice)| {
        for j in 0..n {
            for i in 0..n {
                let local = i + n * j;
                if grid.is_boundary(i, j, k) {
                    slice[local] = 0.0;
                    continue;
                }
                let idx = local + plane * k;
                let neighbors =
                    x[idx - 1] + x[idx + 1] + x[idx - n] + x[idx + n] + x[idx - plane] + x[idx + plane];
                slice[local] = 6.0f64.mul_add(x[idx], -neighbors);
            }
        }
    });
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
