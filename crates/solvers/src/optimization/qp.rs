//! Convex quadratic subproblems with linear inequality rows.

use nalgebra::{DMatrix, DVector};

const MAX_SWEEPS: usize = 5000;
const SWEEP_TOL: f64 = 1e-14;

/// Solution of a quadratic subproblem.
pub(crate) struct QpSolution {
    pub(crate) step: DVector<f64>,

    /// One non-negative multiplier per row.
    pub(crate) multipliers: DVector<f64>,
}

/// Solves `min ½ dᵀBd + gᵀd` subject to `A d >= b`.
///
/// The dual `max_{λ>=0}` is solved by projected Gauss-Seidel, after which
/// `d = B⁻¹(Aᵀλ - g)`. If `B` is not positive definite the identity is used
/// in its place.
///
/// Rows that cannot all be satisfied leave the multipliers growing until the
/// sweep limit; callers clip or line-search the resulting step.
pub(crate) fn solve(
    hessian: &DMatrix<f64>,
    gradient: &DVector<f64>,
    rows: &DMatrix<f64>,
    rhs: &DVector<f64>,
) -> QpSolution {
    let n = gradient.len();
    let chol = hessian
        .clone()
        .cholesky()
        .or_else(|| DMatrix::<f64>::identity(n, n).cholesky());

    let Some(chol) = chol else {
        return QpSolution {
            step: -gradient,
            multipliers: DVector::zeros(rows.nrows()),
        };
    };

    let b_inv_g = chol.solve(gradient);
    if rows.nrows() == 0 {
        return QpSolution {
            step: -b_inv_g,
            multipliers: DVector::zeros(0),
        };
    }

    let b_inv_at = chol.solve(&rows.transpose());
    let q = rows * &b_inv_at;
    let r = rows * &b_inv_g + rhs;
    let lambda = gauss_seidel(&q, &r);

    QpSolution {
        step: &b_inv_at * &lambda - b_inv_g,
        multipliers: lambda,
    }
}

/// Projected Gauss-Seidel for `min ½ λᵀQλ - rᵀλ` over `λ >= 0`.
fn gauss_seidel(q: &DMatrix<f64>, r: &DVector<f64>) -> DVector<f64> {
    let m = r.len();
    let mut lambda = DVector::<f64>::zeros(m);

    for _ in 0..MAX_SWEEPS {
        let mut largest_change: f64 = 0.0;

        for i in 0..m {
            let qii = q[(i, i)];
            if qii <= f64::EPSILON {
                continue;
            }
            let residual = (0..m).map(|j| q[(i, j)] * lambda[j]).sum::<f64>() - r[i];
            let updated = (lambda[i] - residual / qii).max(0.0);
            largest_change = largest_change.max((updated - lambda[i]).abs());
            lambda[i] = updated;
        }

        if largest_change <= SWEEP_TOL * (1.0 + lambda.amax()) {
            break;
        }
    }

    lambda
}
