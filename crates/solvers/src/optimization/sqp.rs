//! Sequential quadratic programming for bounded, constrained problems.
//!
//! # Algorithm
//!
//! Each iteration estimates the objective gradient and the constraint
//! Jacobian by finite differences, then solves a quadratic subproblem
//!
//! ```text
//! min  ½ dᵀBd + ∇f·d
//! s.t. c + J d >= 0
//!      lower <= x + d <= upper
//! ```
//!
//! where `B` is a damped BFGS approximation of the Lagrangian Hessian. The
//! step is accepted by backtracking on the L1 merit `f + μ·Σmax(0, -cᵢ)`.
//! Every trial point is projected into the bounds, so the model is never
//! asked to evaluate outside them.
//!
//! # Termination
//!
//! - [`Status::Converged`] when the subproblem step falls below `tol`, or the
//!   objective change falls below `tol · max(1, |f|)`, at a point whose
//!   largest violation is below `tol`; also when the line search stalls at
//!   such a point with a step below `√tol`
//! - [`Status::LineSearchFailed`] when no trial step reduces the merit
//! - [`Status::MaxIters`] when the iteration limit is reached
//! - [`Status::StoppedByObserver`] when an observer returns
//!   [`Action::StopEarly`]
//!
//! # Observer Events
//!
//! Every evaluation emits one [`Event`]: the start point
//! ([`Probe::Start`]), one per variable for the finite differences
//! ([`Probe::Gradient`]), and line-search trials ([`Probe::LineSearch`]).
//!
//! [`Status::Converged`]: super::Status::Converged
//! [`Status::LineSearchFailed`]: super::Status::LineSearchFailed
//! [`Status::MaxIters`]: super::Status::MaxIters
//! [`Status::StoppedByObserver`]: super::Status::StoppedByObserver
//! [`Action::StopEarly`]: super::Action::StopEarly
//! [`Event`]: super::Event
//! [`Probe::Start`]: super::Probe::Start
//! [`Probe::Gradient`]: super::Probe::Gradient
//! [`Probe::LineSearch`]: super::Probe::LineSearch

mod bfgs;
mod config;

#[cfg(test)]
mod tests;

pub use config::Config;

use dutytune_core::{Bounds, Model, Observer, OptimizationProblem};
use nalgebra::{DMatrix, DVector};

use super::{
    Action, Error, Event, Probe, Solution, Status,
    evaluator::{Evaluator, Iterate, Outcome},
    finite_diff::forward_differences,
    max_violation, qp, total_violation,
};

const ARMIJO: f64 = 1e-4;

/// Data from the previous iteration needed for the BFGS update.
struct Previous {
    step: DVector<f64>,
    gradient: DVector<f64>,
    jacobian: DMatrix<f64>,
}

/// Minimizes the objective subject to the problem's residuals and `bounds`.
///
/// The start point is projected into `bounds` before the first evaluation.
///
/// # Errors
///
/// Returns an error if `x0` and `bounds` differ in length, if the first
/// evaluation produces no usable point, or if the model or problem fails
/// and the observer does not return [`Action::AssumeWorse`] to recover.
pub fn minimize<M, P, Obs>(
    model: &mut M,
    problem: &P,
    x0: &[f64],
    bounds: &Bounds,
    config: &Config,
    observer: Obs,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M, P>, Action>,
{
    if x0.len() != bounds.len() {
        return Err(Error::Dimension {
            expected: bounds.len(),
            actual: x0.len(),
        });
    }

    let n = x0.len();
    let m = problem.constraint_count();
    let tol = config.tol();
    let mut evaluator = Evaluator::new(model, problem, observer, config.worse_value());

    let start = bounds.project(x0);
    let mut current = match evaluator.evaluate(&start, Probe::Start)? {
        Outcome::Point(point) => point
            .into_iterate()
            .ok_or(Error::InfeasibleEvaluation { x: start })?,
        Outcome::Stop(Some(iterate)) => {
            return Ok(iterate.into_stopped(0, evaluator.count()));
        }
        Outcome::Stop(None) => return Err(Error::InfeasibleEvaluation { x: start }),
    };

    let mut hessian = DMatrix::<f64>::identity(n, n);
    let mut penalty = 0.0_f64;
    let mut multipliers = DVector::<f64>::zeros(m);
    let mut previous: Option<Previous> = None;

    for iter in 1..=config.max_iters() {
        let Some(derivatives) = forward_differences(&mut evaluator, &current, bounds, config.fd_step())?
        else {
            return Ok(current.into_stopped(iter - 1, evaluator.count()));
        };
        let gradient = derivatives.gradient;
        let jacobian = derivatives.jacobian;

        if let Some(prev) = previous.take() {
            let y = lagrangian_gradient(&gradient, &jacobian, &multipliers)
                - lagrangian_gradient(&prev.gradient, &prev.jacobian, &multipliers);
            bfgs::update(&mut hessian, &prev.step, &y);
        }

        let (rows, rhs) = linearize(&current, &jacobian, bounds);
        let subproblem = qp::solve(&hessian, &gradient, &rows, &rhs);
        let direction = subproblem.step;
        multipliers = subproblem.multipliers.rows(0, m).into_owned();

        let violation = max_violation(&current.constraints);
        if direction.amax() <= tol && violation <= tol {
            let evals = evaluator.count();
            return Ok(current.into_solution(
                Status::Converged,
                "Optimization terminated successfully",
                iter,
                evals,
            ));
        }

        penalty = penalty.max(1.5 * multipliers.amax());
        let merit = current.merit(penalty);
        let slope = (gradient.dot(&direction) - penalty * total_violation(&current.constraints)).min(0.0);

        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..config.max_line_search() {
            let trial: Vec<f64> = current
                .x
                .iter()
                .zip(direction.iter())
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            let trial = bounds.project(&trial);

            match evaluator.evaluate(&trial, Probe::LineSearch)? {
                Outcome::Point(point) => {
                    if point.merit(penalty) <= merit + ARMIJO * alpha * slope
                        && let Some(iterate) = point.into_iterate()
                    {
                        accepted = Some(iterate);
                        break;
                    }
                }
                Outcome::Stop(_) => return Ok(current.into_stopped(iter, evaluator.count())),
            }
            alpha *= 0.5;
        }

        let Some(next) = accepted else {
            let evals = evaluator.count();
            if violation <= tol && direction.amax() <= tol.sqrt() {
                return Ok(current.into_solution(
                    Status::Converged,
                    "Optimization terminated successfully",
                    iter,
                    evals,
                ));
            }
            return Ok(current.into_solution(
                Status::LineSearchFailed,
                "Positive directional derivative for linesearch",
                iter,
                evals,
            ));
        };

        let step = DVector::from_iterator(
            n,
            next.x.iter().zip(&current.x).map(|(new, old)| new - old),
        );
        let objective_change = (next.objective - current.objective).abs();
        previous = Some(Previous {
            step,
            gradient,
            jacobian,
        });
        current = next;

        if objective_change <= tol * current.objective.abs().max(1.0)
            && max_violation(&current.constraints) <= tol
        {
            let evals = evaluator.count();
            return Ok(current.into_solution(
                Status::Converged,
                "Optimization terminated successfully",
                iter,
                evals,
            ));
        }
    }

    let evals = evaluator.count();
    Ok(current.into_solution(
        Status::MaxIters,
        "Iteration limit reached",
        config.max_iters(),
        evals,
    ))
}

/// Minimizes the objective without observer support.
///
/// # Errors
///
/// See [`minimize`].
pub fn minimize_unobserved<M, P>(
    model: &mut M,
    problem: &P,
    x0: &[f64],
    bounds: &Bounds,
    config: &Config,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    minimize(model, problem, x0, bounds, config, ())
}

/// Gradient of `f - λᵀc`.
fn lagrangian_gradient(
    gradient: &DVector<f64>,
    jacobian: &DMatrix<f64>,
    multipliers: &DVector<f64>,
) -> DVector<f64> {
    gradient - jacobian.transpose() * multipliers
}

/// Builds the subproblem rows `A d >= b`: constraint linearizations first,
/// then one row per finite bound.
fn linearize<I, O>(
    current: &Iterate<I, O>,
    jacobian: &DMatrix<f64>,
    bounds: &Bounds,
) -> (DMatrix<f64>, DVector<f64>) {
    let n = current.x.len();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut rhs = Vec::new();

    for (j, &c) in current.constraints.iter().enumerate() {
        rows.push(jacobian.row(j).iter().copied().collect());
        rhs.push(-c);
    }

    for (i, &x) in current.x.iter().enumerate() {
        let lower = bounds.lower()[i];
        let upper = bounds.upper()[i];
        if lower.is_finite() {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            rows.push(row);
            rhs.push(lower - x);
        }
        if upper.is_finite() {
            let mut row = vec![0.0; n];
            row[i] = -1.0;
            rows.push(row);
            rhs.push(x - upper);
        }
    }

    let a = DMatrix::from_fn(rows.len(), n, |r, c| rows[r][c]);
    (a, DVector::from_vec(rhs))
}
