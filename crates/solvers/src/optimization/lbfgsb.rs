//! Projected limited-memory BFGS for bound-constrained problems.
//!
//! # Algorithm
//!
//! Variables at a bound whose gradient points outward are held fixed; the
//! rest move along a two-loop L-BFGS direction. Trial points are projected
//! into the box and accepted by Armijo backtracking, so every evaluation
//! stays within bounds. Gradients come from one-sided finite differences.
//!
//! # Limitations
//!
//! - **Bounds only**: problems with inequality residuals are rejected with
//!   [`Error::UnsupportedConstraints`]; fold them into the objective first
//!
//! # Observer Events
//!
//! Every evaluation emits one [`Event`]: the start point
//! ([`Probe::Start`]), finite-difference perturbations
//! ([`Probe::Gradient`]), and line-search trials ([`Probe::LineSearch`]).
//!
//! [`Error::UnsupportedConstraints`]: super::Error::UnsupportedConstraints
//! [`Event`]: super::Event
//! [`Probe::Start`]: super::Probe::Start
//! [`Probe::Gradient`]: super::Probe::Gradient
//! [`Probe::LineSearch`]: super::Probe::LineSearch

mod config;
mod memory;


pub use config::Config;

use dutytune_core::{Bounds, Model, Observer, OptimizationProblem};
use nalgebra::DVector;

use super::{
    Action, Error, Event, Probe, Solution, Status,
    evaluator::{Evaluator, Outcome},
    finite_diff::forward_differences,
};

use memory::{Memory, masked};

const ARMIJO: f64 = 1e-4;

/// Minimizes the objective within `bounds`.
///
/// The start point is projected into `bounds` before the first evaluation.
///
/// # Errors
///
/// Returns an error if the problem declares inequality residuals, if `x0`
/// and `bounds` differ in length, if the first evaluation produces no usable
/// point, or if the model or problem fails and the observer does not return
/// [`Action::AssumeWorse`] to recover.
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
    let count = problem.constraint_count();
    if count > 0 {
        return Err(Error::UnsupportedConstraints { count });
    }
    if x0.len() != bounds.len() {
        return Err(Error::Dimension {
            expected: bounds.len(),
            actual: x0.len(),
        });
    }

    let n = x0.len();
    let mut evaluator = Evaluator::new(model, problem, observer, config.worse_value());

    let start = bounds.project(x0);
    let mut current = match evaluator.evaluate(&start, Probe::Start)? {
        Outcome::Point(point) => point
            .into_iterate()
            .ok_or(Error::InfeasibleEvaluation { x: start })?,
        Outcome::Stop(Some(iterate)) => return Ok(iterate.into_stopped(0, evaluator.count())),
        Outcome::Stop(None) => return Err(Error::InfeasibleEvaluation { x: start }),
    };

    let Some(derivatives) =
        forward_differences(&mut evaluator, &current, bounds, config.fd_step())?
    else {
        return Ok(current.into_stopped(0, evaluator.count()));
    };
    let mut gradient = derivatives.gradient;
    let mut memory = Memory::new(config.memory());

    for iter in 1..=config.max_iters() {
        if projected_gradient(&current.x, &gradient, bounds) <= config.pgtol() {
            let evals = evaluator.count();
            return Ok(current.into_solution(
                Status::Converged,
                "CONVERGENCE: NORM_OF_PROJECTED_GRADIENT_<=_PGTOL",
                iter - 1,
                evals,
            ));
        }

        let free: Vec<bool> = (0..n)
            .map(|i| {
                let at_lower = current.x[i] <= bounds.lower()[i] && gradient[i] > 0.0;
                let at_upper = current.x[i] >= bounds.upper()[i] && gradient[i] < 0.0;
                !(at_lower || at_upper)
            })
            .collect();

        let mut direction = memory.direction(&gradient, &free);
        if gradient.dot(&direction) >= 0.0 {
            memory.clear();
            direction = -masked(&gradient, &free);
        }

        let largest = direction.amax();
        let mut alpha = if memory.is_empty() && largest > 0.0 {
            (1.0 / largest).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..config.max_line_search() {
            let trial: Vec<f64> = current
                .x
                .iter()
                .zip(direction.iter())
                .map(|(xi, di)| xi + alpha * di)
                .collect();
            let trial = bounds.project(&trial);
            if trial == current.x {
                break;
            }

            let decrease: f64 = trial
                .iter()
                .zip(&current.x)
                .zip(gradient.iter())
                .map(|((t, x), g)| g * (t - x))
                .sum();

            match evaluator.evaluate(&trial, Probe::LineSearch)? {
                Outcome::Point(point) => {
                    if point.objective <= current.objective + ARMIJO * decrease.min(0.0)
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
            return Ok(current.into_solution(
                Status::LineSearchFailed,
                "ABNORMAL_TERMINATION_IN_LNSRCH",
                iter,
                evals,
            ));
        };

        let Some(derivatives) =
            forward_differences(&mut evaluator, &next, bounds, config.fd_step())?
        else {
            return Ok(next.into_stopped(iter, evaluator.count()));
        };

        let s = DVector::from_iterator(n, next.x.iter().zip(&current.x).map(|(a, b)| a - b));
        let y = &derivatives.gradient - &gradient;
        memory.push(s, y);

        let scale = current.objective.abs().max(next.objective.abs()).max(1.0);
        let reduction = (current.objective - next.objective) / scale;

        current = next;
        gradient = derivatives.gradient;

        if reduction <= config.ftol() {
            let evals = evaluator.count();
            return Ok(current.into_solution(
                Status::Converged,
                "CONVERGENCE: REL_REDUCTION_OF_F_<=_FACTR*EPSMCH",
                iter,
                evals,
            ));
        }
    }

    let evals = evaluator.count();
    Ok(current.into_solution(
        Status::MaxIters,
        "STOP: TOTAL NO. of ITERATIONS REACHED LIMIT",
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

/// Largest component of `P(x - g) - x`.
fn projected_gradient(x: &[f64], gradient: &DVector<f64>, bounds: &Bounds) -> f64 {
    x.iter()
        .zip(gradient.iter())
        .zip(bounds.lower().iter().zip(bounds.upper()))
        .map(|((&xi, &gi), (&lo, &hi))| ((xi - gi).clamp(lo, hi) - xi).abs())
        .fold(0.0, f64::max)
}
