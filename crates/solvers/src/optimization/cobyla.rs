//! Constrained optimization by linear approximation (COBYLA-style).
//!
//! # Algorithm
//!
//! The solver keeps `n + 1` points: the best vertex and `n` others. Linear
//! models of the objective and every residual are interpolated through them,
//! and each iteration takes the step that minimizes the linear objective
//! subject to the linearized residuals, within a trust radius `rho`.
//!
//! A step that improves the L1 merit replaces the worst vertex. When the step
//! is short or fails to improve, `rho` is halved and the simplex is rebuilt
//! around the best vertex. The run converges once `rho` would fall below
//! `rho_end`.
//!
//! # Limitations
//!
//! - **No native bounds**: express box bounds as residuals
//! - **Derivative-free**: slower than gradient methods on smooth problems
//!
//! # Observer Events
//!
//! Every evaluation emits one [`Event`]: the start point
//! ([`Probe::Start`]), simplex vertices ([`Probe::Simplex`]), and
//! trust-region trials ([`Probe::TrustRegion`]).
//!
//! [`Event`]: super::Event
//! [`Probe::Start`]: super::Probe::Start
//! [`Probe::Simplex`]: super::Probe::Simplex
//! [`Probe::TrustRegion`]: super::Probe::TrustRegion

mod config;
mod simplex;

#[cfg(test)]
mod tests;

pub use config::Config;

use dutytune_core::{Model, Observer, OptimizationProblem};
use nalgebra::{DMatrix, DVector};

use super::{
    Action, Error, Event, Probe, Solution, Status,
    evaluator::{Evaluator, Outcome},
    qp,
};

use simplex::Simplex;

/// Subproblem steps shorter than this fraction of `rho` shrink the radius.
const SHORT_STEP: f64 = 0.5;

/// Halvings of the proximal weight tried before a step counts as short.
const MAX_RELAXATIONS: usize = 40;

/// Minimizes the objective subject to the problem's residuals.
///
/// # Errors
///
/// Returns an error if the first evaluation produces no usable point, or if
/// the model or problem fails and the observer does not return
/// [`Action::AssumeWorse`] to recover.
pub fn minimize<M, P, Obs>(
    model: &mut M,
    problem: &P,
    x0: &[f64],
    config: &Config,
    observer: Obs,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M, P>, Action>,
{
    let n = x0.len();
    let mut evaluator = Evaluator::new(model, problem, observer, config.worse_value());

    let first = match evaluator.evaluate(x0, Probe::Start)? {
        Outcome::Point(point) => point
            .into_iterate()
            .ok_or_else(|| Error::InfeasibleEvaluation { x: x0.to_vec() })?,
        Outcome::Stop(Some(iterate)) => return Ok(iterate.into_stopped(0, evaluator.count())),
        Outcome::Stop(None) => return Err(Error::InfeasibleEvaluation { x: x0.to_vec() }),
    };

    let mut rho = config.rho_begin();
    let mut penalty = 0.0_f64;
    let mut simplex = Simplex::new(first);
    if !rebuild(&mut evaluator, &mut simplex, rho)? {
        return Ok(simplex.into_best().into_stopped(0, evaluator.count()));
    }

    for iter in 1..=config.max_iters() {
        simplex.promote(penalty);

        let Some(linear) = simplex.linear_model(rho) else {
            if !rebuild(&mut evaluator, &mut simplex, rho)? {
                return Ok(simplex.into_best().into_stopped(iter, evaluator.count()));
            }
            continue;
        };

        let rhs = -DVector::from_column_slice(&simplex.best.constraints);
        let mut sigma = linear.gradient.norm().max(f64::EPSILON) / rho;
        let mut subproblem = qp::solve(
            &(DMatrix::identity(n, n) * sigma),
            &linear.gradient,
            &linear.jacobian,
            &rhs,
        );
        for _ in 0..MAX_RELAXATIONS {
            if subproblem.step.norm() >= SHORT_STEP * rho {
                break;
            }
            sigma *= 0.5;
            subproblem = qp::solve(
                &(DMatrix::identity(n, n) * sigma),
                &linear.gradient,
                &linear.jacobian,
                &rhs,
            );
        }

        penalty = penalty.max(2.0 * subproblem.multipliers.amax());
        let mut step = subproblem.step;
        let length = step.norm();
        if length > rho {
            step *= rho / length;
        }

        let mut improved = false;
        if length >= SHORT_STEP * rho {
            let trial: Vec<f64> = simplex
                .best
                .x
                .iter()
                .zip(step.iter())
                .map(|(xi, di)| xi + di)
                .collect();

            match evaluator.evaluate(&trial, Probe::TrustRegion)? {
                Outcome::Point(point) => {
                    if point.merit(penalty) < simplex.best.merit(penalty)
                        && let Some(iterate) = point.into_iterate()
                    {
                        simplex.accept(iterate, penalty);
                        improved = true;
                    }
                }
                Outcome::Stop(_) => {
                    return Ok(simplex.into_best().into_stopped(iter, evaluator.count()));
                }
            }
        }

        if improved {
            continue;
        }

        if rho <= config.rho_end() {
            let evals = evaluator.count();
            return Ok(simplex.into_best().into_solution(
                Status::Converged,
                "Optimization terminated successfully",
                iter,
                evals,
            ));
        }

        rho = (rho * 0.5).max(config.rho_end());
        if !rebuild(&mut evaluator, &mut simplex, rho)? {
            return Ok(simplex.into_best().into_stopped(iter, evaluator.count()));
        }
    }

    let evals = evaluator.count();
    Ok(simplex.into_best().into_solution(
        Status::MaxIters,
        "Maximum number of iterations has been exceeded",
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
    config: &Config,
) -> Result<Solution<M::Input, M::Output>, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    minimize(model, problem, x0, config, ())
}

/// Replaces every non-best vertex with `best + rho·eⱼ`.
///
/// Returns `Ok(false)` if the observer stopped the run.
fn rebuild<M, P, Obs>(
    evaluator: &mut Evaluator<'_, M, P, Obs>,
    simplex: &mut Simplex<M::Input, M::Output>,
    rho: f64,
) -> Result<bool, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
    Obs: for<'a> Observer<Event<'a, M, P>, Action>,
{
    simplex.others.clear();
    for j in 0..simplex.best.x.len() {
        let mut x = simplex.best.x.clone();
        x[j] += rho;
        match evaluator.evaluate(&x, Probe::Simplex)? {
            Outcome::Point(point) => simplex.others.push(point),
            Outcome::Stop(_) => return Ok(false),
        }
    }
    Ok(true)
}
