//! Solvers for constrained minimization of black-box models.
//!
//! An [`OptimizationProblem`] maps solver variables `x: &[f64]` to model
//! inputs, calls the model, and extracts a scalar objective plus a set of
//! inequality residuals (`residual >= 0` is satisfied). Solvers in this module
//! search for the `x` that minimizes the objective while keeping every
//! residual non-negative.
//!
//! # Solvers
//!
//! - [`sqp`]: sequential quadratic programming with native box bounds and
//!   nonlinear inequality constraints
//! - [`cobyla`]: derivative-free linear-approximation trust region with
//!   nonlinear inequality constraints and no native bounds
//! - [`lbfgsb`]: projected limited-memory quasi-Newton with native box
//!   bounds and no general constraints
//!
//! # Observers
//!
//! All three solvers share one [`Event`] type and one [`Action`] type, so a
//! single observer (a trajectory recorder, an evaluation budget, a failure
//! policy) works with any of them. Every model call produces exactly one
//! event, tagged with the [`Probe`] that requested it.
//!
//! [`OptimizationProblem`]: dutytune_core::OptimizationProblem

mod action;
mod config;
mod error;
mod evaluate;
mod evaluator;
mod event;
mod finite_diff;
mod qp;
mod solution;

pub mod cobyla;
pub mod lbfgsb;
pub mod sqp;

pub use action::Action;
pub use config::ConfigError;
pub use error::Error;
pub use evaluate::{EvalError, EvaluateResult, Evaluation, evaluate};
pub use event::{Event, Probe};
pub use solution::{Solution, Status};

/// Returns the largest constraint violation, or zero if every residual is
/// non-negative.
#[must_use]
pub fn max_violation(constraints: &[f64]) -> f64 {
    constraints.iter().fold(0.0, |worst: f64, &c| worst.max(-c))
}

/// Returns the sum of all constraint violations.
#[must_use]
pub fn total_violation(constraints: &[f64]) -> f64 {
    constraints.iter().map(|&c| (-c).max(0.0)).sum()
}
