use dutytune_core::Snapshot;

use super::max_violation;

/// Why a solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Converged according to the configured tolerances.
    Converged,

    /// Reached the iteration limit without converging.
    MaxIters,

    /// The line search could not find an acceptable step.
    LineSearchFailed,

    /// Stopped early due to an observer decision.
    StoppedByObserver,
}

/// The result of a constrained minimization.
#[derive(Debug, Clone)]
pub struct Solution<I, O> {
    /// Final solver status.
    pub status: Status,

    /// Human-readable termination message.
    pub message: String,

    /// Best point found, in solver units.
    pub x: Vec<f64>,

    /// Objective value at `x`.
    pub objective: f64,

    /// Residuals at `x`.
    pub constraints: Vec<f64>,

    /// Snapshot at `x`.
    pub snapshot: Snapshot<I, O>,

    /// Iteration count when the solver finished.
    pub iters: usize,

    /// Number of evaluations requested, including failed ones.
    pub evals: usize,
}

impl<I, O> Solution<I, O> {
    /// Returns the largest constraint violation at `x`.
    #[must_use]
    pub fn max_violation(&self) -> f64 {
        max_violation(&self.constraints)
    }

    /// Returns true if the solver converged.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Converged
    }
}
