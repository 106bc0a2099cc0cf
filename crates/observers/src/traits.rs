//! Capability traits for cross-solver observers.
//!
//! These traits abstract over solver event and action types, enabling
//! observers to be written once and reused.
//!
//! # Event traits
//!
//! - [`HasEvaluationCount`]: events numbered by evaluation
//!
//! # Action traits
//!
//! - [`CanStopEarly`]: actions that can signal early termination
//!
//! # Example
//!
//! ```rust
//! use dutytune_core::Observer;
//! use dutytune_observers::traits::{CanStopEarly, HasEvaluationCount};
//!
//! /// Stops on the first evaluation past a checkpoint.
//! struct StopAfter(usize);
//!
//! impl<E, A> Observer<E, A> for StopAfter
//! where
//!     E: HasEvaluationCount,
//!     A: CanStopEarly,
//! {
//!     fn observe(&mut self, event: &E) -> Option<A> {
//!         (event.evaluation_count() > self.0).then(A::stop_early)
//!     }
//! }
//! ```

use dutytune_core::{Model, OptimizationProblem};

use dutytune_solvers::optimization::{Action, Event};

/// An event numbered by evaluation.
pub trait HasEvaluationCount {
    /// Returns the 1-based index of the evaluation behind this event.
    fn evaluation_count(&self) -> usize;
}

/// An action type that can signal early termination.
pub trait CanStopEarly {
    /// Returns the action that stops the solver early.
    fn stop_early() -> Self;
}

impl<M, P> HasEvaluationCount for Event<'_, M, P>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    fn evaluation_count(&self) -> usize {
        self.count()
    }
}

impl CanStopEarly for Action {
    fn stop_early() -> Self {
        Self::StopEarly
    }
}
