//! An observer that caps the number of model calls.

use dutytune_core::Observer;

use crate::traits::{CanStopEarly, HasEvaluationCount};

/// Stops a run once `limit` evaluations have been made.
///
/// The evaluation that reaches the limit is still reported to the solver;
/// the solver then returns its best point so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationBudget {
    limit: usize,
    exhausted: bool,
}

impl EvaluationBudget {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            exhausted: false,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns true once the budget has asked a solver to stop.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<E, A> Observer<E, A> for EvaluationBudget
where
    E: HasEvaluationCount,
    A: CanStopEarly,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        if event.evaluation_count() >= self.limit {
            self.exhausted = true;
            return Some(A::stop_early());
        }
        None
    }
}
