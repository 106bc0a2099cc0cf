use dutytune_core::{Model, OptimizationProblem};

use super::max_violation;

/// Why a solver requested an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Probe {
    /// The initial point.
    Start,

    /// A finite-difference perturbation used to estimate derivatives.
    Gradient,

    /// A trial point along a search direction.
    LineSearch,

    /// A trial point from a trust-region subproblem.
    TrustRegion,

    /// A vertex of an interpolation simplex.
    Simplex,
}

/// Events emitted by every solver in this module, one per evaluation.
///
/// `count` is the 1-based index of the evaluation within the run, so the
/// n-th model call always carries `count == n` whether it succeeded or not.
pub enum Event<'a, M, P>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    /// Successful evaluation.
    Evaluated {
        probe: Probe,
        count: usize,

        /// The evaluated point in solver units.
        x: &'a [f64],

        objective: f64,

        /// Inequality residuals; `>= 0` is satisfied.
        constraints: &'a [f64],

        /// The model input at this point.
        input: &'a M::Input,

        /// The model output at this point.
        output: &'a M::Output,
    },

    /// Model evaluation failed.
    ModelFailed {
        probe: Probe,
        count: usize,
        x: &'a [f64],

        /// The input the model was asked to evaluate.
        input: &'a M::Input,

        /// The model error.
        error: &'a M::Error,
    },

    /// Problem method failed (input construction, objective, or residuals).
    ProblemFailed {
        probe: Probe,
        count: usize,
        x: &'a [f64],

        /// The problem error.
        error: &'a P::Error,
    },
}

impl<M, P> Event<'_, M, P>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    /// Returns the point that was evaluated (or attempted).
    #[must_use]
    pub fn x(&self) -> &[f64] {
        match self {
            Self::Evaluated { x, .. } | Self::ModelFailed { x, .. } | Self::ProblemFailed { x, .. } => {
                x
            }
        }
    }

    #[must_use]
    pub fn probe(&self) -> Probe {
        match self {
            Self::Evaluated { probe, .. }
            | Self::ModelFailed { probe, .. }
            | Self::ProblemFailed { probe, .. } => *probe,
        }
    }

    /// Returns the 1-based evaluation index.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Evaluated { count, .. }
            | Self::ModelFailed { count, .. }
            | Self::ProblemFailed { count, .. } => *count,
        }
    }

    /// Returns the objective for successful evaluations.
    #[must_use]
    pub fn objective(&self) -> Option<f64> {
        match self {
            Self::Evaluated { objective, .. } => Some(*objective),
            _ => None,
        }
    }

    /// Returns the largest constraint violation for successful evaluations.
    #[must_use]
    pub fn max_violation(&self) -> Option<f64> {
        match self {
            Self::Evaluated { constraints, .. } => Some(max_violation(constraints)),
            _ => None,
        }
    }

    /// Returns true if the evaluation failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Evaluated { .. })
    }
}
