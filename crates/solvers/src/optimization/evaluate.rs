use dutytune_core::{Model, OptimizationProblem, Snapshot};

use super::max_violation;

/// The result of evaluating an optimization problem at a given `x`.
#[derive(Debug, Clone)]
pub struct Evaluation<I, O> {
    pub x: Vec<f64>,

    pub objective: f64,

    /// Inequality residuals; `>= 0` is satisfied.
    pub constraints: Vec<f64>,

    pub snapshot: Snapshot<I, O>,
}

impl<I, O> Evaluation<I, O> {
    /// Returns the largest constraint violation at this point.
    #[must_use]
    pub fn max_violation(&self) -> f64 {
        max_violation(&self.constraints)
    }

    /// Returns true if the objective and every residual are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.objective.is_finite() && self.constraints.iter().all(|c| c.is_finite())
    }
}

/// Errors that can occur when evaluating an optimization problem.
///
/// A model failure keeps the input that was submitted, so observers can
/// report exactly what the model was asked to do.
#[derive(Debug)]
pub enum EvalError<I, ME, PE> {
    /// The model call failed.
    Model { input: I, error: ME },

    /// Failed to construct input or compute the objective or residuals.
    Problem(PE),
}

/// Type alias for the result of [`evaluate`].
pub type EvaluateResult<M, P> = Result<
    Evaluation<<M as Model>::Input, <M as Model>::Output>,
    EvalError<<M as Model>::Input, <M as Model>::Error, <P as OptimizationProblem>::Error>,
>;

/// Evaluates the model in the context of an optimization problem.
///
/// This function maps `x` to model input, calls the model, then computes
/// the objective and residuals from the input and output.
///
/// # Errors
///
/// Returns an error if input mapping, the model call, or the objective or
/// residual computation fails.
pub fn evaluate<M, P>(model: &mut M, problem: &P, x: &[f64]) -> EvaluateResult<M, P>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
{
    let input = problem.input(x).map_err(EvalError::Problem)?;
    let output = match model.call(&input) {
        Ok(output) => output,
        Err(error) => return Err(EvalError::Model { input, error }),
    };
    let objective = problem
        .objective(&input, &output)
        .map_err(EvalError::Problem)?;
    let constraints = problem
        .constraints(&input, &output)
        .map_err(EvalError::Problem)?;

    Ok(Evaluation {
        x: x.to_vec(),
        objective,
        constraints,
        snapshot: Snapshot::new(input, output),
    })
}
