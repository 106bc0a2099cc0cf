/// Defines a constrained minimization problem to be solved.
///
/// A problem maps solver variables to a model input, then computes an
/// objective value and a set of inequality residuals from the model input and
/// output. Solvers search for the input that minimizes the objective while
/// keeping every residual non-negative.
///
/// Residual convention: `residual >= 0` means the constraint is satisfied,
/// and a residual of exactly zero sits on the boundary (feasible).
///
/// Problems with no inequality constraints (for example a penalized
/// objective) keep the default [`constraints`] and [`constraint_count`].
///
/// [`constraints`]: OptimizationProblem::constraints
/// [`constraint_count`]: OptimizationProblem::constraint_count
pub trait OptimizationProblem {
    type Input;
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Maps solver variables (`x`) into a model input.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the input cannot be constructed from `x`.
    fn input(&self, x: &[f64]) -> Result<Self::Input, Self::Error>;

    /// Computes an objective value from model input/output.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the objective cannot be computed.
    fn objective(&self, input: &Self::Input, output: &Self::Output) -> Result<f64, Self::Error>;

    /// Computes the inequality residuals from model input/output.
    ///
    /// Must return exactly [`constraint_count`] values, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if a residual cannot be computed.
    ///
    /// [`constraint_count`]: OptimizationProblem::constraint_count
    fn constraints(
        &self,
        _input: &Self::Input,
        _output: &Self::Output,
    ) -> Result<Vec<f64>, Self::Error> {
        Ok(Vec::new())
    }

    /// Returns the number of inequality residuals this problem produces.
    fn constraint_count(&self) -> usize {
        0
    }
}
