/// Actions an observer can take after any evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Stop the solver early and return the best solution found so far.
    StopEarly,

    /// Treat this point as strictly worse than anything seen.
    ///
    /// The solver substitutes a large finite objective and large negative
    /// residuals (see each solver's `worse_value` setting) and carries on.
    /// The point is never reported as the solution.
    ///
    /// Use this for:
    /// - Recovering from model failures, such as a simulation that did not
    ///   converge, without aborting the run.
    /// - Steering the search away from a region even when evaluation succeeded.
    AssumeWorse,
}
