use std::path::Path;

/// Whether a simulator run reached a steady state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Converged,
    NotConverged,
}

/// The narrow synchronous interface of an external process simulator.
///
/// Node paths are simulator-internal hierarchical identifiers and are passed
/// through untouched.
pub trait Session {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Initializes the simulator from a saved case.
    ///
    /// # Errors
    ///
    /// Returns an error if the case cannot be loaded.
    fn load_case(&mut self, path: &Path) -> Result<(), Self::Error>;

    /// Writes a named input.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or the session is lost.
    fn set_input(&mut self, path: &str, value: f64) -> Result<(), Self::Error>;

    /// Runs one convergence pass with the current inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is lost. Non-convergence is not an
    /// error; it is reported as [`RunStatus::NotConverged`].
    fn run(&mut self) -> Result<RunStatus, Self::Error>;

    /// Reads a named output from the last run.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or the session is lost.
    fn get_output(&mut self, path: &str) -> Result<f64, Self::Error>;

    /// Quits the simulator.
    ///
    /// # Errors
    ///
    /// Returns an error if the simulator did not shut down cleanly.
    fn close(&mut self) -> Result<(), Self::Error>;
}
