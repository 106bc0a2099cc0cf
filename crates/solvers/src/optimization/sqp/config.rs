use crate::optimization::config::{ConfigError, positive};

/// Configuration for the SQP solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    tol: f64,
    fd_step: f64,
    max_line_search: usize,
    worse_value: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 100,
            tol: 1e-6,
            fd_step: 1.490_116_119_384_765_6e-8,
            max_line_search: 20,
            worse_value: 1e12,
        }
    }
}

impl Config {
    /// Creates a config with the given iteration limit and tolerance.
    ///
    /// The tolerance applies to the step length, the objective change between
    /// iterates, and the largest tolerated constraint violation.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero or `tol` is not finite and
    /// positive.
    pub fn new(max_iters: usize, tol: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        Ok(Self {
            max_iters,
            tol: positive(tol, ConfigError::Tolerance)?,
            ..Self::default()
        })
    }

    /// Sets the relative finite-difference step.
    ///
    /// # Errors
    ///
    /// Returns an error if `fd_step` is not finite and positive.
    pub fn with_fd_step(self, fd_step: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            fd_step: positive(fd_step, ConfigError::FdStep)?,
            ..self
        })
    }

    /// Sets the objective substituted for points an observer marks worse.
    ///
    /// # Errors
    ///
    /// Returns an error if `worse_value` is not finite and positive.
    pub fn with_worse_value(self, worse_value: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            worse_value: positive(worse_value, ConfigError::WorseValue)?,
            ..self
        })
    }

    #[must_use]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    #[must_use]
    pub fn tol(&self) -> f64 {
        self.tol
    }

    /// Returns the finite-difference step relative to `max(1, |x|)`.
    #[must_use]
    pub fn fd_step(&self) -> f64 {
        self.fd_step
    }

    /// Returns the maximum number of step halvings per line search.
    #[must_use]
    pub fn max_line_search(&self) -> usize {
        self.max_line_search
    }

    #[must_use]
    pub fn worse_value(&self) -> f64 {
        self.worse_value
    }
}
