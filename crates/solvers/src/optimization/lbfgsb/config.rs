use crate::optimization::config::{ConfigError, positive};

/// Configuration for the L-BFGS-B solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    ftol: f64,
    pgtol: f64,
    memory: usize,
    fd_step: f64,
    max_line_search: usize,
    worse_value: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 15_000,
            ftol: 2.220_446_049_250_313e-9,
            pgtol: 1e-5,
            memory: 10,
            fd_step: 1e-8,
            max_line_search: 20,
            worse_value: 1e12,
        }
    }
}

impl Config {
    /// Creates a config with the given iteration limit and relative
    /// objective-reduction tolerance.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero or `ftol` is not finite and
    /// positive.
    pub fn new(max_iters: usize, ftol: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        Ok(Self {
            max_iters,
            ftol: positive(ftol, ConfigError::Tolerance)?,
            ..Self::default()
        })
    }

    /// Sets the projected-gradient tolerance.
    ///
    /// # Errors
    ///
    /// Returns an error if `pgtol` is not finite and positive.
    pub fn with_pgtol(self, pgtol: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            pgtol: positive(pgtol, ConfigError::Tolerance)?,
            ..self
        })
    }

    /// Sets the number of correction pairs kept.
    ///
    /// # Errors
    ///
    /// Returns an error if `memory` is zero.
    pub fn with_memory(self, memory: usize) -> Result<Self, ConfigError> {
        if memory == 0 {
            return Err(ConfigError::Memory);
        }
        Ok(Self { memory, ..self })
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

    /// Returns the tolerance on `(f_k - f_{k+1}) / max(|f_k|, |f_{k+1}|, 1)`.
    #[must_use]
    pub fn ftol(&self) -> f64 {
        self.ftol
    }

    /// Returns the tolerance on the largest projected-gradient component.
    #[must_use]
    pub fn pgtol(&self) -> f64 {
        self.pgtol
    }

    #[must_use]
    pub fn memory(&self) -> usize {
        self.memory
    }

    #[must_use]
    pub fn fd_step(&self) -> f64 {
        self.fd_step
    }

    #[must_use]
    pub fn max_line_search(&self) -> usize {
        self.max_line_search
    }

    #[must_use]
    pub fn worse_value(&self) -> f64 {
        self.worse_value
    }
}
