use crate::optimization::config::{ConfigError, positive};

/// Configuration for the COBYLA solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    max_iters: usize,
    rho_begin: f64,
    rho_end: f64,
    worse_value: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            rho_begin: 1.0,
            rho_end: 1e-4,
            worse_value: 1e12,
        }
    }
}

impl Config {
    /// Creates a config with the given iteration limit and trust radii.
    ///
    /// `rho_begin` is the initial simplex edge and trust radius; the solver
    /// converges once the radius would shrink below `rho_end`.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_iters` is zero, if `rho_end` is not finite and
    /// positive, or if `rho_begin` is not finite and larger than `rho_end`.
    pub fn new(max_iters: usize, rho_begin: f64, rho_end: f64) -> Result<Self, ConfigError> {
        if max_iters == 0 {
            return Err(ConfigError::MaxIters);
        }
        let rho_end = positive(rho_end, ConfigError::Tolerance)?;
        if !rho_begin.is_finite() || rho_begin <= rho_end {
            return Err(ConfigError::RhoBegin);
        }

        Ok(Self {
            max_iters,
            rho_begin,
            rho_end,
            ..Self::default()
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
    pub fn rho_begin(&self) -> f64 {
        self.rho_begin
    }

    #[must_use]
    pub fn rho_end(&self) -> f64 {
        self.rho_end
    }

    #[must_use]
    pub fn worse_value(&self) -> f64 {
        self.worse_value
    }
}
