use thiserror::Error;

/// Errors that can occur when validating a solver config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iters must be at least 1")]
    MaxIters,

    #[error("tolerance must be finite and positive")]
    Tolerance,

    #[error("finite-difference step must be finite and positive")]
    FdStep,

    #[error("worse_value must be finite and positive")]
    WorseValue,

    #[error("rho_begin must be finite and greater than rho_end")]
    RhoBegin,

    #[error("memory must be at least 1")]
    Memory,
}

pub(crate) fn positive(value: f64, err: ConfigError) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(err)
    }
}
