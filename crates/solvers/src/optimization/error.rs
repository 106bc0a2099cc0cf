use std::error::Error as StdError;

use super::{ConfigError, EvalError};

/// Errors that can occur while running a solver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid solver config: {0}")]
    Config(#[from] ConfigError),

    #[error("initial point has {actual} variables but bounds have {expected}")]
    Dimension { expected: usize, actual: usize },

    #[error("problem declares {count} inequality constraints, which this solver cannot handle")]
    UnsupportedConstraints { count: usize },

    #[error("problem declared {expected} constraints but produced {actual}")]
    ConstraintCount { expected: usize, actual: usize },

    #[error("no usable evaluation at the initial point {x:?}")]
    InfeasibleEvaluation { x: Vec<f64> },

    #[error("non-finite objective or residual at {x:?}")]
    NonFinite { x: Vec<f64> },

    #[error("model error: {0}")]
    Model(Box<dyn StdError + Send + Sync>),

    #[error("problem error: {0}")]
    Problem(Box<dyn StdError + Send + Sync>),
}

impl<I, ME, PE> From<EvalError<I, ME, PE>> for Error
where
    ME: StdError + Send + Sync + 'static,
    PE: StdError + Send + Sync + 'static,
{
    fn from(err: EvalError<I, ME, PE>) -> Self {
        match err {
            EvalError::Model { error, .. } => Error::Model(Box::new(error)),
            EvalError::Problem(error) => Error::Problem(Box::new(error)),
        }
    }
}
