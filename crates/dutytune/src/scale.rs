//! Bidirectional mapping between engineering units and the scaled search
//! space.
//!
//! Raw duties sit around 1e5–1e6 while a split fraction lives in 0–1. Solvers
//! step far more reliably when every variable is O(1)–O(10), so each variable
//! carries a fixed factor with `engineering = scaled * factor`.

use thiserror::Error;

/// Errors that can occur when constructing [`ScaleFactors`].
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ScaleError {
    #[error("scale factor {index} is {value}; factors must be finite and positive")]
    Invalid { index: usize, value: f64 },

    #[error("at least one scale factor is required")]
    Empty,
}

/// One positive factor per decision variable, fixed for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleFactors(Vec<f64>);

impl ScaleFactors {
    /// Validates and wraps `factors`.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is empty or any factor is zero, negative,
    /// or not finite.
    pub fn new(factors: Vec<f64>) -> Result<Self, ScaleError> {
        if factors.is_empty() {
            return Err(ScaleError::Empty);
        }
        if let Some((index, &value)) = factors
            .iter()
            .enumerate()
            .find(|(_, f)| !f.is_finite() || **f <= 0.0)
        {
            return Err(ScaleError::Invalid { index, value });
        }
        Ok(Self(factors))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn factors(&self) -> &[f64] {
        &self.0
    }

    /// Element-wise `scaled * factor`.
    #[must_use]
    pub fn to_engineering(&self, scaled: &[f64]) -> Vec<f64> {
        debug_assert_eq!(scaled.len(), self.len());
        scaled.iter().zip(&self.0).map(|(x, f)| x * f).collect()
    }

    /// Element-wise `engineering / factor`.
    #[must_use]
    pub fn to_scaled(&self, engineering: &[f64]) -> Vec<f64> {
        debug_assert_eq!(engineering.len(), self.len());
        engineering.iter().zip(&self.0).map(|(v, f)| v / f).collect()
    }

    /// Scales `(lower, upper)` engineering pairs.
    #[must_use]
    pub fn to_scaled_bounds(&self, bounds: &[(f64, f64)]) -> Vec<(f64, f64)> {
        bounds
            .iter()
            .zip(&self.0)
            .map(|(&(lower, upper), f)| (lower / f, upper / f))
            .collect()
    }
}
