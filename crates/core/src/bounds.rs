use thiserror::Error;

/// Per-variable box bounds `lower[i] <= x[i] <= upper[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// Errors that can occur when constructing [`Bounds`].
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum BoundsError {
    #[error("bound {index} is not a number")]
    NotANumber { index: usize },

    #[error("bound {index} is inverted or empty: lower {lower} must be below upper {upper}")]
    Inverted { index: usize, lower: f64, upper: f64 },
}

impl Bounds {
    /// Creates bounds from `(lower, upper)` pairs.
    ///
    /// Infinite values are allowed for one-sided bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is NaN or if `lower >= upper`.
    pub fn new(pairs: &[(f64, f64)]) -> Result<Self, BoundsError> {
        let mut lower = Vec::with_capacity(pairs.len());
        let mut upper = Vec::with_capacity(pairs.len());

        for (index, &(lo, hi)) in pairs.iter().enumerate() {
            if lo.is_nan() || hi.is_nan() {
                return Err(BoundsError::NotANumber { index });
            }
            if lo >= hi {
                return Err(BoundsError::Inverted {
                    index,
                    lower: lo,
                    upper: hi,
                });
            }
            lower.push(lo);
            upper.push(hi);
        }

        Ok(Self { lower, upper })
    }

    /// Creates bounds that do not restrict any of `n` variables.
    #[must_use]
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    /// Returns the number of bounded variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Returns true if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Returns true if every component of `x` lies within its bounds.
    #[must_use]
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(&v, (&lo, &hi))| lo <= v && v <= hi)
    }

    /// Returns true if every component of `x` lies strictly inside its bounds.
    #[must_use]
    pub fn contains_strictly(&self, x: &[f64]) -> bool {
        x.len() == self.len()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(&v, (&lo, &hi))| lo < v && v < hi)
    }

    /// Clamps `x` into the box.
    #[must_use]
    pub fn project(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .map(|(&v, (&lo, &hi))| v.clamp(lo, hi))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_pair() {
        let err = Bounds::new(&[(0.0, 1.0), (5.0, 2.0)]).unwrap_err();
        assert_eq!(
            err,
            BoundsError::Inverted {
                index: 1,
                lower: 5.0,
                upper: 2.0
            }
        );
    }

    #[test]
    fn rejects_degenerate_pair() {
        assert!(Bounds::new(&[(3.0, 3.0)]).is_err());
    }

    #[test]
    fn rejects_nan() {
        let err = Bounds::new(&[(f64::NAN, 1.0)]).unwrap_err();
        assert_eq!(err, BoundsError::NotANumber { index: 0 });
    }

    #[test]
    fn projects_into_box() {
        let bounds = Bounds::new(&[(4.5, 6.0), (7.0, 12.0), (1.0, 5.0)]).unwrap();
        let projected = bounds.project(&[3.0, 9.5, 8.0]);
        assert_eq!(projected, vec![4.5, 9.5, 5.0]);
        assert!(bounds.contains(&projected));
        assert!(!bounds.contains_strictly(&projected));
    }

    #[test]
    fn unbounded_contains_everything() {
        let bounds = Bounds::unbounded(2);
        assert!(bounds.contains_strictly(&[-1e300, 1e300]));
        assert!(!bounds.contains(&[0.0]));
    }
}
