//! Turns simulator outputs into a cost and inequality residuals.
//!
//! The representation is chosen from the solver's [`Capabilities`]:
//! contaminant limits become explicit `limit - measured >= 0` residuals when
//! the solver accepts nonlinear constraints and a quadratic penalty on the
//! cost otherwise, and variable bounds become [`Constraint::BoxBound`]
//! residuals when the solver cannot enforce them natively.

use dutytune_core::OptimizationProblem;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    scale::ScaleFactors,
    simulation::{OperatingPoint, SimulationOutputs},
};

/// What a solver can enforce on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_native_bounds: bool,
    pub supports_nonlinear_constraints: bool,
}

/// Requested representation of the contaminant limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulationKind {
    /// Constrained when the solver allows it, penalized otherwise.
    #[default]
    Auto,
    Constrained,
    Penalized,
}

/// An upper limit on a contaminant, in ppm.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitSpec {
    /// Output name holding the contaminant's mole fraction.
    pub name: String,
    pub limit_ppm: f64,
}

impl LimitSpec {
    /// Returns `limit - measured`, or `None` if the output is missing.
    #[must_use]
    pub fn residual(&self, outputs: &SimulationOutputs) -> Option<f64> {
        outputs.ppm(&self.name).map(|measured| self.limit_ppm - measured)
    }
}

/// One entry of the constraint set.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `limit - measured_ppm >= 0`; one residual.
    Inequality(LimitSpec),

    /// `x - lower >= 0` and `upper - x >= 0` in scaled units; two residuals.
    BoxBound { index: usize, lower: f64, upper: f64 },
}

impl Constraint {
    #[must_use]
    pub fn residual_count(&self) -> usize {
        match self {
            Self::Inequality(_) => 1,
            Self::BoxBound { .. } => 2,
        }
    }
}

/// Base cost plus `weight * max(0, measured - limit)^2` per limit.
#[derive(Debug, Clone, PartialEq)]
pub struct PenalizedObjective {
    pub limits: Vec<LimitSpec>,
    pub weight: f64,
}

impl PenalizedObjective {
    /// Returns the total penalty for `outputs`.
    ///
    /// # Errors
    ///
    /// Returns an error if a limited output is missing.
    pub fn penalty(&self, outputs: &SimulationOutputs) -> Result<f64, FormulationError> {
        self.limits.iter().try_fold(0.0, |total, limit| {
            let residual = limit.residual(outputs).ok_or_else(|| missing(&limit.name))?;
            let excess = (-residual).max(0.0);
            Ok(total + self.weight * excess * excess)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Objective {
    Cost,
    Penalized(PenalizedObjective),
}

/// The objective and constraint set handed to a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Formulation {
    objective: Objective,
    constraints: Vec<Constraint>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulationError {
    #[error("output {name} is missing from the simulation results")]
    MissingOutput { name: String },

    #[error("the solver cannot handle inequality constraints; use the penalized formulation")]
    ConstraintsUnsupported,

    #[error("the solver supports neither native bounds nor constraints")]
    BoundsUnsupported,

    #[error("expected {expected} variables, got {actual}")]
    Dimension { expected: usize, actual: usize },
}

fn missing(name: &str) -> FormulationError {
    FormulationError::MissingOutput {
        name: name.to_owned(),
    }
}

impl Formulation {
    /// Chooses the representation for a solver.
    ///
    /// `scaled_bounds` are only used when the solver lacks native bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the requested kind needs constraint support the
    /// solver lacks.
    pub fn select(
        capabilities: Capabilities,
        kind: FormulationKind,
        limits: Vec<LimitSpec>,
        scaled_bounds: &[(f64, f64)],
        penalty_weight: f64,
    ) -> Result<Self, FormulationError> {
        let constrained = match kind {
            FormulationKind::Auto => capabilities.supports_nonlinear_constraints,
            FormulationKind::Constrained => true,
            FormulationKind::Penalized => false,
        };
        if constrained && !capabilities.supports_nonlinear_constraints {
            return Err(FormulationError::ConstraintsUnsupported);
        }
        if !capabilities.supports_native_bounds && !capabilities.supports_nonlinear_constraints {
            return Err(FormulationError::BoundsUnsupported);
        }

        let (objective, mut constraints) = if constrained {
            (
                Objective::Cost,
                limits.into_iter().map(Constraint::Inequality).collect(),
            )
        } else {
            (
                Objective::Penalized(PenalizedObjective {
                    limits,
                    weight: penalty_weight,
                }),
                Vec::new(),
            )
        };

        if !capabilities.supports_native_bounds {
            constraints.extend(
                scaled_bounds
                    .iter()
                    .enumerate()
                    .map(|(index, &(lower, upper))| Constraint::BoxBound {
                        index,
                        lower,
                        upper,
                    }),
            );
        }

        Ok(Self {
            objective,
            constraints,
        })
    }

    #[must_use]
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    #[must_use]
    pub fn is_penalized(&self) -> bool {
        matches!(self.objective, Objective::Penalized(_))
    }

    /// Total number of residuals.
    #[must_use]
    pub fn constraint_count(&self) -> usize {
        self.constraints.iter().map(Constraint::residual_count).sum()
    }

    /// The contaminant limits, whichever form carries them.
    pub fn limits(&self) -> impl Iterator<Item = &LimitSpec> {
        let penalized: &[LimitSpec] = match &self.objective {
            Objective::Penalized(objective) => objective.limits.as_slice(),
            Objective::Cost => &[],
        };
        let constrained = self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::Inequality(limit) => Some(limit),
            Constraint::BoxBound { .. } => None,
        });
        penalized.iter().chain(constrained)
    }

    /// Largest ppm excess over any limit, zero when all are met.
    ///
    /// # Errors
    ///
    /// Returns an error if a limited output is missing.
    pub fn limit_violation(&self, outputs: &SimulationOutputs) -> Result<f64, FormulationError> {
        self.limits().try_fold(0.0_f64, |worst, limit| {
            let residual = limit.residual(outputs).ok_or_else(|| missing(&limit.name))?;
            Ok(worst.max(-residual))
        })
    }

    /// One label per residual, in residual order.
    #[must_use]
    pub fn constraint_names(&self, variables: &[String]) -> Vec<String> {
        let mut names = Vec::with_capacity(self.constraint_count());
        for constraint in &self.constraints {
            match constraint {
                Constraint::Inequality(limit) => names.push(limit.name.clone()),
                Constraint::BoxBound { index, .. } => {
                    let var = variables.get(*index).map_or("?", String::as_str);
                    names.push(format!("{var}.lower"));
                    names.push(format!("{var}.upper"));
                }
            }
        }
        names
    }
}

/// Sums the cost-relevant engineering values.
#[must_use]
pub fn base_cost(engineering: &[f64], cost_mask: &[bool]) -> f64 {
    engineering
        .iter()
        .zip(cost_mask)
        .filter_map(|(&v, &counts)| counts.then_some(v))
        .sum()
}

/// Adapts a [`Formulation`] to the solver interface.
///
/// Solver variables are scaled; model inputs are engineering values.
#[derive(Debug, Clone)]
pub struct TuningProblem {
    scale: ScaleFactors,
    cost_mask: Vec<bool>,
    bounds: Vec<(f64, f64)>,
    clamp_to_bounds: bool,
    formulation: Formulation,
}

impl TuningProblem {
    /// Creates a problem over `formulation`.
    ///
    /// With `clamp_to_bounds`, rescaled values are clamped into the
    /// engineering `bounds` so rounding at a bound never leaves the box.
    #[must_use]
    pub fn new(
        scale: ScaleFactors,
        cost_mask: Vec<bool>,
        bounds: Vec<(f64, f64)>,
        clamp_to_bounds: bool,
        formulation: Formulation,
    ) -> Self {
        Self {
            scale,
            cost_mask,
            bounds,
            clamp_to_bounds,
            formulation,
        }
    }

    #[must_use]
    pub fn formulation(&self) -> &Formulation {
        &self.formulation
    }

    #[must_use]
    pub fn scale(&self) -> &ScaleFactors {
        &self.scale
    }

    /// Cost without any penalty.
    #[must_use]
    pub fn base_cost(&self, point: &OperatingPoint) -> f64 {
        base_cost(point.as_slice(), &self.cost_mask)
    }
}

impl OptimizationProblem for TuningProblem {
    type Input = OperatingPoint;
    type Output = SimulationOutputs;
    type Error = FormulationError;

    fn input(&self, x: &[f64]) -> Result<OperatingPoint, FormulationError> {
        if x.len() != self.scale.len() {
            return Err(FormulationError::Dimension {
                expected: self.scale.len(),
                actual: x.len(),
            });
        }
        let mut engineering = self.scale.to_engineering(x);
        if self.clamp_to_bounds {
            for (v, &(lower, upper)) in engineering.iter_mut().zip(&self.bounds) {
                *v = v.clamp(lower, upper);
            }
        }
        Ok(OperatingPoint(engineering))
    }

    fn objective(
        &self,
        input: &OperatingPoint,
        output: &SimulationOutputs,
    ) -> Result<f64, FormulationError> {
        let cost = self.base_cost(input);
        match &self.formulation.objective {
            Objective::Cost => Ok(cost),
            Objective::Penalized(penalized) => Ok(cost + penalized.penalty(output)?),
        }
    }

    fn constraints(
        &self,
        input: &OperatingPoint,
        output: &SimulationOutputs,
    ) -> Result<Vec<f64>, FormulationError> {
        let scaled = self.scale.to_scaled(input.as_slice());
        let mut residuals = Vec::with_capacity(self.constraint_count());
        for constraint in &self.formulation.constraints {
            match constraint {
                Constraint::Inequality(limit) => {
                    residuals.push(limit.residual(output).ok_or_else(|| missing(&limit.name))?);
                }
                Constraint::BoxBound {
                    index,
                    lower,
                    upper,
                } => {
                    let x = scaled[*index];
                    residuals.push(x - lower);
                    residuals.push(upper - x);
                }
            }
        }
        Ok(residuals)
    }

    fn constraint_count(&self) -> usize {
        self.formulation.constraint_count()
    }
}

#[cfg(test)]
mod tests;
