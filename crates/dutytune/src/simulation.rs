//! Drives an external process simulator as a [`Model`].
//!
//! A [`Simulator`] owns one [`SessionGuard`] for the lifetime of a run and
//! routes every evaluation through it: write one named input per decision
//! variable, trigger exactly one convergence pass, read the configured
//! outputs. Nothing is cached.

mod guard;
mod session;
pub mod surrogate;
mod watchdog;

use std::collections::BTreeMap;

use dutytune_core::Model;
use serde::Serialize;
use thiserror::Error;

pub use guard::SessionGuard;
pub use session::{RunStatus, Session};
pub use surrogate::{SurrogateError, SurrogateSession};
pub use watchdog::{Watchdog, WatchdogError};

/// Errors reported by [`Simulator`] evaluations.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// The flowsheet did not reach a steady state for this input.
    ///
    /// Recoverable: the driver treats the point as maximally costly.
    #[error("simulation did not converge")]
    NotConverged,

    /// The session was lost, unreachable, or timed out.
    #[error("session failed during {operation}")]
    Session {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("operating point has {actual} values but {expected} inputs are configured")]
    Dimension { expected: usize, actual: usize },
}

impl SimulationError {
    fn session<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Session {
            operation,
            source: Box::new(err),
        }
    }

    /// Returns true if the error is a per-evaluation non-convergence.
    #[must_use]
    pub fn is_not_converged(&self) -> bool {
        matches!(self, Self::NotConverged)
    }
}

/// A simulator input bound to one decision variable.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,

    /// Simulator node path, opaque to the optimizer.
    pub path: String,

    /// Values below this are raised to it before submission.
    pub min_value: Option<f64>,
}

impl InputSpec {
    /// Returns the value actually written to the simulator.
    #[must_use]
    pub fn submitted(&self, value: f64) -> f64 {
        match self.min_value {
            Some(min) if value < min => min,
            _ => value,
        }
    }
}

/// A named simulator output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub name: String,
    pub path: String,
}

/// Decision variables in engineering units, one per configured input.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatingPoint(pub Vec<f64>);

impl OperatingPoint {
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Named values read back after one simulator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimulationOutputs(BTreeMap<String, f64>);

impl SimulationOutputs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Returns a mole fraction in parts per million.
    #[must_use]
    pub fn ppm(&self, name: &str) -> Option<f64> {
        self.get(name).map(|fraction| fraction * 1e6)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, &value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for SimulationOutputs {
    fn from_iter<T: IntoIterator<Item = (K, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// The simulation adapter: one session, fixed inputs and outputs.
pub struct Simulator<S: Session> {
    guard: SessionGuard<S>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputSpec>,
    reports: Vec<OutputSpec>,
    runs: usize,
}

impl<S: Session> Simulator<S> {
    /// Creates an adapter over an opened session.
    ///
    /// `reports` are read only by [`Simulator::verify`].
    pub fn new(
        guard: SessionGuard<S>,
        inputs: Vec<InputSpec>,
        outputs: Vec<OutputSpec>,
        reports: Vec<OutputSpec>,
    ) -> Self {
        Self {
            guard,
            inputs,
            outputs,
            reports,
            runs: 0,
        }
    }

    #[must_use]
    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    /// Number of convergence passes triggered so far.
    #[must_use]
    pub fn runs(&self) -> usize {
        self.runs
    }

    /// Evaluates `point` and also reads the report outputs.
    ///
    /// # Errors
    ///
    /// Same as [`Model::call`].
    pub fn verify(&mut self, point: &OperatingPoint) -> Result<SimulationOutputs, SimulationError> {
        let mut outputs = self.evaluate(point)?;
        let session = self.guard.session_mut();
        for spec in &self.reports {
            let value = session
                .get_output(&spec.path)
                .map_err(|err| SimulationError::session("get_output", err))?;
            outputs.insert(spec.name.clone(), value);
        }
        Ok(outputs)
    }

    /// Releases the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session fails to close.
    pub fn close(self) -> Result<(), S::Error> {
        self.guard.close()
    }

    fn evaluate(&mut self, point: &OperatingPoint) -> Result<SimulationOutputs, SimulationError> {
        if point.len() != self.inputs.len() {
            return Err(SimulationError::Dimension {
                expected: self.inputs.len(),
                actual: point.len(),
            });
        }

        let session = self.guard.session_mut();
        for (spec, &value) in self.inputs.iter().zip(point.as_slice()) {
            let submitted = spec.submitted(value);
            if submitted != value {
                tracing::debug!(
                    input = %spec.name,
                    requested = value,
                    submitted,
                    "clamped input before submission"
                );
            }
            session
                .set_input(&spec.path, submitted)
                .map_err(|err| SimulationError::session("set_input", err))?;
        }

        self.runs += 1;
        let status = session.run().map_err(|err| SimulationError::session("run", err))?;
        if status == RunStatus::NotConverged {
            return Err(SimulationError::NotConverged);
        }

        let mut outputs = SimulationOutputs::new();
        for spec in &self.outputs {
            let value = session
                .get_output(&spec.path)
                .map_err(|err| SimulationError::session("get_output", err))?;
            outputs.insert(spec.name.clone(), value);
        }
        Ok(outputs)
    }
}

impl<S: Session> Model for Simulator<S> {
    type Input = OperatingPoint;
    type Output = SimulationOutputs;
    type Error = SimulationError;

    fn call(&mut self, input: &OperatingPoint) -> Result<SimulationOutputs, SimulationError> {
        self.evaluate(input)
    }
}
