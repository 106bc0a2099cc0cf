//! Records every evaluation and persists the trajectory as JSON Lines.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use dutytune_core::{Model, Observer, OptimizationProblem};
use dutytune_solvers::optimization::{Action, Event, Probe};
use serde::Serialize;
use thiserror::Error;

use crate::{
    driver::Algorithm,
    scale::ScaleFactors,
    simulation::{OperatingPoint, SimulationOutputs},
};

/// One evaluation, in engineering units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// 1-based; the verification entry continues the numbering.
    pub evaluation: usize,

    pub probe: &'static str,

    pub variables: Vec<f64>,

    /// Absent when the evaluation failed.
    pub cost: Option<f64>,

    pub residuals: Vec<f64>,

    pub outputs: SimulationOutputs,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Trailing record of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub algorithm: Algorithm,
    pub formulation: &'static str,
    pub variable_names: Vec<String>,
    pub constraint_names: Vec<String>,

    /// Optimal values in engineering units; empty if the run aborted.
    pub optimal: Vec<f64>,
    pub min_cost: Option<f64>,
    pub evaluations: usize,
    pub iterations: usize,
    pub success: bool,
    pub message: String,
    pub max_violation: Option<f64>,

    /// Outputs read at the optimum, including report values.
    pub verification: Option<SimulationOutputs>,
}

/// A finished, immutable trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryLog {
    entries: Vec<Entry>,
    summary: Summary,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to write trajectory log {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize trajectory record")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record<'a> {
    Evaluation(&'a Entry),
    Summary(&'a Summary),
}

impl TrajectoryLog {
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Writes one JSON object per line: every entry, then the summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_to(&self, path: &Path) -> Result<(), LogError> {
        let io = |source| LogError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = BufWriter::new(File::create(path).map_err(io)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, &Record::Evaluation(entry))?;
            writeln!(writer).map_err(io)?;
        }
        serde_json::to_writer(&mut writer, &Record::Summary(&self.summary))?;
        writeln!(writer).map_err(io)?;
        writer.flush().map_err(io)
    }
}

/// Observes solver events and keeps one [`Entry`] per evaluation.
///
/// Each evaluation is also logged as it happens.
#[derive(Debug, Clone)]
pub struct TrajectoryRecorder {
    variable_names: Vec<String>,
    limit_names: Vec<String>,
    scale: ScaleFactors,
    entries: Vec<Entry>,
}

impl TrajectoryRecorder {
    /// `limit_names` are the outputs reported in ppm on each progress line.
    #[must_use]
    pub fn new(variable_names: Vec<String>, limit_names: Vec<String>, scale: ScaleFactors) -> Self {
        Self {
            variable_names,
            limit_names,
            scale,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends the entry for one solver event.
    pub fn record<M, P>(&mut self, event: &Event<'_, M, P>)
    where
        M: Model<Input = OperatingPoint, Output = SimulationOutputs>,
        P: OptimizationProblem<Input = OperatingPoint, Output = SimulationOutputs>,
    {
        let entry = match event {
            Event::Evaluated {
                probe,
                count,
                objective,
                constraints,
                input,
                output,
                ..
            } => Entry {
                evaluation: *count,
                probe: probe_name(*probe),
                variables: input.0.clone(),
                cost: Some(*objective),
                residuals: constraints.to_vec(),
                outputs: (*output).clone(),
                error: None,
            },
            Event::ModelFailed {
                probe,
                count,
                input,
                error,
                ..
            } => self.failed(*count, *probe, input.0.clone(), *error),
            Event::ProblemFailed {
                probe,
                count,
                x,
                error,
            } => self.failed(*count, *probe, self.scale.to_engineering(x), *error),
        };
        self.push(entry);
    }

    /// Appends the entry for the verification run at the optimum.
    pub fn record_verification(
        &mut self,
        point: &OperatingPoint,
        cost: Option<f64>,
        residuals: Vec<f64>,
        outputs: SimulationOutputs,
        error: Option<String>,
    ) {
        let entry = Entry {
            evaluation: self.entries.len() + 1,
            probe: "verification",
            variables: point.0.clone(),
            cost,
            residuals,
            outputs,
            error,
        };
        self.push(entry);
    }

    /// Seals the trajectory with its summary.
    #[must_use]
    pub fn finalize(self, summary: Summary) -> TrajectoryLog {
        TrajectoryLog {
            entries: self.entries,
            summary,
        }
    }

    fn failed(
        &self,
        evaluation: usize,
        probe: Probe,
        variables: Vec<f64>,
        error: &dyn std::error::Error,
    ) -> Entry {
        Entry {
            evaluation,
            probe: probe_name(probe),
            variables,
            cost: None,
            residuals: Vec::new(),
            outputs: SimulationOutputs::new(),
            error: Some(error.to_string()),
        }
    }

    fn push(&mut self, entry: Entry) {
        let line = self.progress_line(&entry);
        match &entry.error {
            None => tracing::info!(evaluation = entry.evaluation, probe = entry.probe, "{line}"),
            Some(error) => tracing::warn!(
                evaluation = entry.evaluation,
                probe = entry.probe,
                error = %error,
                "{line}"
            ),
        }
        self.entries.push(entry);
    }

    fn progress_line(&self, entry: &Entry) -> String {
        let variables = self
            .variable_names
            .iter()
            .zip(&entry.variables)
            .map(|(name, &value)| format!("{name}: {}", rounded(value)))
            .collect::<Vec<_>>()
            .join(", ");

        let concentrations = self
            .limit_names
            .iter()
            .filter_map(|name| entry.outputs.ppm(name).map(|ppm| format!("{name}: {ppm:.3}")))
            .collect::<Vec<_>>()
            .join(", ");

        match entry.cost {
            Some(cost) => format!("{variables} -> {concentrations} ppm, cost {cost:.6e}"),
            None => format!("{variables} -> failed"),
        }
    }
}

impl<M, P> Observer<Event<'_, M, P>, Action> for TrajectoryRecorder
where
    M: Model<Input = OperatingPoint, Output = SimulationOutputs>,
    P: OptimizationProblem<Input = OperatingPoint, Output = SimulationOutputs>,
{
    fn observe(&mut self, event: &Event<'_, M, P>) -> Option<Action> {
        self.record(event);
        None
    }
}

fn probe_name(probe: Probe) -> &'static str {
    match probe {
        Probe::Start => "start",
        Probe::Gradient => "gradient",
        Probe::LineSearch => "line_search",
        Probe::TrustRegion => "trust_region",
        Probe::Simplex => "simplex",
    }
}

/// Whole units for large magnitudes, two decimals otherwise.
fn rounded(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
