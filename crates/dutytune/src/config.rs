//! TOML run files.
//!
//! A [`RunConfig`] is parsed as written, then validated into a [`RunPlan`]
//! before any simulator session is opened.
//!
//! ```toml
//! [case]
//! path = "stripper.bkp"
//!
//! [[variables]]
//! name = "QN1"
//! path = '\Data\Blocks\T1\Input\QN'
//! initial = 560000.0
//! scale = 1e5
//! lower = 450000.0
//! upper = 600000.0
//!
//! [[limits]]
//! name = "H2S"
//! path = '\Data\Streams\AGUAR1\Output\MOLEFRAC\MIXED\H2S'
//! limit_ppm = 0.2
//!
//! [solver]
//! algorithm = "sqp"
//! ```

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use dutytune_core::{Bounds, BoundsError};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    driver::{Algorithm, SolverOptions},
    formulation::{Formulation, FormulationError, FormulationKind, LimitSpec, TuningProblem},
    scale::{ScaleError, ScaleFactors},
    simulation::{InputSpec, OutputSpec},
};

/// Which [`Session`](crate::simulation::Session) implementation to drive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// The built-in analytic flowsheet.
    #[default]
    Surrogate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub case: CaseConfig,
    pub variables: Vec<VariableConfig>,
    pub limits: Vec<LimitConfig>,
    #[serde(default)]
    pub reports: Vec<ReportConfig>,
    pub solver: SolverConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseConfig {
    /// Saved simulator case, relative to the config file.
    pub path: PathBuf,
    #[serde(default)]
    pub session: SessionKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableConfig {
    pub name: String,
    pub path: String,
    pub initial: f64,
    pub scale: f64,
    pub lower: f64,
    pub upper: f64,
    /// Whether the variable counts toward the utility cost.
    #[serde(default = "default_cost")]
    pub cost: bool,
    /// Floor applied before the value is sent to the simulator.
    pub min_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    pub name: String,
    pub path: String,
    pub limit_ppm: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    pub algorithm: Algorithm,
    #[serde(default)]
    pub formulation: FormulationKind,
    /// Defaults to the algorithm's own limit.
    pub max_iters: Option<usize>,
    /// Defaults to the algorithm's own tolerance.
    pub tol: Option<f64>,
    pub max_evaluations: Option<usize>,
    pub fd_step: Option<f64>,
    #[serde(default = "default_rho_begin")]
    pub rho_begin: f64,
    #[serde(default = "default_penalty_weight")]
    pub penalty_weight: f64,
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: f64,
    pub evaluation_timeout_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Defaults to the config path with a `.jsonl` extension.
    pub path: Option<PathBuf>,
}

fn default_cost() -> bool {
    true
}

fn default_rho_begin() -> f64 {
    1.0
}

fn default_penalty_weight() -> f64 {
    1e6
}

fn default_failure_penalty() -> f64 {
    1e12
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML")]
    Parse(#[from] toml::de::Error),

    #[error("at least one variable is required")]
    NoVariables,

    #[error("at least one limit is required")]
    NoLimits,

    #[error("name {0} is used more than once")]
    DuplicateName(String),

    #[error("invalid scale factor")]
    Scale(#[from] ScaleError),

    #[error("invalid bounds for {name}")]
    Bounds {
        name: String,
        #[source]
        source: BoundsError,
    },

    #[error("initial value {initial} of {name} is not strictly inside ({lower}, {upper})")]
    InitialOutOfBounds {
        name: String,
        initial: f64,
        lower: f64,
        upper: f64,
    },

    #[error("limit for {name} must be finite and non-negative, got {value}")]
    Limit { name: String, value: f64 },

    #[error("{option} {reason}")]
    InvalidOption {
        option: &'static str,
        reason: &'static str,
    },

    #[error("invalid solver options")]
    Solver(#[from] dutytune_solvers::optimization::ConfigError),

    #[error(transparent)]
    Formulation(#[from] FormulationError),
}

/// A validated run: everything needed to open a session and optimize.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub case: PathBuf,
    pub session: SessionKind,
    pub variable_names: Vec<String>,
    pub inputs: Vec<InputSpec>,

    /// Initial values in engineering units.
    pub initial: Vec<f64>,
    pub scale: ScaleFactors,

    /// Engineering `(lower, upper)` per variable.
    pub bounds: Vec<(f64, f64)>,
    pub cost_mask: Vec<bool>,
    pub limits: Vec<LimitSpec>,

    /// One output per limit, carrying its mole fraction.
    pub outputs: Vec<OutputSpec>,
    pub reports: Vec<OutputSpec>,
    pub solver: SolverOptions,
    pub timeout: Option<Duration>,
    pub log_path: PathBuf,
}

/// Reads and parses a run file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a valid run file.
pub fn load(path: &Path) -> Result<RunConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    RunConfig::from_toml_str(&text)
}

impl RunConfig {
    /// Parses a run file.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid run file.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Validates the run and resolves paths against `config_path`'s
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn into_plan(self, config_path: &Path) -> Result<RunPlan, ConfigError> {
        if self.variables.is_empty() {
            return Err(ConfigError::NoVariables);
        }
        if self.limits.is_empty() {
            return Err(ConfigError::NoLimits);
        }
        check_unique(
            self.variables
                .iter()
                .map(|v| &v.name)
                .chain(self.limits.iter().map(|l| &l.name))
                .chain(self.reports.iter().map(|r| &r.name)),
        )?;

        let scale = ScaleFactors::new(self.variables.iter().map(|v| v.scale).collect())?;
        for var in &self.variables {
            check_variable(var)?;
        }
        for limit in &self.limits {
            if !limit.limit_ppm.is_finite() || limit.limit_ppm < 0.0 {
                return Err(ConfigError::Limit {
                    name: limit.name.clone(),
                    value: limit.limit_ppm,
                });
            }
        }

        let solver = solver_options(&self.solver)?;
        let timeout = timeout(self.solver.evaluation_timeout_secs)?;

        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        let log_path = match self.log.path {
            Some(path) => base.join(path),
            None => config_path.with_extension("jsonl"),
        };

        let plan = RunPlan {
            case: base.join(&self.case.path),
            session: self.case.session,
            variable_names: self.variables.iter().map(|v| v.name.clone()).collect(),
            inputs: self
                .variables
                .iter()
                .map(|v| InputSpec {
                    name: v.name.clone(),
                    path: v.path.clone(),
                    min_value: v.min_value,
                })
                .collect(),
            initial: self.variables.iter().map(|v| v.initial).collect(),
            scale,
            bounds: self.variables.iter().map(|v| (v.lower, v.upper)).collect(),
            cost_mask: self.variables.iter().map(|v| v.cost).collect(),
            limits: self
                .limits
                .iter()
                .map(|l| LimitSpec {
                    name: l.name.clone(),
                    limit_ppm: l.limit_ppm,
                })
                .collect(),
            outputs: self
                .limits
                .iter()
                .map(|l| OutputSpec {
                    name: l.name.clone(),
                    path: l.path.clone(),
                })
                .collect(),
            reports: self
                .reports
                .into_iter()
                .map(|r| OutputSpec {
                    name: r.name,
                    path: r.path,
                })
                .collect(),
            solver,
            timeout,
            log_path,
        };

        // Surfaces unsupported algorithm/formulation pairs now.
        plan.problem()?;
        Ok(plan)
    }
}

impl RunPlan {
    /// Builds the problem for the configured algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error if the formulation does not suit the algorithm.
    pub fn problem(&self) -> Result<TuningProblem, FormulationError> {
        let capabilities = self.solver.algorithm.capabilities();
        let formulation = Formulation::select(
            capabilities,
            self.solver.formulation,
            self.limits.clone(),
            &self.scale.to_scaled_bounds(&self.bounds),
            self.solver.penalty_weight,
        )?;
        Ok(TuningProblem::new(
            self.scale.clone(),
            self.cost_mask.clone(),
            self.bounds.clone(),
            capabilities.supports_native_bounds,
            formulation,
        ))
    }

    /// The initial point in scaled units.
    #[must_use]
    pub fn start(&self) -> Vec<f64> {
        self.scale.to_scaled(&self.initial)
    }

    /// Variable bounds in scaled units.
    ///
    /// # Errors
    ///
    /// Returns an error if a scaled pair is inverted or degenerate.
    pub fn scaled_bounds(&self) -> Result<Bounds, BoundsError> {
        Bounds::new(&self.scale.to_scaled_bounds(&self.bounds))
    }

    #[must_use]
    pub fn limit_names(&self) -> Vec<String> {
        self.limits.iter().map(|l| l.name.clone()).collect()
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a String>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName(name.clone()));
        }
    }
    Ok(())
}

fn check_variable(var: &VariableConfig) -> Result<(), ConfigError> {
    let bounds = Bounds::new(&[(var.lower, var.upper)]).map_err(|source| ConfigError::Bounds {
        name: var.name.clone(),
        source,
    })?;
    if !var.lower.is_finite() || !var.upper.is_finite() {
        return Err(ConfigError::InvalidOption {
            option: "variable bounds",
            reason: "must be finite",
        });
    }
    if !bounds.contains_strictly(&[var.initial]) {
        return Err(ConfigError::InitialOutOfBounds {
            name: var.name.clone(),
            initial: var.initial,
            lower: var.lower,
            upper: var.upper,
        });
    }
    if var.min_value.is_some_and(|min| !min.is_finite()) {
        return Err(ConfigError::InvalidOption {
            option: "min_value",
            reason: "must be finite",
        });
    }
    Ok(())
}

fn solver_options(config: &SolverConfig) -> Result<SolverOptions, ConfigError> {
    let mut options = SolverOptions::new(config.algorithm);
    options.formulation = config.formulation;
    if let Some(max_iters) = config.max_iters {
        options.max_iters = max_iters;
    }
    if let Some(tol) = config.tol {
        options.tol = tol;
    }
    options.max_evaluations = config.max_evaluations;
    options.fd_step = config.fd_step;
    options.rho_begin = config.rho_begin;
    options.penalty_weight = config.penalty_weight;
    options.failure_penalty = config.failure_penalty;

    if options.max_evaluations == Some(0) {
        return Err(ConfigError::InvalidOption {
            option: "max_evaluations",
            reason: "must be at least 1",
        });
    }
    if !options.penalty_weight.is_finite() || options.penalty_weight <= 0.0 {
        return Err(ConfigError::InvalidOption {
            option: "penalty_weight",
            reason: "must be finite and positive",
        });
    }
    options.validate()?;
    Ok(options)
}

fn timeout(secs: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    secs.map(|secs| {
        Duration::try_from_secs_f64(secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::InvalidOption {
                option: "evaluation_timeout_secs",
                reason: "must be finite and positive",
            })
    })
    .transpose()
}
