//! Runs one optimization over a [`Simulator`] and verifies the result.
//!
//! The driver picks the solver, wires the trajectory recorder, the failure
//! policy, and the optional evaluation budget into a single observer, and
//! re-evaluates the reported optimum so the last trajectory entry matches
//! the returned [`OptimizationResult`].

use std::fmt;

use dutytune_core::{Bounds, BoundsError, Observer, OptimizationProblem};
use dutytune_observers::EvaluationBudget;
use dutytune_solvers::optimization::{
    self, Action, ConfigError, Event, Solution, Status, cobyla, lbfgsb, sqp,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    formulation::{Capabilities, FormulationError, FormulationKind, TuningProblem},
    recorder::TrajectoryRecorder,
    simulation::{OperatingPoint, Session, SimulationError, SimulationOutputs, Simulator},
};

/// Solver back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Sequential quadratic programming.
    Sqp,

    /// Derivative-free linear approximations.
    Cobyla,

    /// Projected limited-memory BFGS.
    Lbfgsb,
}

impl Algorithm {
    #[must_use]
    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::Sqp => Capabilities {
                supports_native_bounds: true,
                supports_nonlinear_constraints: true,
            },
            Self::Cobyla => Capabilities {
                supports_native_bounds: false,
                supports_nonlinear_constraints: true,
            },
            Self::Lbfgsb => Capabilities {
                supports_native_bounds: true,
                supports_nonlinear_constraints: false,
            },
        }
    }

    #[must_use]
    pub fn default_max_iters(self) -> usize {
        match self {
            Self::Sqp => sqp::Config::default().max_iters(),
            Self::Cobyla => cobyla::Config::default().max_iters(),
            Self::Lbfgsb => lbfgsb::Config::default().max_iters(),
        }
    }

    /// Step tolerance for SQP, final trust radius for COBYLA, relative
    /// reduction tolerance for L-BFGS-B.
    #[must_use]
    pub fn default_tol(self) -> f64 {
        match self {
            Self::Sqp => sqp::Config::default().tol(),
            Self::Cobyla => cobyla::Config::default().rho_end(),
            Self::Lbfgsb => lbfgsb::Config::default().ftol(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqp => "SQP",
            Self::Cobyla => "COBYLA",
            Self::Lbfgsb => "L-BFGS-B",
        })
    }
}

/// Run parameters for one optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
    pub algorithm: Algorithm,
    pub formulation: FormulationKind,
    pub max_iters: usize,
    pub tol: f64,
    pub max_evaluations: Option<usize>,
    pub fd_step: Option<f64>,

    /// Initial trust radius (COBYLA), in scaled units.
    pub rho_begin: f64,

    pub penalty_weight: f64,

    /// Cost substituted at points where the simulation did not converge.
    pub failure_penalty: f64,
}

impl SolverOptions {
    /// Options with the algorithm's default budget and tolerance.
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            formulation: FormulationKind::Auto,
            max_iters: algorithm.default_max_iters(),
            tol: algorithm.default_tol(),
            max_evaluations: None,
            fd_step: None,
            rho_begin: cobyla::Config::default().rho_begin(),
            penalty_weight: 1e6,
            failure_penalty: 1e12,
        }
    }

    /// Checks the options against the chosen solver.
    ///
    /// # Errors
    ///
    /// Returns the solver's config error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.configure().map(|_| ())
    }

    fn configure(&self) -> Result<Configured, ConfigError> {
        Ok(match self.algorithm {
            Algorithm::Sqp => {
                let mut config = sqp::Config::new(self.max_iters, self.tol)?
                    .with_worse_value(self.failure_penalty)?;
                if let Some(step) = self.fd_step {
                    config = config.with_fd_step(step)?;
                }
                Configured::Sqp(config)
            }
            Algorithm::Cobyla => Configured::Cobyla(
                cobyla::Config::new(self.max_iters, self.rho_begin, self.tol)?
                    .with_worse_value(self.failure_penalty)?,
            ),
            Algorithm::Lbfgsb => {
                let mut config = lbfgsb::Config::new(self.max_iters, self.tol)?
                    .with_worse_value(self.failure_penalty)?;
                if let Some(step) = self.fd_step {
                    config = config.with_fd_step(step)?;
                }
                Configured::Lbfgsb(config)
            }
        })
    }
}

enum Configured {
    Sqp(sqp::Config),
    Cobyla(cobyla::Config),
    Lbfgsb(lbfgsb::Config),
}

/// The outcome of [`optimize`], in engineering units.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub x: Vec<f64>,
    pub cost: f64,
    pub success: bool,
    pub status: Status,
    pub message: String,
    pub iterations: usize,

    /// Solver evaluations, not counting the verification run.
    pub evaluations: usize,
    pub max_violation: f64,

    /// Outputs at `x`, including report values when verified.
    pub outputs: SimulationOutputs,

    /// False if the verification run failed and the solver's own values
    /// were kept.
    pub verified: bool,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Formulation(#[from] FormulationError),

    #[error("invalid bounds")]
    Bounds(#[from] BoundsError),

    #[error("invalid solver options")]
    SolverConfig(#[from] ConfigError),

    #[error("optimization failed")]
    Solver(#[from] optimization::Error),

    #[error("verification run at the optimum failed")]
    Verification(#[source] SimulationError),
}

/// Minimizes `problem` over `simulator`, starting from the scaled `start`.
///
/// Every evaluation is passed to `recorder`. A simulation that does not
/// converge is recorded and treated as strictly worse than any evaluated
/// point, so the solver steers away from it.
///
/// # Errors
///
/// Returns an error on invalid options, if the start point cannot be
/// evaluated, if the session fails, or if a configured output is missing.
/// Running out of iterations is not an error.
pub fn optimize<S: Session>(
    simulator: &mut Simulator<S>,
    problem: &TuningProblem,
    start: &[f64],
    bounds: &Bounds,
    options: &SolverOptions,
    recorder: &mut TrajectoryRecorder,
) -> Result<OptimizationResult, DriverError> {
    tracing::info!(
        algorithm = %options.algorithm,
        variables = start.len(),
        constraints = problem.constraint_count(),
        penalized = problem.formulation().is_penalized(),
        "starting optimization"
    );

    let configured = options.configure()?;
    let mut budget = options.max_evaluations.map(EvaluationBudget::new);
    let observer = |event: &Event<'_, Simulator<S>, TuningProblem>| -> Option<Action> {
        recorder.record(event);
        let stop = budget.as_mut().and_then(|budget| budget.observe(event));
        stop.or_else(|| failure_policy(event))
    };

    let solution = match configured {
        Configured::Sqp(config) => {
            sqp::minimize(simulator, problem, start, bounds, &config, observer)?
        }
        Configured::Cobyla(config) => {
            cobyla::minimize(simulator, problem, start, &config, observer)?
        }
        Configured::Lbfgsb(config) => {
            lbfgsb::minimize(simulator, problem, start, bounds, &config, observer)?
        }
    };

    let budget_exhausted = budget.is_some_and(|budget| budget.is_exhausted());
    let mut result = into_result(solution, budget_exhausted);
    result.max_violation = result
        .max_violation
        .max(problem.formulation().limit_violation(&result.outputs)?);

    if result.success {
        tracing::info!(message = %result.message, "optimization converged");
    } else {
        tracing::warn!(message = %result.message, "optimization did not converge");
    }

    verify(simulator, problem, recorder, &mut result)?;
    Ok(result)
}

/// Recovers from points where the flowsheet did not converge.
fn failure_policy<S: Session>(
    event: &Event<'_, Simulator<S>, TuningProblem>,
) -> Option<Action> {
    match event {
        Event::ModelFailed { error, count, .. } if error.is_not_converged() => {
            tracing::warn!(
                evaluation = count,
                "simulation did not converge; treating the point as infeasible"
            );
            Some(Action::AssumeWorse)
        }
        _ => None,
    }
}

fn into_result(
    solution: Solution<OperatingPoint, SimulationOutputs>,
    budget_exhausted: bool,
) -> OptimizationResult {
    let max_violation = solution.max_violation();
    let success = solution.is_success();
    let message = if budget_exhausted && solution.status == Status::StoppedByObserver {
        "Maximum number of function evaluations has been exceeded".to_owned()
    } else {
        solution.message
    };

    OptimizationResult {
        x: solution.snapshot.input.0,
        cost: solution.objective,
        success,
        status: solution.status,
        message,
        iterations: solution.iters,
        evaluations: solution.evals,
        max_violation,
        outputs: solution.snapshot.output,
        verified: false,
    }
}

/// Re-evaluates the optimum and records it as the final entry.
///
/// A verification run that does not converge keeps the solver's values;
/// any other failure is fatal.
fn verify<S: Session>(
    simulator: &mut Simulator<S>,
    problem: &TuningProblem,
    recorder: &mut TrajectoryRecorder,
    result: &mut OptimizationResult,
) -> Result<(), DriverError> {
    let point = OperatingPoint(result.x.clone());

    match simulator.verify(&point) {
        Ok(outputs) => {
            let cost = problem.objective(&point, &outputs)?;
            let residuals = problem.constraints(&point, &outputs)?;

            result.cost = cost;
            result.max_violation = optimization::max_violation(&residuals)
                .max(problem.formulation().limit_violation(&outputs)?);
            result.outputs = outputs.clone();
            result.verified = true;

            recorder.record_verification(&point, Some(cost), residuals, outputs, None);
            for (name, value) in result.outputs.iter() {
                tracing::info!(output = name, value, "verified");
            }
            Ok(())
        }
        Err(err) if err.is_not_converged() => {
            tracing::warn!("verification run did not converge; keeping the solver's values");
            recorder.record_verification(
                &point,
                None,
                Vec::new(),
                SimulationOutputs::new(),
                Some(err.to_string()),
            );
            Ok(())
        }
        Err(err) => Err(DriverError::Verification(err)),
    }
}
