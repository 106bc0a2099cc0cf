//! One complete run: open the case, optimize, persist the trajectory, close.

use dutytune_core::BoundsError;
use thiserror::Error;

use crate::{
    config::RunPlan,
    driver::{self, DriverError, OptimizationResult},
    formulation::FormulationError,
    recorder::{LogError, Summary, TrajectoryLog, TrajectoryRecorder},
    simulation::{Session, SessionGuard, Simulator},
};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to open case {case}")]
    Open {
        case: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Formulation(#[from] FormulationError),

    #[error("invalid scaled bounds")]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Log(#[from] LogError),
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub result: OptimizationResult,
    pub log: TrajectoryLog,
}

/// Runs `plan` against `session`.
///
/// The session is closed exactly once on every path. If the optimization
/// fails after it started, the partial trajectory is still written, with a
/// summary carrying the failure.
///
/// # Errors
///
/// Returns an error if the case cannot be opened, the optimization aborts,
/// or the log cannot be written.
pub fn run<S: Session>(session: S, plan: &RunPlan) -> Result<RunReport, RunError> {
    let problem = plan.problem()?;
    let bounds = plan.scaled_bounds()?;
    let start = plan.start();
    let constraint_names = problem.formulation().constraint_names(&plan.variable_names);
    let formulation = if problem.formulation().is_penalized() {
        "penalized"
    } else {
        "constrained"
    };

    tracing::info!(case = %plan.case.display(), "opening case");
    let guard = SessionGuard::open(session, &plan.case).map_err(|err| RunError::Open {
        case: plan.case.display().to_string(),
        source: Box::new(err),
    })?;
    let mut simulator = Simulator::new(
        guard,
        plan.inputs.clone(),
        plan.outputs.clone(),
        plan.reports.clone(),
    );
    let mut recorder = TrajectoryRecorder::new(
        plan.variable_names.clone(),
        plan.limit_names(),
        plan.scale.clone(),
    );

    let outcome = driver::optimize(
        &mut simulator,
        &problem,
        &start,
        &bounds,
        &plan.solver,
        &mut recorder,
    );

    if let Err(err) = simulator.close() {
        tracing::warn!(error = %err, "failed to close session");
    }

    let mut summary = Summary {
        algorithm: plan.solver.algorithm,
        formulation,
        variable_names: plan.variable_names.clone(),
        constraint_names,
        optimal: Vec::new(),
        min_cost: None,
        evaluations: recorder.len(),
        iterations: 0,
        success: false,
        message: String::new(),
        max_violation: None,
        verification: None,
    };

    match outcome {
        Ok(result) => {
            summary.optimal.clone_from(&result.x);
            summary.min_cost = Some(result.cost);
            summary.evaluations = result.evaluations;
            summary.iterations = result.iterations;
            summary.success = result.success;
            summary.message.clone_from(&result.message);
            summary.max_violation = Some(result.max_violation);
            summary.verification = result.verified.then(|| result.outputs.clone());

            report(&summary);
            let log = recorder.finalize(summary);
            log.write_to(&plan.log_path)?;
            tracing::info!(path = %plan.log_path.display(), "trajectory written");
            Ok(RunReport { result, log })
        }
        Err(err) => {
            summary.message = error_chain(&err);
            tracing::error!(error = %summary.message, "optimization aborted");

            let log = recorder.finalize(summary);
            if let Err(log_err) = log.write_to(&plan.log_path) {
                tracing::warn!(error = %log_err, "failed to write partial trajectory");
            }
            Err(err.into())
        }
    }
}

fn report(summary: &Summary) {
    let optimal = summary
        .variable_names
        .iter()
        .zip(&summary.optimal)
        .map(|(name, value)| format!("{name} = {value}"))
        .collect::<Vec<_>>()
        .join(", ");

    tracing::info!("Optimal values: {optimal}");
    if let Some(cost) = summary.min_cost {
        tracing::info!("Minimum cost: {cost}");
    }
    tracing::info!("Number of iterations: {}", summary.iterations);
    tracing::info!("Number of function evaluations: {}", summary.evaluations);
    tracing::info!("Optimization success: {}", summary.success);
    tracing::info!("Message: {}", summary.message);
    if let Some(violation) = summary.max_violation {
        tracing::info!("Maximum constraint violation: {violation:e}");
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
