use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dutytune::{
    config::{self, RunPlan, SessionKind},
    runner::{self, RunReport},
    simulation::{Session, SurrogateSession, Watchdog},
};

#[derive(Parser, Debug)]
#[command(name = "dutytune")]
#[command(version)]
#[command(about = "Tunes simulator duties to meet contaminant limits at minimum utility cost")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log debug detail (session operations, input clamps)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Optimize the configured case
    Run {
        /// Path to the TOML run file
        #[arg(short, long)]
        config: PathBuf,

        /// Trajectory log path (overrides the run file)
        #[arg(short, long)]
        log: Option<PathBuf>,
    },
    /// Check a run file without opening a session
    Validate {
        /// Path to the TOML run file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();

    match args.command {
        Command::Run { config, log } => {
            let mut plan = load_plan(&config)?;
            if let Some(log) = log {
                plan.log_path = log;
            }
            run(&plan)?;
        }
        Command::Validate { config } => {
            let plan = load_plan(&config)?;
            tracing::info!(
                variables = plan.variable_names.len(),
                limits = plan.limits.len(),
                algorithm = %plan.solver.algorithm,
                "run file is valid"
            );
        }
    }
    Ok(())
}

fn load_plan(path: &Path) -> Result<RunPlan> {
    config::load(path)
        .and_then(|config| config.into_plan(path))
        .with_context(|| format!("invalid run file {}", path.display()))
}

fn run(plan: &RunPlan) -> Result<RunReport> {
    let session = match plan.session {
        SessionKind::Surrogate => SurrogateSession::new(),
    };
    match plan.timeout {
        Some(timeout) => run_with(Watchdog::spawn(session, timeout), plan),
        None => run_with(session, plan),
    }
}

fn run_with<S: Session>(session: S, plan: &RunPlan) -> Result<RunReport> {
    runner::run(session, plan).with_context(|| format!("run of {} failed", plan.case.display()))
}
