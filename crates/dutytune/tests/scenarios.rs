use std::{cell::RefCell, convert::Infallible, path::Path, rc::Rc, time::Duration};

use approx::assert_relative_eq;
use dutytune::{
    config::{RunConfig, RunPlan},
    driver::{Algorithm, DriverError},
    runner::{self, RunError},
    simulation::{RunStatus, Session, SurrogateSession, Watchdog},
};
use dutytune_solvers::optimization::{self, Status};
use serde_json::Value;
use tempfile::TempDir;

const DEMO: &str = include_str!("../../../demos/tuning.toml");
const SPLIT_DEMO: &str = include_str!("../../../demos/tuning_split.toml");

const H2S: &str = r"\Data\Streams\AGUAR1\Output\MOLEFRAC\MIXED\H2S";
const NH3: &str = r"\Data\Streams\AGUAR1\Output\MOLEFRAC\MIXED\NH3";

#[derive(Debug, Default)]
struct Journal {
    /// Inputs written before each run, in order.
    runs: Vec<Vec<(String, f64)>>,
    pending: Vec<(String, f64)>,
    closes: usize,
}

/// Passes every call through and keeps a journal.
struct Recording<S> {
    inner: S,
    journal: Rc<RefCell<Journal>>,
}

impl<S> Recording<S> {
    fn new(inner: S) -> (Self, Rc<RefCell<Journal>>) {
        let journal = Rc::default();
        (
            Self {
                inner,
                journal: Rc::clone(&journal),
            },
            journal,
        )
    }
}

impl<S: Session> Session for Recording<S> {
    type Error = S::Error;

    fn load_case(&mut self, path: &Path) -> Result<(), S::Error> {
        self.inner.load_case(path)
    }

    fn set_input(&mut self, path: &str, value: f64) -> Result<(), S::Error> {
        self.journal
            .borrow_mut()
            .pending
            .push((path.to_owned(), value));
        self.inner.set_input(path, value)
    }

    fn run(&mut self) -> Result<RunStatus, S::Error> {
        let mut journal = self.journal.borrow_mut();
        let inputs = std::mem::take(&mut journal.pending);
        journal.runs.push(inputs);
        drop(journal);
        self.inner.run()
    }

    fn get_output(&mut self, path: &str) -> Result<f64, S::Error> {
        self.inner.get_output(path)
    }

    fn close(&mut self) -> Result<(), S::Error> {
        self.journal.borrow_mut().closes += 1;
        self.inner.close()
    }
}

/// Converges to the same outputs for any input, or never converges.
struct Fixed {
    h2s_ppm: f64,
    nh3_ppm: f64,
    converges: bool,
}

impl Session for Fixed {
    type Error = Infallible;

    fn load_case(&mut self, _path: &Path) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_input(&mut self, _path: &str, _value: f64) -> Result<(), Infallible> {
        Ok(())
    }

    fn run(&mut self) -> Result<RunStatus, Infallible> {
        Ok(if self.converges {
            RunStatus::Converged
        } else {
            RunStatus::NotConverged
        })
    }

    fn get_output(&mut self, path: &str) -> Result<f64, Infallible> {
        Ok(match path {
            H2S => self.h2s_ppm * 1e-6,
            NH3 => self.nh3_ppm * 1e-6,
            _ => 100.0,
        })
    }

    fn close(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

fn always_feasible() -> Fixed {
    Fixed {
        h2s_ppm: 0.1,
        nh3_ppm: 10.0,
        converges: true,
    }
}

/// Parses `text` as if it lived in a fresh temporary directory.
fn plan_in(dir: &TempDir, text: &str) -> RunPlan {
    RunConfig::from_toml_str(text)
        .unwrap()
        .into_plan(&dir.path().join("tuning.toml"))
        .unwrap()
}

fn read_log(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn sqp_never_submits_out_of_bounds_values() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(&dir, DEMO);
    let (session, journal) = Recording::new(SurrogateSession::new());

    let report = runner::run(session, &plan).unwrap();

    let journal = journal.borrow();
    assert_eq!(journal.runs.len(), report.result.evaluations + 1);
    for inputs in &journal.runs {
        assert_eq!(inputs.len(), 3);
        for ((path, value), (spec, &(lower, upper))) in
            inputs.iter().zip(plan.inputs.iter().zip(&plan.bounds))
        {
            assert_eq!(path, &spec.path);
            assert!(
                (lower..=upper).contains(value),
                "{} = {value} outside [{lower}, {upper}]",
                spec.name
            );
        }
    }
}

#[test]
fn always_feasible_run_settles_on_lower_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(&dir, DEMO);

    let report = runner::run(always_feasible(), &plan).unwrap();
    let result = &report.result;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.status, Status::Converged);
    assert_relative_eq!(result.x[0], 450_000.0, max_relative = 1e-6);
    assert_relative_eq!(result.x[1], 700_000.0, max_relative = 1e-6);
    assert_relative_eq!(result.x[2], 1.0, max_relative = 1e-6);
    assert_eq!(result.max_violation, 0.0);
    assert_relative_eq!(result.cost, 1_150_001.0, max_relative = 1e-6);
}

#[test]
fn never_converging_simulator_is_an_infeasible_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(&dir, DEMO);
    let session = Fixed {
        converges: false,
        ..always_feasible()
    };

    let err = runner::run(session, &plan).unwrap_err();

    assert!(matches!(
        err,
        RunError::Driver(DriverError::Solver(
            optimization::Error::InfeasibleEvaluation { .. }
        ))
    ));

    // The partial trajectory still ends with a summary.
    let records = read_log(&plan.log_path);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["record"], "evaluation");
    assert!(records[0]["cost"].is_null());
    assert_eq!(records[1]["record"], "summary");
    assert_eq!(records[1]["success"], false);
    assert!(records[1]["message"].as_str().unwrap().contains("no usable evaluation"));
}

#[test]
fn every_algorithm_runs_the_surrogate_end_to_end() {
    for algorithm in ["sqp", "cobyla", "lbfgsb"] {
        let dir = tempfile::tempdir().unwrap();
        let text = DEMO.replace("algorithm = \"sqp\"", &format!("algorithm = \"{algorithm}\""));
        let text = text.replace("tol = 1e-6\n", "max_iters = 40\n");
        let plan = plan_in(&dir, &text);
        let (session, journal) = Recording::new(SurrogateSession::new());

        let report = runner::run(session, &plan).unwrap();

        assert_eq!(journal.borrow().closes, 1, "{algorithm}");
        assert_eq!(report.log.entries().len(), report.result.evaluations + 1);
        assert!(report.result.verified);

        let summary = report.log.summary();
        assert_eq!(summary.optimal, report.result.x);
        assert_eq!(summary.min_cost, Some(report.result.cost));
        assert!(summary.verification.as_ref().unwrap().get("T2_top").is_some());

        let records = read_log(&plan.log_path);
        assert_eq!(records.len(), report.result.evaluations + 2);
        let summary = records.last().unwrap();
        assert_eq!(summary["record"], "summary");
        assert_eq!(summary["algorithm"], algorithm);
        assert_eq!(summary["variable_names"][2], "QC");
        assert!(summary["max_violation"].is_number());
        assert_eq!(records[records.len() - 2]["probe"], "verification");
    }
}

#[test]
fn sqp_and_cobyla_reach_the_surrogate_optimum() {
    // Both limits active with QC at its lower bound.
    let optimum = [546_318.0, 852_939.0, 1.0];

    for (algorithm, max_violation) in [("sqp", 1e-6), ("cobyla", 1e-3)] {
        let dir = tempfile::tempdir().unwrap();
        let text = DEMO.replace("algorithm = \"sqp\"", &format!("algorithm = \"{algorithm}\""));
        let plan = plan_in(&dir, &text);

        let report = runner::run(SurrogateSession::new(), &plan).unwrap();
        let result = &report.result;

        assert!(result.success, "{algorithm}: {}", result.message);
        assert_eq!(result.status, Status::Converged, "{algorithm}");
        for (found, expected) in result.x.iter().zip(optimum) {
            assert_relative_eq!(*found, expected, max_relative = 1e-3);
        }
        assert!(result.max_violation <= max_violation, "{algorithm}: {}", result.max_violation);
    }
}

#[test]
fn penalized_summary_reports_the_limit_excess() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(&dir, SPLIT_DEMO);

    let report = runner::run(SurrogateSession::new(), &plan).unwrap();

    let summary = report.log.summary();
    assert_eq!(summary.formulation, "penalized");
    let verification = summary.verification.as_ref().unwrap();
    let excess = (verification.ppm("H2S").unwrap() - 0.2)
        .max(verification.ppm("NH3").unwrap() - 15.0)
        .max(0.0);
    assert_relative_eq!(summary.max_violation.unwrap(), excess, epsilon = 1e-12);

    let records = read_log(&plan.log_path);
    let logged = records.last().unwrap()["max_violation"].as_f64().unwrap();
    assert_relative_eq!(logged, excess, epsilon = 1e-9);
}

#[test]
fn cobyla_records_bound_residuals_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let text = DEMO.replace("algorithm = \"sqp\"", "algorithm = \"cobyla\"");
    let text = text.replace("tol = 1e-6\n", "max_iters = 5\n");
    let plan = plan_in(&dir, &text);

    let report = runner::run(SurrogateSession::new(), &plan).unwrap();

    let summary = report.log.summary();
    assert_eq!(summary.algorithm, Algorithm::Cobyla);
    assert_eq!(summary.formulation, "constrained");
    assert_eq!(
        summary.constraint_names,
        vec![
            "H2S", "NH3", "QN1.lower", "QN1.upper", "QN2.lower", "QN2.upper", "QC.lower",
            "QC.upper"
        ]
    );
    assert_eq!(report.log.entries()[0].residuals.len(), 8);
}

#[test]
fn split_fraction_is_never_submitted_negative() {
    let dir = tempfile::tempdir().unwrap();
    let text = SPLIT_DEMO
        .replace("algorithm = \"lbfgsb\"", "algorithm = \"cobyla\"")
        .replace("formulation = \"penalized\"", "rho_begin = 6.0")
        .replace("max_evaluations = 2000", "max_evaluations = 60");
    let plan = plan_in(&dir, &text);
    let (session, journal) = Recording::new(SurrogateSession::new());

    runner::run(session, &plan).unwrap();

    let journal = journal.borrow();
    let split: Vec<f64> = journal
        .runs
        .iter()
        .flatten()
        .filter(|(path, _)| path.ends_with("AGUAPR5A"))
        .map(|(_, value)| *value)
        .collect();
    assert!(!split.is_empty());
    assert!(split.iter().all(|&sf| sf >= 0.0), "{split:?}");
}

#[test]
fn watchdog_session_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let plan = plan_in(&dir, DEMO);
    assert_eq!(plan.timeout, Some(Duration::from_secs(600)));

    let session = Watchdog::spawn(SurrogateSession::new(), Duration::from_secs(60));
    let report = runner::run(session, &plan).unwrap();

    assert!(report.result.verified);
    assert!(plan.log_path.exists());
}

#[test]
fn log_override_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let mut plan = plan_in(&dir, DEMO);
    plan.log_path = dir.path().join("elsewhere.jsonl");

    runner::run(always_feasible(), &plan).unwrap();

    assert!(plan.log_path.exists());
    assert!(!dir.path().join("tuning.jsonl").exists());
}
