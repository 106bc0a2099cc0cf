use std::convert::Infallible;

use approx::assert_relative_eq;
use dutytune_core::{Bounds, Model, OptimizationProblem};
use thiserror::Error;

use crate::optimization::{Action, Error, Event, Probe, Status};

use super::{Config, minimize, minimize_unobserved};

/// Records every point it is asked to evaluate.
struct Recording<F> {
    f: F,
    seen: Vec<Vec<f64>>,
}

impl<F: Fn(&[f64]) -> f64> Model for Recording<F> {
    type Input = Vec<f64>;
    type Output = f64;
    type Error = Infallible;

    fn call(&mut self, x: &Vec<f64>) -> Result<f64, Self::Error> {
        self.seen.push(x.clone());
        Ok((self.f)(x.as_slice()))
    }
}

/// Uses the model output as the objective, with linear residuals
/// `offset - weights·x >= 0`.
struct Linear {
    constraints: Vec<(Vec<f64>, f64)>,
}

impl OptimizationProblem for Linear {
    type Input = Vec<f64>;
    type Output = f64;
    type Error = Infallible;

    fn input(&self, x: &[f64]) -> Result<Vec<f64>, Self::Error> {
        Ok(x.to_vec())
    }

    fn objective(&self, _input: &Vec<f64>, output: &f64) -> Result<f64, Self::Error> {
        Ok(*output)
    }

    fn constraints(&self, input: &Vec<f64>, _output: &f64) -> Result<Vec<f64>, Self::Error> {
        Ok(self
            .constraints
            .iter()
            .map(|(weights, offset)| {
                offset - weights.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect())
    }

    fn constraint_count(&self) -> usize {
        self.constraints.len()
    }
}

fn recording<F: Fn(&[f64]) -> f64>(f: F) -> Recording<F> {
    Recording {
        f,
        seen: Vec::new(),
    }
}

#[test]
fn minimizes_paraboloid_on_constraint() {
    // min (x - 2)² + (y - 1)²  s.t.  x + y <= 2  →  (1.5, 0.5)
    let mut model = recording(|x| (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2));
    let problem = Linear {
        constraints: vec![(vec![1.0, 1.0], 2.0)],
    };
    let bounds = Bounds::new(&[(0.0, 5.0), (0.0, 5.0)]).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[0.5, 0.5], &bounds, &Config::default())
            .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 1.5, epsilon = 1e-3);
    assert_relative_eq!(solution.x[1], 0.5, epsilon = 1e-3);
    assert!(solution.max_violation() <= 1e-6);
    assert_eq!(solution.evals, model.seen.len());
}

#[test]
fn converges_when_the_objective_is_large() {
    // Utility costs sit around 1e6; the stopping test has to scale with them.
    let mut model =
        recording(|x| 1e6 * (1.0 + (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2)));
    let problem = Linear {
        constraints: vec![(vec![1.0, 1.0], 2.0)],
    };
    let bounds = Bounds::new(&[(0.0, 5.0), (0.0, 5.0)]).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[0.5, 0.5], &bounds, &Config::default())
            .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert!(solution.is_success());
    assert_relative_eq!(solution.x[0], 1.5, epsilon = 1e-3);
    assert_relative_eq!(solution.x[1], 0.5, epsilon = 1e-3);
    assert!(solution.max_violation() <= 1e-6);
}

#[test]
fn never_evaluates_outside_bounds() {
    let mut model = recording(|x| x[0] + x[1]);
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(1.0, 3.0), (2.0, 4.0)]).unwrap();

    // Start outside the box; it is projected before the first evaluation.
    let solution =
        minimize_unobserved(&mut model, &problem, &[5.0, 3.0], &bounds, &Config::default())
            .expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(solution.x[1], 2.0, epsilon = 1e-9);
    assert!(model.seen.iter().all(|x| bounds.contains(x)));
    assert_eq!(model.seen[0], vec![3.0, 3.0]);
}

#[test]
fn events_are_numbered_and_tagged() {
    let mut model = recording(|x| x[0] * x[0]);
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(-1.0, 1.0)]).unwrap();

    let mut seen = Vec::new();
    let mut first = None;
    let observer = |event: &Event<'_, _, _>| -> Option<Action> {
        seen.push((event.count(), event.probe()));
        if first.is_none() {
            first = Some((event.objective(), event.max_violation(), event.is_failure()));
        }
        None
    };

    let solution = minimize(&mut model, &problem, &[0.5], &bounds, &Config::default(), observer)
        .expect("should converge");

    assert_eq!(first, Some((Some(0.25), Some(0.0), false)));

    assert_eq!(seen[0], (1, Probe::Start));
    assert_eq!(seen[1], (2, Probe::Gradient));
    assert!(seen.iter().any(|(_, probe)| *probe == Probe::LineSearch));
    assert!(seen.iter().enumerate().all(|(i, (count, _))| *count == i + 1));
    assert_eq!(seen.len(), solution.evals);
}

#[test]
fn observer_can_stop_early() {
    let mut model = recording(|x| (x[0] - 3.0).powi(2));
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(0.0, 10.0)]).unwrap();

    let observer = |event: &Event<'_, _, _>| {
        if event.count() >= 3 {
            Some(Action::StopEarly)
        } else {
            None
        }
    };

    let solution = minimize(&mut model, &problem, &[0.0], &bounds, &Config::default(), observer)
        .expect("should stop cleanly");

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.evals, 3);
    assert_eq!(model.seen.len(), 3);
}

#[derive(Debug, Error)]
#[error("simulation diverged")]
struct Diverged;

/// Fails whenever the first variable exceeds `limit`.
struct Fragile {
    limit: f64,
}

impl Model for Fragile {
    type Input = Vec<f64>;
    type Output = f64;
    type Error = Diverged;

    fn call(&mut self, x: &Vec<f64>) -> Result<f64, Self::Error> {
        if x[0] > self.limit { Err(Diverged) } else { Ok(-x[0]) }
    }
}

#[test]
fn assume_worse_recovers_from_model_failures() {
    let mut model = Fragile { limit: 2.0 };
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(0.0, 4.0)]).unwrap();

    let mut failures = 0;
    let observer = |event: &Event<'_, _, _>| match event {
        Event::ModelFailed { .. } => {
            failures += 1;
            Some(Action::AssumeWorse)
        }
        _ => None,
    };

    let solution = minimize(&mut model, &problem, &[1.0], &bounds, &Config::default(), observer)
        .expect("failures are recoverable");

    assert!(failures > 0);
    assert!(solution.x[0] <= 2.0);
    assert!(solution.x[0] >= 1.75);
    assert_relative_eq!(solution.objective, -solution.x[0]);
}

#[test]
fn model_failure_without_observer_is_an_error() {
    let mut model = Fragile { limit: 2.0 };
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(0.0, 4.0)]).unwrap();

    let result = minimize_unobserved(&mut model, &problem, &[1.0], &bounds, &Config::default());

    assert!(matches!(result, Err(Error::Model(_))));
}

#[test]
fn unusable_start_is_infeasible() {
    let mut model = Fragile { limit: -1.0 };
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(0.0, 4.0)]).unwrap();

    let observer = |_: &Event<'_, _, _>| Some(Action::AssumeWorse);
    let result = minimize(&mut model, &problem, &[1.0], &bounds, &Config::default(), observer);

    match result {
        Err(Error::InfeasibleEvaluation { x }) => assert_eq!(x, vec![1.0]),
        other => panic!("expected InfeasibleEvaluation, got {other:?}"),
    }
}

#[test]
fn rejects_mismatched_dimensions() {
    let mut model = recording(|x| x[0]);
    let problem = Linear {
        constraints: Vec::new(),
    };
    let bounds = Bounds::new(&[(0.0, 1.0), (0.0, 1.0)]).unwrap();

    let result = minimize_unobserved(&mut model, &problem, &[0.5], &bounds, &Config::default());

    assert!(matches!(
        result,
        Err(Error::Dimension {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn config_rejects_bad_values() {
    assert!(Config::new(0, 1e-6).is_err());
    assert!(Config::new(10, -1.0).is_err());
    assert!(Config::default().with_fd_step(f64::NAN).is_err());
    assert!(Config::default().with_worse_value(0.0).is_err());
}
