use std::convert::Infallible;

use approx::assert_relative_eq;
use dutytune_core::{Model, OptimizationProblem};

use crate::optimization::{Action, Error, Event, Probe, Status};

use super::{Config, minimize, minimize_unobserved};

/// Evaluates a closure, counting calls.
struct Function<F> {
    f: F,
    calls: usize,
}

impl<F: Fn(&[f64]) -> f64> Model for Function<F> {
    type Input = Vec<f64>;
    type Output = f64;
    type Error = Infallible;

    fn call(&mut self, x: &Vec<f64>) -> Result<f64, Self::Error> {
        self.calls += 1;
        Ok((self.f)(x.as_slice()))
    }
}

fn function<F: Fn(&[f64]) -> f64>(f: F) -> Function<F> {
    Function { f, calls: 0 }
}

/// Objective from the model output; residuals computed from the input.
struct Residuals<C> {
    residuals: C,
    count: usize,
}

impl<C: Fn(&[f64]) -> Vec<f64>> OptimizationProblem for Residuals<C> {
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
        Ok((self.residuals)(input.as_slice()))
    }

    fn constraint_count(&self) -> usize {
        self.count
    }
}

#[test]
fn minimizes_linear_objective_on_constraint_corner() {
    // min x + y  s.t.  x >= 1, y >= 2
    let mut model = function(|x| x[0] + x[1]);
    let problem = Residuals {
        residuals: |x: &[f64]| vec![x[0] - 1.0, x[1] - 2.0],
        count: 2,
    };
    let config = Config::new(500, 1.0, 1e-6).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[3.0, 3.0], &config).expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(solution.x[1], 2.0, epsilon = 1e-4);
    assert!(solution.max_violation() <= 1e-6);
    assert_eq!(solution.evals, model.calls);
}

#[test]
fn minimizes_quadratic_on_nonlinear_region() {
    // min x² + y²  s.t.  x + y >= 1  →  (0.5, 0.5)
    let mut model = function(|x| x[0] * x[0] + x[1] * x[1]);
    let problem = Residuals {
        residuals: |x: &[f64]| vec![x[0] + x[1] - 1.0],
        count: 1,
    };
    let config = Config::new(5000, 0.5, 1e-6).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[2.0, 0.0], &config).expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 0.5, epsilon = 1e-3);
    assert_relative_eq!(solution.x[1], 0.5, epsilon = 1e-3);
    assert!(solution.max_violation() <= 1e-4);
}

#[test]
fn recovers_from_infeasible_start() {
    // min x  s.t.  x >= 2, starting at x = 0
    let mut model = function(|x| x[0]);
    let problem = Residuals {
        residuals: |x: &[f64]| vec![x[0] - 2.0],
        count: 1,
    };
    let config = Config::new(500, 1.0, 1e-6).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[0.0], &config).expect("should converge");

    assert_relative_eq!(solution.x[0], 2.0, epsilon = 1e-4);
    assert!(solution.max_violation() <= 1e-4);
}

#[test]
fn unconstrained_problem_reaches_minimum() {
    let mut model = function(|x| (x[0] - 3.0).powi(2) + 1.0);
    let problem = Residuals {
        residuals: |_: &[f64]| Vec::<f64>::new(),
        count: 0,
    };
    let config = Config::new(2000, 1.0, 1e-6).unwrap();

    let solution =
        minimize_unobserved(&mut model, &problem, &[0.0], &config).expect("should converge");

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 3.0, epsilon = 1e-3);
    assert_relative_eq!(solution.objective, 1.0, epsilon = 1e-6);
}

#[test]
fn observer_sees_simplex_then_trials() {
    let mut model = function(|x| x[0] + x[1]);
    let problem = Residuals {
        residuals: |x: &[f64]| vec![x[0] - 1.0, x[1] - 2.0],
        count: 2,
    };
    let config = Config::new(500, 1.0, 1e-3).unwrap();

    let mut probes = Vec::new();
    let observer = |event: &Event<'_, _, _>| -> Option<Action> {
        probes.push(event.probe());
        None
    };

    minimize(&mut model, &problem, &[3.0, 3.0], &config, observer).expect("should converge");

    assert_eq!(probes[0], Probe::Start);
    assert_eq!(&probes[1..3], &[Probe::Simplex, Probe::Simplex]);
    assert_eq!(probes[3], Probe::TrustRegion);
    assert!(!probes.contains(&Probe::Gradient));
}

#[test]
fn observer_can_stop_early() {
    let mut model = function(|x| x[0] * x[0]);
    let problem = Residuals {
        residuals: |_: &[f64]| Vec::<f64>::new(),
        count: 0,
    };

    let observer = |event: &Event<'_, _, _>| {
        if event.count() == 5 {
            Some(Action::StopEarly)
        } else {
            None
        }
    };

    let solution = minimize(&mut model, &problem, &[4.0], &Config::default(), observer)
        .expect("should stop cleanly");

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.evals, 5);
    assert!(solution.objective <= 16.0);
}

#[test]
fn failed_start_is_infeasible() {
    let mut model = function(|_| f64::NAN);
    let problem = Residuals {
        residuals: |_: &[f64]| Vec::<f64>::new(),
        count: 0,
    };

    let result = minimize_unobserved(&mut model, &problem, &[1.0], &Config::default());

    assert!(matches!(result, Err(Error::NonFinite { .. })));
}

#[test]
fn config_requires_shrinking_radius() {
    assert!(Config::new(10, 1e-3, 1e-2).is_err());
    assert!(Config::new(10, 1.0, 0.0).is_err());
    assert!(Config::new(0, 1.0, 1e-4).is_err());
    assert!(Config::new(10, 1.0, 1e-4).is_ok());
}
