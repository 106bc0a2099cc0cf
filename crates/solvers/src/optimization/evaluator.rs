use dutytune_core::{Model, Observer, OptimizationProblem, Snapshot};

use super::{
    Action, Error, EvalError, Event, Probe, Solution, Status, evaluate, total_violation,
};

/// A point a solver can work with: either a real evaluation or a substituted
/// worse value (no snapshot).
pub(crate) struct Point<I, O> {
    pub(crate) x: Vec<f64>,
    pub(crate) objective: f64,
    pub(crate) constraints: Vec<f64>,
    pub(crate) snapshot: Option<Snapshot<I, O>>,
}

impl<I, O> Point<I, O> {
    /// L1 exact-penalty merit.
    pub(crate) fn merit(&self, penalty: f64) -> f64 {
        self.objective + penalty * total_violation(&self.constraints)
    }

    /// Returns the point as an iterate, or `None` if it was substituted.
    pub(crate) fn into_iterate(self) -> Option<Iterate<I, O>> {
        let snapshot = self.snapshot?;
        Some(Iterate {
            x: self.x,
            objective: self.objective,
            constraints: self.constraints,
            snapshot,
        })
    }
}

/// A successfully evaluated point that can be reported as a solution.
pub(crate) struct Iterate<I, O> {
    pub(crate) x: Vec<f64>,
    pub(crate) objective: f64,
    pub(crate) constraints: Vec<f64>,
    pub(crate) snapshot: Snapshot<I, O>,
}

impl<I, O> Iterate<I, O> {
    pub(crate) fn merit(&self, penalty: f64) -> f64 {
        self.objective + penalty * total_violation(&self.constraints)
    }

    pub(crate) fn into_solution(
        self,
        status: Status,
        message: impl Into<String>,
        iters: usize,
        evals: usize,
    ) -> Solution<I, O> {
        Solution {
            status,
            message: message.into(),
            x: self.x,
            objective: self.objective,
            constraints: self.constraints,
            snapshot: self.snapshot,
            iters,
            evals,
        }
    }

    pub(crate) fn into_stopped(self, iters: usize, evals: usize) -> Solution<I, O> {
        self.into_solution(Status::StoppedByObserver, "Stopped by observer", iters, evals)
    }
}

impl<I, O> From<Iterate<I, O>> for Point<I, O> {
    fn from(iterate: Iterate<I, O>) -> Self {
        Self {
            x: iterate.x,
            objective: iterate.objective,
            constraints: iterate.constraints,
            snapshot: Some(iterate.snapshot),
        }
    }
}

pub(crate) enum Outcome<I, O> {
    Point(Point<I, O>),

    /// The observer asked to stop. Carries the evaluation if it was usable.
    Stop(Option<Iterate<I, O>>),
}

/// Runs evaluations on behalf of a solver, numbering them, notifying the
/// observer, and applying its action.
pub(crate) struct Evaluator<'a, M, P, Obs> {
    model: &'a mut M,
    problem: &'a P,
    observer: Obs,
    worse_value: f64,
    constraint_count: usize,
    count: usize,
}

impl<'a, M, P, Obs> Evaluator<'a, M, P, Obs>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
    Obs: for<'e> Observer<Event<'e, M, P>, Action>,
{
    pub(crate) fn new(model: &'a mut M, problem: &'a P, observer: Obs, worse_value: f64) -> Self {
        Self {
            model,
            problem,
            observer,
            worse_value,
            constraint_count: problem.constraint_count(),
            count: 0,
        }
    }

    /// Number of evaluations requested so far.
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn evaluate(
        &mut self,
        x: &[f64],
        probe: Probe,
    ) -> Result<Outcome<M::Input, M::Output>, Error> {
        self.count += 1;
        let count = self.count;

        match evaluate(&mut *self.model, self.problem, x) {
            Ok(eval) => {
                if eval.constraints.len() != self.constraint_count {
                    return Err(Error::ConstraintCount {
                        expected: self.constraint_count,
                        actual: eval.constraints.len(),
                    });
                }

                let action = {
                    let event: Event<'_, M, P> = Event::Evaluated {
                        probe,
                        count,
                        x,
                        objective: eval.objective,
                        constraints: &eval.constraints,
                        input: &eval.snapshot.input,
                        output: &eval.snapshot.output,
                    };
                    self.observer.observe(&event)
                };

                let finite = eval.is_finite();
                let point = Point {
                    x: eval.x,
                    objective: eval.objective,
                    constraints: eval.constraints,
                    snapshot: Some(eval.snapshot),
                };

                match action {
                    Some(Action::StopEarly) => {
                        Ok(Outcome::Stop(if finite { point.into_iterate() } else { None }))
                    }
                    Some(Action::AssumeWorse) => Ok(Outcome::Point(self.worse(x))),
                    None if !finite => Err(Error::NonFinite { x: x.to_vec() }),
                    None => Ok(Outcome::Point(point)),
                }
            }
            Err(err) => {
                let action = match &err {
                    EvalError::Model { input, error } => {
                        let event: Event<'_, M, P> = Event::ModelFailed {
                            probe,
                            count,
                            x,
                            input,
                            error,
                        };
                        self.observer.observe(&event)
                    }
                    EvalError::Problem(error) => {
                        let event: Event<'_, M, P> = Event::ProblemFailed {
                            probe,
                            count,
                            x,
                            error,
                        };
                        self.observer.observe(&event)
                    }
                };

                match action {
                    Some(Action::StopEarly) => Ok(Outcome::Stop(None)),
                    Some(Action::AssumeWorse) => Ok(Outcome::Point(self.worse(x))),
                    None => Err(err.into()),
                }
            }
        }
    }

    fn worse(&self, x: &[f64]) -> Point<M::Input, M::Output> {
        Point {
            x: x.to_vec(),
            objective: self.worse_value,
            constraints: vec![-self.worse_value; self.constraint_count],
            snapshot: None,
        }
    }
}
