use dutytune_core::{Bounds, Model, Observer, OptimizationProblem};
use nalgebra::{DMatrix, DVector};

use super::{
    Action, Error, Event, Probe,
    evaluator::{Evaluator, Iterate, Outcome},
};

/// Finite-difference estimates at an iterate.
pub(crate) struct Derivatives {
    pub(crate) gradient: DVector<f64>,

    /// One row per constraint, one column per variable.
    pub(crate) jacobian: DMatrix<f64>,
}

/// Estimates the objective gradient and constraint Jacobian by one-sided
/// differences, stepping backward where a forward step would leave the box.
///
/// Returns `Ok(None)` if the observer stopped the run.
pub(crate) fn forward_differences<M, P, Obs>(
    evaluator: &mut Evaluator<'_, M, P, Obs>,
    base: &Iterate<M::Input, M::Output>,
    bounds: &Bounds,
    fd_step: f64,
) -> Result<Option<Derivatives>, Error>
where
    M: Model,
    P: OptimizationProblem<Input = M::Input, Output = M::Output>,
    Obs: for<'e> Observer<Event<'e, M, P>, Action>,
{
    let n = base.x.len();
    let m = base.constraints.len();
    let mut gradient = DVector::zeros(n);
    let mut jacobian = DMatrix::zeros(m, n);

    for i in 0..n {
        let xi = base.x[i];
        let h = fd_step * xi.abs().max(1.0);
        let (lower, upper) = (bounds.lower()[i], bounds.upper()[i]);

        let mut probe_x = base.x.clone();
        probe_x[i] = if xi + h <= upper {
            xi + h
        } else {
            (xi - h).max(lower)
        };

        // The step actually taken after rounding and clamping.
        let h = probe_x[i] - xi;
        if h == 0.0 {
            continue;
        }

        let point = match evaluator.evaluate(&probe_x, Probe::Gradient)? {
            Outcome::Point(point) => point,
            Outcome::Stop(_) => return Ok(None),
        };

        gradient[i] = (point.objective - base.objective) / h;
        for j in 0..m {
            jacobian[(j, i)] = (point.constraints[j] - base.constraints[j]) / h;
        }
    }

    Ok(Some(Derivatives { gradient, jacobian }))
}
