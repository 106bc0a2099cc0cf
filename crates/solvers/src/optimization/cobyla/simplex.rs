use nalgebra::{DMatrix, DVector};

use crate::optimization::evaluator::{Iterate, Point};

/// Smallest determinant of the radius-scaled edge matrix still treated as a
/// usable interpolation set.
const MIN_DETERMINANT: f64 = 1e-10;

/// Vertices farther than this many radii from the best one are stale.
const MAX_EDGE: f64 = 4.0;

/// Linear interpolation of the objective and residuals around the best vertex.
pub(super) struct LinearModel {
    pub(super) gradient: DVector<f64>,

    /// One row per constraint.
    pub(super) jacobian: DMatrix<f64>,
}

/// The best vertex plus `n` other interpolation points.
pub(super) struct Simplex<I, O> {
    pub(super) best: Iterate<I, O>,
    pub(super) others: Vec<Point<I, O>>,
}

impl<I, O> Simplex<I, O> {
    pub(super) fn new(best: Iterate<I, O>) -> Self {
        Self {
            best,
            others: Vec::new(),
        }
    }

    /// Makes `trial` the best vertex, dropping the worst of the others.
    pub(super) fn accept(&mut self, trial: Iterate<I, O>, penalty: f64) {
        let previous = std::mem::replace(&mut self.best, trial);
        match self.worst(penalty) {
            Some(index) => self.others[index] = previous.into(),
            None => self.others.push(previous.into()),
        }
    }

    /// Swaps in any evaluated vertex whose merit beats the best one.
    pub(super) fn promote(&mut self, penalty: f64) {
        let best_merit = self.best.merit(penalty);
        let candidate = self
            .others
            .iter()
            .enumerate()
            .filter(|(_, point)| point.snapshot.is_some())
            .map(|(index, point)| (index, point.merit(penalty)))
            .filter(|(_, merit)| *merit < best_merit)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index);

        if let Some(index) = candidate
            && let Some(iterate) = self.others.swap_remove(index).into_iterate()
        {
            let previous = std::mem::replace(&mut self.best, iterate);
            self.others.push(previous.into());
        }
    }

    /// Fits linear models through all vertices.
    ///
    /// Returns `None` if the simplex is incomplete, stretched, or too flat to
    /// interpolate.
    pub(super) fn linear_model(&self, rho: f64) -> Option<LinearModel> {
        let n = self.best.x.len();
        let m = self.best.constraints.len();
        if self.others.len() != n {
            return None;
        }

        let edges = DMatrix::from_fn(n, n, |r, c| (self.others[r].x[c] - self.best.x[c]) / rho);
        if edges.row_iter().any(|edge| edge.norm() > MAX_EDGE) {
            return None;
        }
        let lu = edges.lu();
        if lu.determinant().abs() < MIN_DETERMINANT {
            return None;
        }

        let df = DVector::from_fn(n, |r, _| self.others[r].objective - self.best.objective);
        let dc = DMatrix::from_fn(n, m, |r, c| {
            self.others[r].constraints[c] - self.best.constraints[c]
        });

        let gradient = lu.solve(&df)? / rho;
        let jacobian = (lu.solve(&dc)? / rho).transpose();

        Some(LinearModel { gradient, jacobian })
    }

    pub(super) fn into_best(self) -> Iterate<I, O> {
        self.best
    }

    fn worst(&self, penalty: f64) -> Option<usize> {
        self.others
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.merit(penalty).total_cmp(&b.1.merit(penalty)))
            .map(|(index, _)| index)
    }
}
