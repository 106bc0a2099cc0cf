use std::collections::VecDeque;

use nalgebra::DVector;

/// Recent `(s, y)` correction pairs for the two-loop recursion.
pub(super) struct Memory {
    pairs: VecDeque<(DVector<f64>, DVector<f64>)>,
    capacity: usize,
}

impl Memory {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            pairs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(super) fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Stores a pair unless its curvature `sᵀy` is not safely positive.
    pub(super) fn push(&mut self, s: DVector<f64>, y: DVector<f64>) {
        if s.dot(&y) <= f64::EPSILON * y.dot(&y) {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((s, y));
    }

    /// Returns the quasi-Newton direction `-H g`, restricted to free variables.
    pub(super) fn direction(&self, gradient: &DVector<f64>, free: &[bool]) -> DVector<f64> {
        let mut q = masked(gradient, free);
        let mut alphas = Vec::with_capacity(self.pairs.len());

        for (s, y) in self.pairs.iter().rev() {
            let alpha = s.dot(&q) / y.dot(s);
            q -= y * alpha;
            alphas.push(alpha);
        }

        let gamma = self
            .pairs
            .back()
            .map_or(1.0, |(s, y)| s.dot(y) / y.dot(y));
        let mut r = q * gamma;

        for ((s, y), alpha) in self.pairs.iter().zip(alphas.into_iter().rev()) {
            let beta = y.dot(&r) / y.dot(s);
            r += s * (alpha - beta);
        }

        -masked(&r, free)
    }
}

/// Zeros the components of `v` that are not free.
pub(super) fn masked(v: &DVector<f64>, free: &[bool]) -> DVector<f64> {
    DVector::from_iterator(
        v.len(),
        v.iter()
            .zip(free)
            .map(|(&value, &is_free)| if is_free { value } else { 0.0 }),
    )
}
