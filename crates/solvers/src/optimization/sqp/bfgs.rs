use nalgebra::{DMatrix, DVector};

/// Powell-damped BFGS update of a Hessian approximation.
///
/// Damping keeps the update positive definite when `sᵀy` is small or
/// negative, which happens routinely for the Lagrangian of a constrained
/// problem. Degenerate steps leave `hessian` unchanged.
pub(super) fn update(hessian: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let bs = &*hessian * s;
    let sbs = s.dot(&bs);
    if sbs <= f64::EPSILON {
        return;
    }

    let sy = s.dot(y);
    let theta = if sy >= 0.2 * sbs {
        1.0
    } else {
        0.8 * sbs / (sbs - sy)
    };
    let r = y * theta + &bs * (1.0 - theta);
    let sr = s.dot(&r);
    if sr <= f64::EPSILON {
        return;
    }

    *hessian += &r * r.transpose() / sr - &bs * bs.transpose() / sbs;
}
