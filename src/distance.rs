//! Per-step scoring kernels used by the classifier.
//!
//! A window is scored one step at a time. Each step predicts where the
//! trajectory should move next from the behaviour of nearby model points and
//! compares that prediction with where the trajectory actually went.

pub use crate::math::kdtree::squared_distance;

/// Predicted next point: `point + (mean_next - mean)`.
///
/// The displacement observed among the neighbours is applied to the query
/// point itself.
pub fn expected_next(point: &[f64], mean: &[f64], mean_next: &[f64], out: &mut [f64]) {
    for (((o, &p), &m), &mn) in out.iter_mut().zip(point).zip(mean).zip(mean_next) {
        *o = p + (mn - m);
    }
}

/// Directional agreement between the observed and predicted step.
///
/// With `origin` shifted to zero, returns
/// `dot(observed - origin, expected - origin) / max(|observed - origin|², |expected - origin|²)`,
/// or `0.0` when both steps have zero length. Identical steps score `1.0`,
/// opposite steps `-1.0`, and a step half as long in the same direction `0.5`.
#[must_use]
pub fn directional_agreement(origin: &[f64], observed: &[f64], expected: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut len_observed = 0.0;
    let mut len_expected = 0.0;
    for ((&o, &a), &b) in origin.iter().zip(observed).zip(expected) {
        let da = a - o;
        let db = b - o;
        dot += da * db;
        len_observed += da * da;
        len_expected += db * db;
    }
    let denom = f64::max(len_observed, len_expected);
    if denom > 0.0 {
        dot / denom
    } else {
        0.0
    }
}

/// Position of the projection of `point` onto the line through `a` and `b`.
///
/// `0.0` at `a`, `1.0` at `b`; values outside `[0, 1]` fall beyond the
/// segment. A degenerate segment (`a == b`) yields `0.0`.
#[must_use]
pub fn interpolation_coefficient(point: &[f64], a: &[f64], b: &[f64]) -> f64 {
    let mut num = 0.0;
    let mut denom = 0.0;
    for ((&q, &x), &y) in point.iter().zip(a).zip(b) {
        num += (q - x) * (y - x);
        denom += (y - x) * (y - x);
    }
    if denom > 0.0 {
        num / denom
    } else {
        0.0
    }
}

/// Write `(1 - c) * a + c * b` into `out`.
pub fn lerp_into(a: &[f64], b: &[f64], c: f64, out: &mut [f64]) {
    for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
        *o = (1.0 - c) * x + c * y;
    }
}
