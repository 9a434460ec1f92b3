//! Two-step saturation adjustment
//!
//! Moves humidity and temperature toward mixed-phase saturation with a Newton-type
//! correction. The iteration count is fixed at two; there is no convergence test.

use super::constants::Constants;
use super::saturation::{foedem, foeewm, foeldcpm};

/// One correction step
///
/// # Arguments
///
/// * `qp` - Inverse pressure `1 / ap`
/// * `qsmix` - Specific humidity to adjust
/// * `t` - Temperature to adjust
///
/// # Returns
///
/// Updated `(qsmix, t)`
#[inline]
#[must_use]
pub fn cuadjtq_step(c: &Constants, qp: f64, qsmix: f64, t: f64) -> (f64, f64) {
    let mut qsat = (foeewm(c, t) * qp).min(0.5);
    let cor = 1.0 / (1.0 - c.thermo.retv * qsat);
    qsat *= cor;
    let cond = (qsmix - qsat) / (1.0 + qsat * cor * foedem(c, t));
    (qsmix - cond, t + foeldcpm(c, t) * cond)
}

/// Saturation adjustment at pressure `ap`
///
/// Applies [`cuadjtq_step`] exactly twice.
#[inline]
#[must_use]
pub fn cuadjtq(c: &Constants, ap: f64, qsmix: f64, t: f64) -> (f64, f64) {
    let qp = 1.0 / ap;
    let (qsmix, t) = cuadjtq_step(c, qp, qsmix, t);
    cuadjtq_step(c, qp, qsmix, t)
}
