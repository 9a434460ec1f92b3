//! Saturation vapour pressure and phase partition functions
//!
//! Tetens-type saturation formulas over water and ice blended by a quadratic
//! liquid-fraction weight between `RTICE` and `RTWAT`. Every function is pure and
//! elementwise. The expression trees are kept as written (including the double
//! evaluation of [`foealfa`] inside the mixed-phase formulas) because downstream
//! tolerance checks are sensitive to the rounding pattern.
//!
//! Poles at `t == R4LES` and `t == R4IES` are not guarded.
//!
//! # References
//!
//! - Simmons et al. (1999), ECMWF Tech. Memo. 274, saturation formulas
//! - Koop et al. (2000), Nature 406, homogeneous freezing threshold

use super::constants::Constants;

/// 1 above the triple point, 0 otherwise
#[inline]
#[must_use]
pub fn foedelta(c: &Constants, t: f64) -> f64 {
    if t > c.thermo.rtt {
        1.0
    } else {
        0.0
    }
}

/// Liquid fraction of mixed-phase condensate
///
/// # Returns
///
/// Weight in `[0, 1]`, 0 below `RTICE`, 1 above `RTWAT`
#[inline]
#[must_use]
pub fn foealfa(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    1.0_f64.min(((th.rtice.max(th.rtwat.min(t)) - th.rtice) * th.rtwat_rtice_r).powi(2))
}

/// Mixed-phase saturation vapour pressure (Pa scaled by `RD/RV`)
#[inline]
#[must_use]
pub fn foeewm(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    th.r2es
        * (foealfa(c, t) * (th.r3les * (t - th.rtt) / (t - th.r4les)).exp()
            + (1.0 - foealfa(c, t)) * (th.r3ies * (t - th.rtt) / (t - th.r4ies)).exp())
}

/// Mixed-phase derivative factor `d ln(es)/dT * L/cp`
#[inline]
#[must_use]
pub fn foedem(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    foealfa(c, t) * th.r5alvcp * (1.0 / (t - th.r4les).powi(2))
        + (1.0 - foealfa(c, t)) * th.r5alscp * (1.0 / (t - th.r4ies).powi(2))
}

/// Mixed-phase latent heat over heat capacity
#[inline]
#[must_use]
pub fn foeldcpm(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    foealfa(c, t) * th.ralvdcp + (1.0 - foealfa(c, t)) * th.ralsdcp
}

/// Saturation vapour pressure over liquid water
#[inline]
#[must_use]
pub fn foeeliq(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    th.r2es * (th.r3les * (t - th.rtt) / (t - th.r4les)).exp()
}

/// Saturation vapour pressure over ice
#[inline]
#[must_use]
pub fn foeeice(c: &Constants, t: f64) -> f64 {
    let th = &c.thermo;
    th.r2es * (th.r3ies * (t - th.rtt) / (t - th.r4ies)).exp()
}

/// Homogeneous freezing supersaturation threshold relative to ice
#[inline]
#[must_use]
pub fn fokoop(c: &Constants, t: f64) -> f64 {
    (c.thermo.rkoop1 - c.thermo.rkoop2 * t).min(foeeliq(c, t) / foeeice(c, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::constants::{LiteralSet, ParameterGroups};
    use approx::assert_relative_eq;

    fn constants() -> Constants {
        Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(1)).unwrap()
    }

    #[test]
    fn test_foedelta_is_step_at_triple_point() {
        let c = constants();
        assert_eq!(foedelta(&c, c.thermo.rtt), 0.0);
        assert_eq!(foedelta(&c, c.thermo.rtt + 1e-9), 1.0);
        assert_eq!(foedelta(&c, 200.0), 0.0);
    }

    #[test]
    fn test_foealfa_limits() {
        let c = constants();
        assert_eq!(foealfa(&c, c.thermo.rtice - 10.0), 0.0);
        assert_eq!(foealfa(&c, c.thermo.rtwat + 10.0), 1.0);
        let mid = 0.5 * (c.thermo.rtice + c.thermo.rtwat);
        assert_relative_eq!(foealfa(&c, mid), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_mixed_phase_matches_pure_phases_at_limits() {
        let c = constants();
        let warm = 290.0;
        let cold = 220.0;
        assert_relative_eq!(foeewm(&c, warm), foeeliq(&c, warm), max_relative = 1e-14);
        assert_relative_eq!(foeewm(&c, cold), foeeice(&c, cold), max_relative = 1e-14);
        assert_relative_eq!(foeldcpm(&c, warm), c.thermo.ralvdcp);
        assert_relative_eq!(foeldcpm(&c, cold), c.thermo.ralsdcp);
    }

    #[test]
    fn test_saturation_pressures_equal_at_triple_point() {
        let c = constants();
        let t = c.thermo.rtt;
        assert_relative_eq!(foeeliq(&c, t), c.thermo.r2es);
        assert_relative_eq!(foeeice(&c, t), c.thermo.r2es);
        assert!(foeeliq(&c, 250.0) > foeeice(&c, 250.0));
    }

    #[test]
    fn test_fokoop_is_bounded_by_water_saturation() {
        let c = constants();
        for t in [200.0, 220.0, 235.0, 250.0, 265.0] {
            let koop = fokoop(&c, t);
            assert!(koop <= foeeliq(&c, t) / foeeice(&c, t) + 1e-15);
            assert!(koop >= 1.0);
        }
    }

    #[test]
    fn test_foedem_positive() {
        let c = constants();
        for t in [200.0, 250.0, 273.0, 300.0] {
            assert!(foedem(&c, t) > 0.0);
        }
    }
}
