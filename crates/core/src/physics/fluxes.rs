//! Vertical accumulation of interface fluxes
//!
//! Interface `k + 1` is interface `k` plus the contribution of level `k`. Interface 0
//! (model top) is zero. The same step serves the fused sweep, which feeds it straight
//! from the level outcome, and the split flux stage, which reads stored intermediates.

use super::constants::Constants;
use super::species::PerSpecies;
use super::species::Species::{Ice, Liquid, Rain, Snow};
use crate::core_types::FluxColumn;

/// Level-`k` quantities needed to advance the fluxes by one interface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FluxInputs {
    pub foealfa: f64,
    pub lneg: PerSpecies<f64>,
    pub lude: f64,
    pub pfpls: PerSpecies<f64>,
    pub qx0: PerSpecies<f64>,
    pub qxn: PerSpecies<f64>,
    /// Turbulent liquid flux divergence
    pub vfl: f64,
    /// Turbulent ice flux divergence
    pub vfi: f64,
}

/// Interface flux integrator for one timestep
#[derive(Debug, Clone, Copy)]
pub struct FluxAccumulator<'c> {
    c: &'c Constants,
    dt: f64,
}

impl<'c> FluxAccumulator<'c> {
    #[must_use]
    pub fn new(c: &'c Constants, dt: f64) -> Self {
        Self { c, dt }
    }

    /// Zero the top interface
    pub fn start(&self, out: &mut FluxColumn<'_>) {
        for flux in out.all_mut() {
            flux[0] = 0.0;
        }
    }

    /// Write interface `k + 1` from interface `k` and level `k`
    ///
    /// `fsqrf` and `fsqsf` carry their own running sums of rain and snow change. They
    /// are not seeded from the liquid and ice fluxes at the same interface.
    ///
    /// # Arguments
    ///
    /// * `k` - Full level index
    /// * `aph` - Interface pressures of the column
    /// * `level` - Level-`k` quantities
    /// * `out` - Column fluxes; interface `k` must already be set
    pub fn step(&self, k: usize, aph: &[f64], level: &FluxInputs, out: &mut FluxColumn<'_>) {
        let th = &self.c.thermo;
        let dt = self.dt;
        let n = k + 1;
        let gdph_r = -(aph[k + 1] - aph[k]) / th.rg / dt;
        let alfaw = level.foealfa;
        let (qxn, qx0, lneg) = (&level.qxn, &level.qx0, &level.lneg);

        // Liquid, large-scale minus detrainment
        out.fsqlf[n] = out.fsqlf[k]
            + (qxn[Liquid] - qx0[Liquid] + level.vfl * dt - alfaw * level.lude) * gdph_r;
        out.fcqlng[n] = out.fcqlng[k] + lneg[Liquid] * gdph_r;
        out.fsqltur[n] = out.fsqltur[k] + level.vfl * dt * gdph_r;

        // Rain from its own sum, not from fsqlf
        out.fsqrf[n] = out.fsqrf[k] + (qxn[Rain] - qx0[Rain]) * gdph_r;
        out.fcqrng[n] = out.fcqrng[k] + lneg[Rain] * gdph_r;

        // Ice, large-scale minus detrainment
        out.fsqif[n] = out.fsqif[k]
            + (qxn[Ice] - qx0[Ice] + level.vfi * dt - (1.0 - alfaw) * level.lude) * gdph_r;
        out.fcqnng[n] = out.fcqnng[k] + lneg[Ice] * gdph_r;
        out.fsqitur[n] = out.fsqitur[k] + level.vfi * dt * gdph_r;

        out.fsqsf[n] = out.fsqsf[k] + (qxn[Snow] - qx0[Snow]) * gdph_r;
        out.fcqsng[n] = out.fcqsng[k] + lneg[Snow] * gdph_r;

        // Precipitation and its enthalpy
        out.fplsl[n] = level.pfpls[Rain] + level.pfpls[Liquid];
        out.fplsn[n] = level.pfpls[Snow] + level.pfpls[Ice];
        out.fhpsl[n] = -th.rlvtt * out.fplsl[n];
        out.fhpsn[n] = -th.rlstt * out.fplsn[n];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::DiagnosticBundle;
    use crate::grid::ComputationalGrid;
    use crate::physics::constants::{LiteralSet, ParameterGroups};
    use approx::assert_relative_eq;

    #[test]
    fn test_fluxes_accumulate_downward() {
        let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(2))
            .unwrap();
        let dt = 100.0;
        let grid = ComputationalGrid::new(1, 1, 2).unwrap();
        let mut diag = DiagnosticBundle::zeros(&grid);
        let mut columns = diag.columns_mut();
        let (_, fluxes) = &mut columns[0];
        fluxes.fsqlf[0] = 7.0;

        let aph = [0.0, c.thermo.rg * dt, 3.0 * c.thermo.rg * dt];
        let mut level = FluxInputs::default();
        level.qx0[Liquid] = 1.0;
        level.qxn[Liquid] = 0.5;
        level.pfpls[Rain] = 2.0;
        level.pfpls[Snow] = 1.0;
        level.lneg[Snow] = 0.25;

        let acc = FluxAccumulator::new(&c, dt);
        acc.start(fluxes);
        acc.step(0, &aph, &level, fluxes);
        acc.step(1, &aph, &level, fluxes);

        assert_eq!(fluxes.fsqlf[0], 0.0);
        // gdph_r is -1 on level 0 and -2 on level 1
        assert_relative_eq!(fluxes.fsqlf[1], 0.5, max_relative = 1e-12);
        assert_relative_eq!(fluxes.fsqlf[2], 1.5, max_relative = 1e-12);
        assert_relative_eq!(fluxes.fcqsng[2], -0.75, max_relative = 1e-12);
        assert_eq!(fluxes.fplsl[2], 2.0);
        assert_eq!(fluxes.fplsn[2], 1.0);
        assert_relative_eq!(fluxes.fhpsl[2], -2.0 * c.thermo.rlvtt);
        assert_relative_eq!(fluxes.fhpsn[2], -c.thermo.rlstt);
    }

    #[test]
    fn test_rain_and_snow_sums_ignore_cloud_condensate() {
        let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(1))
            .unwrap();
        let dt = 100.0;
        let grid = ComputationalGrid::new(1, 1, 1).unwrap();
        let mut diag = DiagnosticBundle::zeros(&grid);
        let mut columns = diag.columns_mut();
        let (_, fluxes) = &mut columns[0];

        let aph = [0.0, c.thermo.rg * dt];
        let mut level = FluxInputs::default();
        level.qx0[Liquid] = 1.0;
        level.qx0[Ice] = 2.0;
        level.qxn[Rain] = 0.25;

        let acc = FluxAccumulator::new(&c, dt);
        acc.start(fluxes);
        acc.step(0, &aph, &level, fluxes);

        assert_relative_eq!(fluxes.fsqlf[1], 1.0, max_relative = 1e-12);
        assert_relative_eq!(fluxes.fsqif[1], 2.0, max_relative = 1e-12);
        assert_relative_eq!(fluxes.fsqrf[1], -0.25, max_relative = 1e-12);
        assert_eq!(fluxes.fsqsf[1], 0.0);
    }
}
