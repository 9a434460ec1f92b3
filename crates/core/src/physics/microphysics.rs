//! Per-level cloud and precipitation process physics
//!
//! A column is swept top to bottom. Each level builds a [`LevelBudget`] of explicit
//! transfers and implicit rates between the five moisture species, solves it with
//! [`solve_species`], and derives the level's tendencies. Values that the next level
//! needs travel in [`LevelCarry`]; scalars that persist over the whole sweep (precipitation
//! cover, cloud-top distance, tropopause) live in [`ColumnTemporaries`].
//!
//! Processes, in evaluation order:
//!
//! 1. Tidy of negligible condensate and cover
//! 2. Ice supersaturation (Koop limit) and external supersaturation source
//! 3. Convective detrainment and subsidence
//! 4. Cloud-edge erosion
//! 5. Large-scale condensation and evaporation driven by vertical motion and radiation
//! 6. Ice deposition
//! 7. Sedimentation and precipitation overlap
//! 8. Autoconversion (ice to snow, liquid to rain)
//! 9. Melting and freezing
//! 10. Evaporation of rain and snow
//!
//! # References
//!
//! - Tiedtke (1993), MWR 121, prognostic cloud scheme
//! - Forbes & Tompkins (2011), ECMWF Newsletter 129, multi-species microphysics
//! - Abel & Boutle (2012), QJRMS 138, rain evaporation over the size spectrum

use super::adjustment::cuadjtq;
use super::constants::{
    Constants, EvaporationScheme, SupersaturationScheme, WarmRainScheme,
};
use super::implicit::{solve_species, SpeciesMatrix, SpeciesVector};
use super::saturation::{foealfa, foedelta, foedem, foeeice, foeeliq, foeewm, foeldcpm, fokoop};
use super::species::Species::{Ice, Liquid, Rain, Snow, Vapour};
use super::species::{PerSpecies, Phase, Species};
use crate::core_types::StateColumn;

/// Initial tropopause sigma before the column scan
pub const DEFAULT_TROPOPAUSE_SIGMA: f64 = 0.1;

/// Column scalars carried through one vertical sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnTemporaries {
    /// Surface pressure
    pub aph_s: f64,
    /// Distance below the last cloud top (m)
    pub cldtopdist: f64,
    /// Maximum precipitation cover above the current level
    pub covpmax: f64,
    /// Total precipitation cover
    pub covptot: f64,
    /// Inverse surface pressure
    pub paphd: f64,
    /// Tropopause sigma
    pub trpaus: f64,
    /// Rain at the top of the refreezing layer was mostly liquid
    pub rainliq: bool,
}

impl Default for ColumnTemporaries {
    fn default() -> Self {
        Self {
            aph_s: 0.0,
            cldtopdist: 0.0,
            covpmax: 0.0,
            covptot: 0.0,
            paphd: 0.0,
            trpaus: DEFAULT_TROPOPAUSE_SIGMA,
            rainliq: true,
        }
    }
}

impl ColumnTemporaries {
    /// Reset for a new column and locate its tropopause
    ///
    /// The tropopause is the lowest level with `0.1 < sigma < 0.4` whose effective
    /// temperature exceeds the one below it.
    pub fn begin_column(&mut self, col: &StateColumn<'_>, dt: f64) {
        *self = Self::default();
        let nz = col.t.len();
        self.aph_s = col.aph[nz];
        self.paphd = 1.0 / self.aph_s;
        for k in 0..nz.saturating_sub(1) {
            let sig = col.ap[k] * self.paphd;
            let tp1 = col.t[k] + dt * col.tnd_tmp_t[k];
            let tp1_below = col.t[k + 1] + dt * col.tnd_tmp_t[k + 1];
            if sig > 0.1 && sig < 0.4 && tp1 > tp1_below {
                self.trpaus = sig;
            }
        }
    }
}

/// Level-above values needed by the next level of the sweep
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelCarry {
    /// Clamped cloud fraction
    pub a: f64,
    /// Updated cloud fraction
    pub anew: f64,
    /// Effective temperature
    pub t: f64,
    /// Full-level pressure
    pub ap: f64,
    /// Solved species mixing ratios
    pub qxn: PerSpecies<f64>,
    /// Sedimentation flux through the level base
    pub pfpls: PerSpecies<f64>,
}

/// Local tendencies of one level
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelTendencies {
    pub a: f64,
    pub t: f64,
    pub q: PerSpecies<f64>,
}

/// Everything a level produces for the sinks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelOutcome {
    /// Liquid fraction weight at the effective temperature
    pub foealfa: f64,
    /// Mass cleared by the tidy step per species
    pub lneg: PerSpecies<f64>,
    /// Detrained condensate actually used (0 if not applied)
    pub lude: f64,
    /// Sedimentation flux through the level base
    pub pfpls: PerSpecies<f64>,
    /// Effective species before tidy
    pub qx0: PerSpecies<f64>,
    /// Solved species
    pub qxn: PerSpecies<f64>,
    /// Precipitation cover after the level
    pub covptot: f64,
    /// Rain fraction, set only at the top of a refreezing layer
    pub rainfrac_toprfz: Option<f64>,
    pub tendencies: LevelTendencies,
}

/// Explicit and implicit species budget of one level
#[derive(Debug, Clone)]
pub struct LevelBudget<'c> {
    c: &'c Constants,
    solqa: SpeciesMatrix,
    solqb: SpeciesMatrix,
    /// Implicit sedimentation rate per species
    pub fallsink: PerSpecies<f64>,
    /// Mass arriving from the level above
    pub fallsrce: PerSpecies<f64>,
    /// Convective detrainment and subsidence source
    pub convsrce: PerSpecies<f64>,
    /// Implicit subsidence sink
    pub convsink: PerSpecies<f64>,
    /// External supersaturation source
    pub psupsatsrce: PerSpecies<f64>,
    /// First guess of the species after the processes seen so far
    pub qxfg: PerSpecies<f64>,
    /// Explicit cloud-fraction source
    pub solac: f64,
    /// Implicit cloud-fraction sink
    pub solab: f64,
}

impl<'c> LevelBudget<'c> {
    /// Empty budget with the first guess set to `qx`
    #[must_use]
    pub fn new(c: &'c Constants, qx: PerSpecies<f64>) -> Self {
        Self {
            c,
            solqa: SpeciesMatrix::zeros(),
            solqb: SpeciesMatrix::zeros(),
            fallsink: PerSpecies::default(),
            fallsrce: PerSpecies::default(),
            convsrce: PerSpecies::default(),
            convsink: PerSpecies::default(),
            psupsatsrce: PerSpecies::default(),
            qxfg: qx,
            solac: 0.0,
            solab: 0.0,
        }
    }

    #[inline]
    fn cell(&self, to: Species, from: Species) -> (usize, usize) {
        (self.c.species.slot(to), self.c.species.slot(from))
    }

    /// Explicit transfer of `amount` from `from` to `to`
    #[inline]
    pub fn transfer(&mut self, to: Species, from: Species, amount: f64) {
        let (i, j) = self.cell(to, from);
        self.solqa[(i, j)] += amount;
        self.solqa[(j, i)] -= amount;
    }

    /// Explicit external source of `species`
    #[inline]
    pub fn source(&mut self, species: Species, amount: f64) {
        let (i, _) = self.cell(species, species);
        self.solqa[(i, i)] += amount;
    }

    /// Implicit conversion rate from `from` into `to` (a self rate is a pure sink)
    #[inline]
    pub fn implicit(&mut self, to: Species, from: Species, rate: f64) {
        let (i, j) = self.cell(to, from);
        self.solqb[(i, j)] += rate;
    }

    /// Explicit entry `(to, from)`
    #[must_use]
    pub fn explicit_entry(&self, to: Species, from: Species) -> f64 {
        let (i, j) = self.cell(to, from);
        self.solqa[(i, j)]
    }

    fn to_slots(&self, values: &PerSpecies<f64>) -> SpeciesVector {
        SpeciesVector::from_fn(|slot, _| values[self.c.species.species_at(slot)])
    }

    /// Solve the implicit system for the level's new species
    #[must_use]
    pub fn solve(&self, qx: &PerSpecies<f64>) -> PerSpecies<f64> {
        let qxn = solve_species(
            self.solqa,
            &self.solqb,
            &self.to_slots(&self.fallsink),
            &self.to_slots(qx),
            self.c.species.slot(Vapour),
            self.c.epsec,
        );
        let mut out = PerSpecies::default();
        for slot in 0..qxn.len() {
            out[self.c.species.species_at(slot)] = qxn[slot];
        }
        out
    }
}

/// Move species `s` entirely to vapour, charging latent heat to the tendencies
fn clear_to_vapour(
    c: &Constants,
    s: Species,
    qx: &mut PerSpecies<f64>,
    lneg: &mut PerSpecies<f64>,
    tnd: &mut LevelTendencies,
    qtmst: f64,
) {
    lneg[s] += qx[s];
    let qadj = qx[s] * qtmst;
    tnd.q[Vapour] += qadj;
    tnd.t -= c.latent_heat_factor(s) * qadj;
    qx[Vapour] += qx[s];
    qx[s] = 0.0;
}

/// Saturation state at the level's effective temperature
#[derive(Debug, Clone, Copy)]
struct Saturation {
    alfa: f64,
    foeewmt: f64,
    qsmix: f64,
    foeew: f64,
    qsice: f64,
    foeeliqt: f64,
    qsliq: f64,
}

impl Saturation {
    fn new(c: &Constants, t: f64, ap: f64) -> Self {
        let retv = c.thermo.retv;
        let foeewmt = (foeewm(c, t) / ap).min(0.5);
        let qsmix = foeewmt / (1.0 - retv * foeewmt);
        let delta = foedelta(c, t);
        let foeew = ((delta * foeeliq(c, t) + (1.0 - delta) * foeeice(c, t)) / ap).min(0.5);
        let qsice = foeew / (1.0 - retv * foeew);
        let foeeliqt = (foeeliq(c, t) / ap).min(0.5);
        let qsliq = foeeliqt / (1.0 - retv * foeeliqt);
        Self {
            alfa: foealfa(c, t),
            foeewmt,
            qsmix,
            foeew,
            qsice,
            foeeliqt,
            qsliq,
        }
    }
}

/// Evaluate one level of the column sweep
///
/// # Arguments
///
/// * `c` - Resolved constants
/// * `col` - Read-only column state
/// * `k` - Level index, 0 at the model top
/// * `dt` - Timestep (s)
/// * `tmp` - Column scalars, updated in place
/// * `above` - Level-above carry; replaced by this level's values on return
///
/// # Returns
///
/// Tendencies and flux-stage intermediates of level `k`
#[must_use]
pub fn level_step(
    c: &Constants,
    col: &StateColumn<'_>,
    k: usize,
    dt: f64,
    tmp: &mut ColumnTemporaries,
    above: &mut LevelCarry,
) -> LevelOutcome {
    let th = &c.thermo;
    let cp = &c.cloud;
    let sp = &c.species;
    let nz = col.t.len();
    let has_above = k > 0;
    let has_below = k + 1 < nz;
    let qtmst = 1.0 / dt;

    // Effective state
    let q_in = PerSpecies([col.ql[k], col.qi[k], col.qr[k], col.qs[k], col.qv[k]]);
    let tnd_in = PerSpecies([
        col.tnd_tmp_ql[k],
        col.tnd_tmp_qi[k],
        col.tnd_tmp_qr[k],
        col.tnd_tmp_qs[k],
        col.tnd_tmp_qv[k],
    ]);
    let mut qx = PerSpecies::default();
    for s in Species::ALL {
        qx[s] = q_in[s] + dt * tnd_in[s];
    }
    let qx0 = qx;
    let tp1 = col.t[k] + dt * col.tnd_tmp_t[k];
    let aorig = col.a[k] + dt * col.tnd_tmp_a[k];
    let mut a = 0.0_f64.max(1.0_f64.min(aorig));
    let ap = col.ap[k];

    let mut tnd = LevelTendencies::default();
    let mut lneg = PerSpecies::default();

    // Tidy
    if qx[Liquid] + qx[Ice] < cp.rlmin || a < cp.ramin {
        clear_to_vapour(c, Liquid, &mut qx, &mut lneg, &mut tnd, qtmst);
        clear_to_vapour(c, Ice, &mut qx, &mut lneg, &mut tnd, qtmst);
        a = 0.0;
    }
    for slot in 0..Species::ALL.len() {
        let s = sp.species_at(slot);
        if s != Vapour && qx[s] < cp.rlmin {
            clear_to_vapour(c, s, &mut qx, &mut lneg, &mut tnd, qtmst);
        }
    }

    // Saturation
    let sat = Saturation::new(c, tp1, ap);
    let li = qx[Liquid] + qx[Ice];
    let (liqfrac, icefrac) = if li > cp.rlmin {
        let liqfrac = qx[Liquid] / li;
        (liqfrac, 1.0 - liqfrac)
    } else {
        (0.0, 0.0)
    };

    // Layer geometry
    let dp = col.aph[k + 1] - col.aph[k];
    let gdp = th.rg / dp;
    let rho = ap / (th.rd * tp1);
    let dtgdp = dt * gdp;
    let rdtgdp = dp * (1.0 / (dt * th.rg));

    // dqs/dT correction factors
    let facw = th.r5les / (tp1 - th.r4les).powi(2);
    let cor = 1.0 / (1.0 - th.retv * sat.foeeliqt);
    let dqsliqdt = facw * cor * sat.qsliq;
    let corqsliq = 1.0 + th.ralvdcp * dqsliqdt;

    let faci_t = th.r5ies / (tp1 - th.r4ies).powi(2);
    let cor = 1.0 / (1.0 - th.retv * sat.foeew);
    let dqsicedt = faci_t * cor * sat.qsice;
    let corqsice = 1.0 + th.ralsdcp * dqsicedt;

    let fac = sat.alfa * facw + (1.0 - sat.alfa) * faci_t;
    let cor = 1.0 / (1.0 - th.retv * sat.foeewmt);
    let dqsmixdt = fac * cor * sat.qsmix;
    let corqsmix = 1.0 + foeldcpm(c, tp1) * dqsmixdt;

    let evaplimmix = ((sat.qsmix - qx[Vapour]) / corqsmix).max(0.0);

    // In-cloud condensate
    let tmpa = 1.0 / a.max(c.epsec);
    let liqcld = qx[Liquid] * tmpa;
    let icecld = qx[Ice] * tmpa;
    let licld = liqcld + icecld;

    let mut budget = LevelBudget::new(c, qx);

    // Ice supersaturation
    let above_tropopause = ap * tmp.paphd < tmp.trpaus;
    let koop_active =
        tp1 < th.rtt && cp.supersaturation != SupersaturationScheme::None && !above_tropopause;
    let fokoop_t = fokoop(c, tp1);
    let (fac, faci) = if koop_active {
        (a + fokoop_t * (1.0 - a), dt / cp.rkooptau)
    } else {
        (1.0, 1.0)
    };

    let supsat = if a > 1.0 - cp.ramin {
        ((qx[Vapour] - fac * sat.qsice) / corqsice).max(0.0)
    } else {
        let qp1env = (qx[Vapour] - a * sat.qsice) / (1.0 - a).max(c.epsilon);
        ((1.0 - a) * (qp1env - fac * sat.qsice) / corqsice).max(0.0)
    };
    let condensate = if tp1 > cp.rthomo { Liquid } else { Ice };
    if supsat > c.epsec {
        budget.transfer(condensate, Vapour, supsat);
        budget.qxfg[condensate] += supsat;
        budget.solac = (1.0 - a) * faci;
    }
    let ext_supsat = col.supsat[k];
    if ext_supsat > c.epsec {
        budget.source(condensate, ext_supsat);
        budget.psupsatsrce[condensate] = ext_supsat;
        budget.qxfg[condensate] += ext_supsat;
        budget.solac = (1.0 - a) * faci;
    }

    // Convective detrainment
    let mut lude = 0.0;
    if has_below {
        lude = col.lude[k] * dtgdp;
        if col.convection_on && lude > cp.rlmin && col.lu[k + 1] > c.epsec {
            let (liquid, ice) = (sat.alfa * lude, (1.0 - sat.alfa) * lude);
            budget.solac += lude / col.lu[k + 1];
            budget.convsrce[Liquid] = liquid;
            budget.convsrce[Ice] = ice;
            budget.source(Liquid, liquid);
            budget.source(Ice, ice);
        } else {
            lude = 0.0;
        }
        if col.convection_on {
            budget.source(Snow, col.snde[k] * dtgdp);
        }
    }

    // Subsidence source from the level above and evaporation on arrival
    if has_above {
        let mf = ((col.mfu[k] + col.mfd[k]) * dtgdp).max(0.0);
        let mut acust = mf * above.anew;
        let dtdp = c.rdcp * 0.5 * (above.t + tp1) / col.aph[k];
        let dtforc = dtdp * (ap - above.ap);
        let dqs = above.anew * dtforc * dqsmixdt;
        let mut lfinalsum = 0.0;
        for s in Species::ALL {
            if sp.fall[s] || sp.phase[s] == Phase::Vapour {
                continue;
            }
            let lcust = mf * above.qxn[s];
            budget.convsrce[s] += lcust;
            let lfinal = (lcust - dqs).max(0.0);
            let evap = (lcust - lfinal).min(evaplimmix);
            lfinalsum += lcust - evap;
            budget.source(s, lcust);
            budget.transfer(Vapour, s, evap);
        }
        if lfinalsum < c.epsec {
            acust = 0.0;
        }
        budget.solac += acust;
    }

    // Subsidence sink to the level below
    if has_below {
        let mfdn = ((col.mfu[k + 1] + col.mfd[k + 1]) * dtgdp).max(0.0);
        budget.solab += mfdn;
        budget.implicit(Liquid, Liquid, mfdn);
        budget.implicit(Ice, Ice, mfdn);
        budget.convsink[Liquid] = mfdn;
        budget.convsink[Ice] = mfdn;
    }

    // Erosion of cloud edges
    let mut ldifdt = cp.rcldiff * dt;
    if col.convection_type > 0 && lude > c.epsec {
        ldifdt *= cp.rcldiff_convi;
    }
    if li > c.epsec {
        let e = ldifdt * (sat.qsmix - qx[Vapour]).max(0.0);
        let leros = (a * e).min(evaplimmix).min(li);
        let aeros = leros / licld;
        budget.solac -= aeros;
        budget.transfer(Vapour, Liquid, liqfrac * leros);
        budget.transfer(Vapour, Ice, icefrac * leros);
    }

    // Condensation and evaporation from large-scale forcing
    let dtdp = c.rdcp * tp1 / ap;
    let dpmxdt = dp * qtmst;
    let mfdn = if has_below {
        col.mfu[k + 1] + col.mfd[k + 1]
    } else {
        0.0
    };
    let wtot = (col.w[k] + 0.5 * th.rg * (col.mfu[k] + col.mfd[k] + mfdn))
        .max(-dpmxdt)
        .min(dpmxdt);
    let zzzdt = col.hrsw[k] + col.hrlw[k];
    let dtdiab = zzzdt.max(-dpmxdt * dtdp).min(dpmxdt * dtdp) * dt;
    let dtforc = dtdp * wtot * dt + dtdiab;
    let t_forced = (tp1 + dtforc).max(160.0);
    let (qsmix_adjusted, _) = cuadjtq(c, ap, sat.qsmix, t_forced);
    let dqs = qsmix_adjusted - sat.qsmix;

    if dqs > 0.0 {
        let levap = (a * dqs.min(licld))
            .min(evaplimmix)
            .min((sat.qsmix - qx[Vapour]).max(0.0));
        budget.transfer(Vapour, Liquid, liqfrac * levap);
        budget.transfer(Vapour, Ice, icefrac * levap);
    }

    // Growth of existing cloud
    if a > c.epsec && dqs <= -cp.rlmin {
        let cdmax = if a > 0.99 {
            let cor = 1.0 / (1.0 - th.retv * sat.qsmix);
            (qx[Vapour] - sat.qsmix) / (1.0 + cor * sat.qsmix * foedem(c, tp1))
        } else {
            (qx[Vapour] - a * sat.qsmix) / a
        };
        let mut lcond1 = a * (-dqs).max(0.0).min(cdmax).max(0.0);
        if lcond1 < cp.rlmin {
            lcond1 = 0.0;
        }
        budget.transfer(condensate, Vapour, lcond1);
        budget.qxfg[condensate] += lcond1;
    }

    // Formation of new cloud
    if dqs <= -cp.rlmin && a < 1.0 - c.epsec {
        let sigk = ap * tmp.paphd;
        let rhc = if sigk > 0.8 {
            cp.ramid + (1.0 - cp.ramid) * ((sigk - 0.8) / 0.2).powi(2)
        } else {
            cp.ramid
        };
        let qe = match cp.supersaturation {
            SupersaturationScheme::None | SupersaturationScheme::Tompkins => {
                ((qx[Vapour] - a * sat.qsice) / c.epsec.max(1.0 - a)).max(0.0)
            }
            SupersaturationScheme::LohmannKarcher => qx[Vapour],
            SupersaturationScheme::Gierens => qx[Vapour] + li,
        };
        let fac = if koop_active { fokoop_t } else { 1.0 };
        if qe >= rhc * sat.qsice * fac && qe < sat.qsice * fac {
            let mut acond =
                -(1.0 - a) * fac * dqs / (2.0 * (fac * sat.qsice - qe)).max(c.epsec);
            acond = acond.min(1.0 - a);
            let mut lcond2 = -fac * dqs * 0.5 * acond;
            let zdl = 2.0 * (fac * sat.qsice - qe) / c.epsec.max(1.0 - a);
            if fac * dqs < -zdl {
                let lcondlim = (a - 1.0) * fac * dqs - fac * sat.qsice + qx[Vapour];
                lcond2 = lcond2.min(lcondlim);
            }
            lcond2 = lcond2.max(0.0);
            if lcond2 < cp.rlmin || (1.0 - a) < c.epsec {
                lcond2 = 0.0;
                acond = 0.0;
            }
            if lcond2 == 0.0 {
                acond = 0.0;
            }
            budget.solac += acond;
            budget.transfer(condensate, Vapour, lcond2);
            budget.qxfg[condensate] += lcond2;
        }
    }

    // Ice deposition
    if c.depice {
        let a_above = if has_above { above.a } else { 0.0 };
        if a_above < cp.rcldtopcf && a >= cp.rcldtopcf {
            tmp.cldtopdist = 0.0;
        } else {
            tmp.cldtopdist += dp / (rho * th.rg);
        }

        if tp1 < th.rtt && budget.qxfg[Liquid] > cp.rlmin {
            let vpice = foeeice(c, tp1) * th.rv / th.rd;
            let vpliq = vpice * fokoop_t;
            let icenuclei = 1000.0 * (12.96 * (vpliq - vpice) / vpliq - 0.639).exp();
            let add = th.rlstt * (th.rlstt / (th.rv * tp1) - 1.0) / (cp.rcl_ka273 * tp1);
            let bdd = th.rv * tp1 * ap / (2.21 * vpice);
            let cvds = 7.8 * (icenuclei / rho).powf(0.666) * (vpliq - vpice)
                / (8.87 * (add + bdd) * vpice);
            let ice0 = icecld.max(icenuclei * cp.riceinit / rho);
            let inew = (0.666 * cvds * dt + ice0.powf(0.666)).powf(1.5);
            let mut depos = (a * (inew - ice0)).max(0.0).min(budget.qxfg[Liquid]);
            let infactor = (icenuclei / 15000.0).min(1.0);
            depos *= (infactor
                + (1.0 - infactor)
                    * (cp.rdepliqrefrate + tmp.cldtopdist / cp.rdepliqrefdepth))
                .min(1.0);
            budget.transfer(Ice, Liquid, depos);
            budget.qxfg[Ice] += depos;
            budget.qxfg[Liquid] -= depos;
        }
    }

    // Sedimentation
    let mut qpretot = 0.0;
    for s in Species::ALL {
        if !sp.sediments(s) {
            continue;
        }
        if has_above {
            let src = above.pfpls[s] * dtgdp;
            budget.fallsrce[s] = src;
            budget.source(s, src);
            budget.qxfg[s] += src;
            qpretot += budget.qxfg[s];
        }
        let vq = if cp.laericesed && s == Ice {
            0.002 * col.re_ice[k]
        } else {
            sp.vq[s]
        };
        budget.fallsink[s] = dtgdp * vq * rho;
    }

    // Precipitation overlap
    let a_above = if has_above { above.a } else { 0.0 };
    let (covpclr, raincld) = if qpretot > c.epsec {
        tmp.covptot = 1.0
            - ((1.0 - tmp.covptot) * (1.0 - a.max(a_above))
                / (1.0 - a_above.min(1.0 - 1.0e-6)));
        tmp.covptot = tmp.covptot.max(cp.rcovpmin);
        tmp.covpmax = tmp.covpmax.max(tmp.covptot);
        (
            (tmp.covptot - a).max(0.0),
            budget.qxfg[Rain] / tmp.covptot,
        )
    } else {
        tmp.covptot = 0.0;
        tmp.covpmax = 0.0;
        (0.0, 0.0)
    };

    // Autoconversion of ice to snow
    if tp1 <= th.rtt && icecld > c.epsec {
        let mut zzco = dt * cp.rsnowlin1 * (cp.rsnowlin2 * (tp1 - th.rtt)).exp();
        let lcrit = if cp.laericeauto {
            zzco *= (cp.rnice / col.nice[k]).powf(0.333);
            col.icrit_aer[k]
        } else {
            cp.rlcritsnow
        };
        let snowaut = zzco * (1.0 - (-(icecld / lcrit).powi(2)).exp());
        budget.implicit(Snow, Ice, snowaut);
    }

    // Autoconversion and accretion of liquid
    if liqcld > c.epsec {
        let precip_target = if tp1 <= th.rtt { Snow } else { Rain };
        let land = col.lsm > 0.5;
        match c.warm_rain {
            WarmRainScheme::Sundqvist => {
                let mut zzco = cp.rkconv * dt;
                let mut lcrit = if cp.laerliqautolsp {
                    zzco *= (cp.rccn / col.ccn[k]).powf(0.333);
                    col.lcrit_aer[k]
                } else if land {
                    cp.rclcrit_land
                } else {
                    cp.rclcrit_sea
                };
                let precip = (above.pfpls[Snow] + above.pfpls[Rain]) / c.epsec.max(tmp.covptot);
                let mut cfpr = 1.0 + cp.rprc1 * precip.max(0.0).sqrt();
                if cp.laerliqcoll {
                    cfpr *= (cp.rccn / col.ccn[k]).powf(0.333);
                }
                zzco *= cfpr;
                lcrit /= cfpr.max(c.epsec);
                let rainaut = if liqcld / lcrit < 20.0 {
                    zzco * (1.0 - (-(liqcld / lcrit).powi(2)).exp())
                } else {
                    zzco
                };
                budget.implicit(precip_target, Liquid, rainaut);
            }
            WarmRainScheme::KhairoutdinovKogan => {
                let (cloud_num, lcrit) = if land {
                    (cp.rcl_kk_cloud_num_land, cp.rclcrit_land)
                } else {
                    (cp.rcl_kk_cloud_num_sea, cp.rclcrit_sea)
                };
                let (rainaut, rainacc) = if liqcld > lcrit {
                    let mut aut = 1.5
                        * a
                        * dt
                        * cp.rcl_kkaau
                        * liqcld.powf(cp.rcl_kkbauq)
                        * cloud_num.powf(cp.rcl_kkbaun);
                    aut = aut.min(budget.qxfg[Liquid]);
                    if aut < c.epsec {
                        aut = 0.0;
                    }
                    let mut acc =
                        2.0 * a * dt * cp.rcl_kkaac * (liqcld * raincld).powf(cp.rcl_kkbac);
                    acc = acc.min(budget.qxfg[Liquid]);
                    if acc < c.epsec {
                        acc = 0.0;
                    }
                    (aut, acc)
                } else {
                    (0.0, 0.0)
                };
                budget.transfer(precip_target, Liquid, rainaut);
                budget.transfer(precip_target, Liquid, rainacc);
            }
        }
    }

    // Melting of ice-phase species
    let icetot: f64 = Species::ALL
        .iter()
        .filter(|&&s| sp.phase[s] == Phase::Ice)
        .map(|&s| budget.qxfg[s])
        .sum();
    let mut meltmax = 0.0;
    if icetot > c.epsec && tp1 > th.rtt {
        let [tw1, tw2, tw3, tw4, tw5] = c.tw;
        let subsat = (sat.qsice - qx[Vapour]).max(0.0);
        let tdmtw0 = tp1 - th.rtt - subsat * (tw1 + tw2 * (ap - tw3) - tw4 * (tp1 - tw5));
        let cons1 = (dt * (1.0 + 0.5 * tdmtw0) / cp.rtaumel).abs();
        meltmax = (tdmtw0 * cons1 * c.rldcp).max(0.0);
    }
    if meltmax > c.epsec && icetot > c.epsec {
        for s in Species::ALL {
            if sp.phase[s] != Phase::Ice {
                continue;
            }
            if let Some(target) = sp.melt[s] {
                let alfa = budget.qxfg[s] / icetot;
                let melt = budget.qxfg[s].min(alfa * meltmax);
                budget.qxfg[s] -= melt;
                budget.qxfg[target] += melt;
                budget.transfer(target, s, melt);
            }
        }
    }

    // Freezing of rain
    let mut rainfrac_toprfz = None;
    if qx[Rain] > c.epsec {
        if has_above && tp1 <= th.rtt && above.t > th.rtt {
            let qpre = (qx[Snow] + qx[Rain]).max(c.epsec);
            let frac = qx[Rain] / qpre;
            rainfrac_toprfz = Some(frac);
            tmp.rainliq = frac > 0.8;
        }
        if tp1 < th.rtt {
            let frzmax = if tmp.rainliq {
                let lambda = (cp.rcl_fac1 / (rho * qx[Rain])).powf(cp.rcl_fac2);
                let temp = cp.rcl_fzrab * (tp1 - th.rtt);
                let frz = dt
                    * (cp.rcl_const5r / rho)
                    * (temp.exp() - 1.0)
                    * lambda.powf(cp.rcl_const6r);
                frz.max(0.0)
            } else {
                let cons1 = (dt * (1.0 + 0.5 * (th.rtt - tp1)) / cp.rtaumel).abs();
                ((th.rtt - tp1) * cons1 * c.rldcp).max(0.0)
            };
            if let Some(target) = sp.melt[Rain] {
                if frzmax > c.epsec {
                    budget.transfer(target, Rain, qx[Rain].min(frzmax));
                }
            }
        }
    }

    // Homogeneous freezing of cloud liquid
    let frzmax = ((cp.rthomo - tp1) * c.rldcp).max(0.0);
    if let Some(target) = sp.melt[Liquid] {
        if frzmax > c.epsec && budget.qxfg[Liquid] > c.epsec {
            let frz = budget.qxfg[Liquid].min(frzmax);
            budget.transfer(target, Liquid, frz);
        }
    }

    // Evaporation of precipitation
    let precip_rh = {
        let zzrh = cp.rprecrhmax
            + (1.0 - cp.rprecrhmax) * tmp.covpmax / c.epsec.max(1.0 - a);
        zzrh.max(cp.rprecrhmax).min(1.0)
    };
    let env = Environment {
        a,
        ap,
        tp1,
        rho,
        dp,
        dtgdp,
        dt,
        covpclr,
        qv: qx[Vapour],
        sigma_sqrt: (ap * tmp.paphd).sqrt(),
        precip_rh,
    };
    match c.rain_evaporation {
        EvaporationScheme::Off => {}
        EvaporationScheme::Sundqvist => {
            sundqvist_evaporation(c, &env, &mut budget, tmp, Rain, sat.qsliq, corqsliq, 0.5);
        }
        EvaporationScheme::Diffusional => {
            diffusional_rain_evaporation(c, &env, &mut budget, tmp, sat.qsliq);
        }
    }
    // Diffusional snow evaporation is rejected when the constants are lowered
    if c.snow_evaporation == EvaporationScheme::Sundqvist {
        sundqvist_evaporation(c, &env, &mut budget, tmp, Snow, sat.qsice, corqsice, 1.0);
    }

    // Implicit solve
    let qxn = budget.solve(&qx);
    let mut pfpls = PerSpecies::default();
    for s in Species::ALL {
        pfpls[s] = budget.fallsink[s] * qxn[s] * rdtgdp;
    }
    if pfpls[Snow] + pfpls[Rain] < c.epsec {
        tmp.covptot = 0.0;
    }

    // Cloud fraction
    let mut anew = ((a + budget.solac) / (1.0 + budget.solab)).min(1.0);
    if anew < cp.ramin {
        anew = 0.0;
    }
    let da = anew - aorig;

    // Tendencies
    for slot in 0..Species::ALL.len() {
        let s = sp.species_at(slot);
        if s == Vapour {
            continue;
        }
        let fluxq = budget.psupsatsrce[s] + budget.convsrce[s] + budget.fallsrce[s]
            - (budget.fallsink[s] + budget.convsink[s]) * qxn[s];
        tnd.t += c.latent_heat_factor(s) * (qxn[s] - qx[s] - fluxq) * qtmst;
        tnd.q[s] += (qxn[s] - qx0[s]) * qtmst;
    }
    tnd.q[Vapour] += (qxn[Vapour] - qx[Vapour]) * qtmst;
    tnd.a += da * qtmst;

    *above = LevelCarry {
        a,
        anew,
        t: tp1,
        ap,
        qxn,
        pfpls,
    };

    LevelOutcome {
        foealfa: sat.alfa,
        lneg,
        lude,
        pfpls,
        qx0,
        qxn,
        covptot: tmp.covptot,
        rainfrac_toprfz,
        tendencies: tnd,
    }
}

/// Level state shared by the evaporation formulas
#[derive(Debug, Clone, Copy)]
struct Environment {
    a: f64,
    ap: f64,
    tp1: f64,
    rho: f64,
    dp: f64,
    dtgdp: f64,
    dt: f64,
    covpclr: f64,
    qv: f64,
    /// `sqrt(ap / aph_surface)`
    sigma_sqrt: f64,
    /// Relative humidity limit for precipitation evaporation
    precip_rh: f64,
}

/// Remove `evap` from precipitating species `s` and shrink the precipitation cover
fn apply_precip_evaporation(
    env: &Environment,
    cp_rcovpmin: f64,
    budget: &mut LevelBudget<'_>,
    tmp: &mut ColumnTemporaries,
    s: Species,
    evap: f64,
) {
    budget.transfer(Vapour, s, evap);
    tmp.covptot = cp_rcovpmin
        .max(tmp.covptot - ((tmp.covptot - env.a) * evap / budget.qxfg[s]).max(0.0));
    budget.qxfg[s] -= evap;
}

/// Bulk evaporation of rain or snow in the clear-sky part of the precipitation cover
#[allow(clippy::too_many_arguments)]
fn sundqvist_evaporation(
    c: &Constants,
    env: &Environment,
    budget: &mut LevelBudget<'_>,
    tmp: &mut ColumnTemporaries,
    s: Species,
    qs: f64,
    corq: f64,
    scale: f64,
) {
    let cp = &c.cloud;
    let qe = ((env.qv - env.a * qs) / c.epsec.max(1.0 - env.a))
        .min(qs)
        .max(0.0);
    if !(env.covpclr > c.epsec && budget.qxfg[s] > c.epsec && qe < env.precip_rh * qs) {
        return;
    }
    let flux_scale = tmp.covptot * env.dtgdp;
    let preclr = budget.qxfg[s] * env.covpclr / flux_scale.abs().max(c.epsilon).copysign(flux_scale);
    let beta1 = env.sigma_sqrt / cp.rvrfactor * preclr / env.covpclr.max(c.epsec);
    let beta = c.thermo.rg * cp.rpecons * scale * beta1.powf(0.5777);
    let denom = 1.0 + beta * env.dt * corq;
    let dpr = env.covpclr * beta * (qs - qe) / denom * env.dp / c.thermo.rg;
    let dpevap = dpr * env.dtgdp;
    let evap = dpevap.min(budget.qxfg[s]);
    apply_precip_evaporation(env, cp.rcovpmin, budget, tmp, s, evap);
}

/// Rain evaporation integrated over an exponential drop size spectrum with ventilation
fn diffusional_rain_evaporation(
    c: &Constants,
    env: &Environment,
    budget: &mut LevelBudget<'_>,
    tmp: &mut ColumnTemporaries,
    qsliq: f64,
) {
    let th = &c.thermo;
    let cp = &c.cloud;
    let zzrh = env.precip_rh.min(0.8);
    let qe = env.qv.min(qsliq).max(0.0);
    if !(env.covpclr > c.epsec && budget.qxfg[Rain] > c.epsec && qe < zzrh * qsliq) {
        return;
    }
    let t = env.tp1;
    let preclr = budget.qxfg[Rain] / tmp.covptot;
    let fallcorr = (cp.rdensref / env.rho).powf(0.4);
    let esatliq = th.rv / th.rd * foeeliq(c, t);
    let lambda = (cp.rcl_fac1 / (env.rho * preclr)).powf(cp.rcl_fac2);

    // Thermal conduction and vapour diffusion resistances
    let corr2 = (t / 273.0).powf(1.5) * 393.0 / (t + 120.0);
    let ka = cp.rcl_ka273 * corr2;
    let dv = cp.rcl_dv273 * (t / 273.0).powf(1.94) * (101_325.0 / env.ap);
    let conduction = th.rlvtt / (ka * t) * (th.rlvtt / (th.rv * t) - 1.0);
    let diffusion = th.rv * t / (dv * esatliq);

    let ventilation =
        0.78 * lambda.powf(cp.rcl_const4r) + cp.rcl_const2r * fallcorr.sqrt() * lambda.powf(cp.rcl_const3r);
    let beta = cp.rcl_const1r * ventilation / (env.rho * (conduction + diffusion) * qsliq);
    let subsat = (zzrh * qsliq - qe).max(0.0);
    let dpevap = env.covpclr * beta * env.dt * subsat / (1.0 + beta * env.dt);
    let evap = dpevap.min(budget.qxfg[Rain]);
    apply_precip_evaporation(env, cp.rcovpmin, budget, tmp, Rain, evap);
}
