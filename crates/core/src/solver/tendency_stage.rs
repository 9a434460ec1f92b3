//! Tendency stage: the top-to-bottom sweep of one column
//!
//! The sweep itself is strategy-agnostic. What happens to the flux-stage inputs a level
//! produces is decided by a [`LevelSink`]: the fused strategy integrates the fluxes on
//! the spot, the split strategy parks them in the intermediate fields.

use super::temporaries::IntermediateColumn;
use crate::core_types::{FluxColumn, OverlapColumn, StateColumn, TendencyColumn};
use crate::physics::species::Species::{Ice, Liquid, Rain, Snow, Vapour};
use crate::physics::{
    level_step, ColumnTemporaries, Constants, FluxAccumulator, FluxInputs, LevelCarry,
    LevelOutcome,
};

/// Consumer of per-level flux-stage inputs
pub trait LevelSink {
    /// Called once before the first level of a column
    fn begin(&mut self) {}

    /// Called for every level, top to bottom
    fn level(&mut self, k: usize, col: &StateColumn<'_>, inputs: &FluxInputs);
}

/// Flux-stage inputs of level `k`
#[must_use]
pub fn flux_inputs(outcome: &LevelOutcome, col: &StateColumn<'_>, k: usize) -> FluxInputs {
    FluxInputs {
        foealfa: outcome.foealfa,
        lneg: outcome.lneg,
        lude: outcome.lude,
        pfpls: outcome.pfpls,
        qx0: outcome.qx0,
        qxn: outcome.qxn,
        vfl: col.vfl[k],
        vfi: col.vfi[k],
    }
}

/// Sweep one column, writing tendencies and overlap diagnostics
///
/// # Arguments
///
/// * `c` - Resolved constants
/// * `col` - Input column
/// * `dt` - Timestep (s)
/// * `tmp` - Column scratch scalars; reset on entry
/// * `tendencies` - Output tendencies of the column
/// * `overlap` - Output precipitation cover and rain fraction of the column
/// * `sink` - Receiver of the flux-stage inputs
pub fn sweep_column<S: LevelSink>(
    c: &Constants,
    col: &StateColumn<'_>,
    dt: f64,
    tmp: &mut ColumnTemporaries,
    tendencies: &mut TendencyColumn<'_>,
    overlap: &mut OverlapColumn<'_>,
    sink: &mut S,
) {
    tmp.begin_column(col, dt);
    *overlap.rainfrac_toprfz = 0.0;
    sink.begin();

    let mut above = LevelCarry::default();
    for k in 0..col.t.len() {
        let outcome = level_step(c, col, k, dt, tmp, &mut above);

        let tnd = &outcome.tendencies;
        tendencies.a[k] = tnd.a;
        tendencies.t[k] = tnd.t;
        tendencies.qv[k] = tnd.q[Vapour];
        tendencies.ql[k] = tnd.q[Liquid];
        tendencies.qi[k] = tnd.q[Ice];
        tendencies.qr[k] = tnd.q[Rain];
        tendencies.qs[k] = tnd.q[Snow];

        overlap.covptot[k] = outcome.covptot;
        if let Some(rainfrac) = outcome.rainfrac_toprfz {
            *overlap.rainfrac_toprfz = rainfrac;
        }

        sink.level(k, col, &flux_inputs(&outcome, col, k));
    }
}

/// Integrates interface fluxes while the sweep runs
pub struct FusedSink<'a, 'c> {
    acc: FluxAccumulator<'c>,
    fluxes: FluxColumn<'a>,
}

impl<'a, 'c> FusedSink<'a, 'c> {
    #[must_use]
    pub fn new(acc: FluxAccumulator<'c>, fluxes: FluxColumn<'a>) -> Self {
        Self { acc, fluxes }
    }
}

impl LevelSink for FusedSink<'_, '_> {
    fn begin(&mut self) {
        self.acc.start(&mut self.fluxes);
    }

    fn level(&mut self, k: usize, col: &StateColumn<'_>, inputs: &FluxInputs) {
        self.acc.step(k, col.aph, inputs, &mut self.fluxes);
    }
}

/// Stores flux-stage inputs for the split flux stage
pub struct SplitSink<'a> {
    column: IntermediateColumn<'a>,
}

impl<'a> SplitSink<'a> {
    #[must_use]
    pub fn new(column: IntermediateColumn<'a>) -> Self {
        Self { column }
    }
}

impl LevelSink for SplitSink<'_> {
    fn level(&mut self, k: usize, _col: &StateColumn<'_>, inputs: &FluxInputs) {
        self.column.store(k, inputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
    use crate::grid::ComputationalGrid;
    use crate::physics::{LiteralSet, ParameterGroups};

    /// Records every level it is given
    #[derive(Default)]
    struct Recorder {
        begun: usize,
        levels: Vec<(usize, FluxInputs)>,
    }

    impl LevelSink for Recorder {
        fn begin(&mut self) {
            self.begun += 1;
        }

        fn level(&mut self, k: usize, _col: &StateColumn<'_>, inputs: &FluxInputs) {
            self.levels.push((k, *inputs));
        }
    }

    fn dry_state(grid: &ComputationalGrid) -> StateBundle {
        let mut state = StateBundle::zeros(grid);
        let nz = grid.nz();
        for i in 0..grid.nx() {
            for k in 0..nz {
                let p = 20_000.0 + 80_000.0 * (k as f64 + 0.5) / nz as f64;
                state.ap.set(i, k, p);
                state.t.set(i, k, 220.0 + 60.0 * (k as f64 + 0.5) / nz as f64);
                state.qv.set(i, k, 1.0e-6);
            }
            for k in 0..=nz {
                state.aph.set(i, k, 20_000.0 + 80_000.0 * k as f64 / nz as f64);
            }
        }
        state
    }

    #[test]
    fn test_sweep_visits_every_level_in_order() {
        let grid = ComputationalGrid::new(1, 1, 6).unwrap();
        let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(6))
            .unwrap();
        let mut state = dry_state(&grid);
        state.vfl.set(0, 3, 2.5e-8);
        let mut tnd = TendencyBundle::zeros(&grid);
        let mut diag = DiagnosticBundle::zeros(&grid);
        let mut tmp = ColumnTemporaries::default();
        let mut sink = Recorder::default();

        let col = state.column(0);
        let mut tnd_cols = tnd.columns_mut();
        let mut diag_cols = diag.columns_mut();
        let (overlap, _) = &mut diag_cols[0];
        sweep_column(&c, &col, 600.0, &mut tmp, &mut tnd_cols[0], overlap, &mut sink);

        assert_eq!(sink.begun, 1);
        let ks: Vec<_> = sink.levels.iter().map(|(k, _)| *k).collect();
        assert_eq!(ks, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(sink.levels[3].1.vfl, 2.5e-8);
        assert_eq!(*overlap.rainfrac_toprfz, 0.0);
    }
}
