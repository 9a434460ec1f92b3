//! Flux stage of the split strategy
//!
//! Integrates the interface fluxes of one column from the intermediates left by the
//! tendency stage, the turbulent flux inputs and the interface pressures.

use super::temporaries::IntermediateFields;
use crate::core_types::{FluxColumn, StateColumn};
use crate::physics::FluxAccumulator;

/// Integrate all 14 interface fluxes of column `i`
pub fn flux_column(
    acc: &FluxAccumulator<'_>,
    col: &StateColumn<'_>,
    intermediates: &IntermediateFields,
    i: usize,
    fluxes: &mut FluxColumn<'_>,
) {
    acc.start(fluxes);
    for k in 0..col.t.len() {
        let mut level = intermediates.load(i, k);
        level.vfl = col.vfl[k];
        level.vfi = col.vfi[k];
        acc.step(k, col.aph, &level, fluxes);
    }
}
