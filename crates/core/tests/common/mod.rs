//! Shared setup for integration tests
#![allow(dead_code)]

use cloudsc_core::{
    create_engine, CloudMicrophysics, ComputationalGrid, EngineConfig, ExecutionMode, LiteralSet,
    ParameterGroups, StateBundle, StateProvider, SyntheticColumns,
};
use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine with default constants for `grid`
pub fn engine(grid: ComputationalGrid, mode: ExecutionMode) -> Box<dyn CloudMicrophysics> {
    let config = EngineConfig {
        mode,
        enable_checks: true,
    };
    create_engine(
        grid,
        &ParameterGroups::ifs_defaults(),
        &LiteralSet::standard(grid.nz()),
        &config,
    )
    .expect("default constants resolve")
}

/// Synthetic state, optionally perturbed
pub fn synthetic_state(grid: &ComputationalGrid, perturbation: f64, seed: u64) -> StateBundle {
    SyntheticColumns::new()
        .with_perturbation(perturbation, seed)
        .state(grid)
        .expect("synthetic columns fit any grid")
}

/// Single dry column with no forcing at all
pub fn dry_column(nz: usize, t: f64, qv: f64) -> (ComputationalGrid, StateBundle) {
    let grid = ComputationalGrid::new(1, 1, nz).expect("valid grid");
    let mut state = StateBundle::zeros(&grid);
    for k in 0..=nz {
        state.aph.set(0, k, 100_000.0 * k as f64 / nz as f64);
    }
    for k in 0..nz {
        let ap = 0.5 * (state.aph.get(0, k) + state.aph.get(0, k + 1));
        state.ap.set(0, k, ap);
        state.t.set(0, k, t);
        state.qv.set(0, k, qv);
    }
    (grid, state)
}
