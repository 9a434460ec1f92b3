//! Fused strategy: one sweep produces tendencies and every diagnostic
//!
//! Interface fluxes are integrated while the tendency sweep walks down the column, so
//! no intermediate fields are ever materialized.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use super::engine::EngineCore;
use super::profiler::{PerformanceReporter, ProfilerScope};
use super::tendency_stage::{sweep_column, FusedSink};
use super::{CloudMicrophysics, EngineConfig, ExecutionMode};
use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
use crate::error::CloudscResult;
use crate::grid::ComputationalGrid;
use crate::physics::{Constants, FluxAccumulator};

/// Single-stage engine
pub struct FusedCloudsc {
    core: EngineCore,
}

impl FusedCloudsc {
    /// Build a fused engine
    ///
    /// # Errors
    ///
    /// Returns [`crate::CloudscError::InvalidConstant`] if `NLEV` disagrees with the grid.
    pub fn new(
        grid: ComputationalGrid,
        constants: Constants,
        enable_checks: bool,
    ) -> CloudscResult<Self> {
        let config = EngineConfig {
            mode: ExecutionMode::Fused,
            enable_checks,
        };
        Ok(Self {
            core: EngineCore::new(grid, constants, &config)?,
        })
    }

    /// Attach a timing observer
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn PerformanceReporter>) -> Self {
        self.core.set_reporter(reporter);
        self
    }
}

impl CloudMicrophysics for FusedCloudsc {
    fn evaluate_into(
        &self,
        state: &StateBundle,
        timestep: f64,
        tendencies: &mut TendencyBundle,
        diagnostics: &mut DiagnosticBundle,
    ) -> CloudscResult<()> {
        let call = ProfilerScope::new("cloudsc");
        self.core.check_call(state, tendencies, diagnostics)?;
        trace!(mode = "fused", timestep, columns = self.core.grid.nx(), "evaluate");

        let c = &self.core.constants;
        let acc = FluxAccumulator::new(c, timestep);
        let mut scratch = self.core.pool.acquire();

        self.core.stage("tendency", || {
            tendencies
                .columns_mut()
                .into_par_iter()
                .zip(diagnostics.columns_mut())
                .zip(scratch.columns.par_iter_mut())
                .enumerate()
                .for_each(|(i, ((mut tnd, (mut overlap, fluxes)), tmp))| {
                    let col = state.column(i);
                    let mut sink = FusedSink::new(acc, fluxes);
                    sweep_column(c, &col, timestep, tmp, &mut tnd, &mut overlap, &mut sink);
                });
        });

        self.core.finish_call(ExecutionMode::Fused, &call);
        Ok(())
    }

    fn grid(&self) -> &ComputationalGrid {
        &self.core.grid
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Fused
    }

    fn constants(&self) -> &Constants {
        &self.core.constants
    }
}
