//! Split strategy: tendency stage, then a separate flux stage
//!
//! The tendency stage leaves 18 intermediate fields in the scratch set; the flux stage
//! reads them back together with `vfl`, `vfi` and `aph` to integrate the interface
//! fluxes. Both stages run the same per-level physics as the fused strategy.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use super::engine::EngineCore;
use super::flux_stage::flux_column;
use super::profiler::{PerformanceReporter, ProfilerScope};
use super::temporaries::{IntermediateFields, Temporaries};
use super::tendency_stage::{sweep_column, SplitSink};
use super::{CloudMicrophysics, EngineConfig, ExecutionMode};
use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
use crate::error::CloudscResult;
use crate::grid::ComputationalGrid;
use crate::physics::{Constants, FluxAccumulator};

/// Two-stage engine
pub struct SplitCloudsc {
    core: EngineCore,
}

impl SplitCloudsc {
    /// Build a split engine
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
            mode: ExecutionMode::Split,
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

impl CloudMicrophysics for SplitCloudsc {
    fn evaluate_into(
        &self,
        state: &StateBundle,
        timestep: f64,
        tendencies: &mut TendencyBundle,
        diagnostics: &mut DiagnosticBundle,
    ) -> CloudscResult<()> {
        let call = ProfilerScope::new("cloudsc");
        self.core.check_call(state, tendencies, diagnostics)?;
        trace!(mode = "split", timestep, columns = self.core.grid.nx(), "evaluate");

        let c = &self.core.constants;
        let grid = self.core.grid;
        let mut scratch = self.core.pool.acquire();
        let Temporaries {
            columns,
            intermediates,
        } = &mut *scratch;
        let intermediates = intermediates.get_or_insert_with(|| IntermediateFields::zeros(&grid));
        let (overlaps, fluxes): (Vec<_>, Vec<_>) = diagnostics.columns_mut().into_iter().unzip();

        self.core.stage("tendency", || {
            tendencies
                .columns_mut()
                .into_par_iter()
                .zip(overlaps)
                .zip(columns.par_iter_mut())
                .zip(intermediates.columns_mut())
                .enumerate()
                .for_each(|(i, (((mut tnd, mut overlap), tmp), bridge))| {
                    let col = state.column(i);
                    let mut sink = SplitSink::new(bridge);
                    sweep_column(c, &col, timestep, tmp, &mut tnd, &mut overlap, &mut sink);
                });
        });

        let acc = FluxAccumulator::new(c, timestep);
        let intermediates = &*intermediates;
        self.core.stage("flux", || {
            fluxes
                .into_par_iter()
                .enumerate()
                .for_each(|(i, mut column)| {
                    flux_column(&acc, &state.column(i), intermediates, i, &mut column);
                });
        });

        self.core.finish_call(ExecutionMode::Split, &call);
        Ok(())
    }

    fn grid(&self) -> &ComputationalGrid {
        &self.core.grid
    }

    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Split
    }

    fn constants(&self) -> &Constants {
        &self.core.constants
    }
}
