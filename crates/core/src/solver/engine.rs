//! State shared by both execution strategies

use std::sync::Arc;

use tracing::{debug, trace};

use super::binding::{stage_bindings, FieldSource, StageBinding};
use super::profiler::{PerformanceReporter, ProfilerScope};
use super::temporaries::ScratchPool;
use super::{EngineConfig, ExecutionMode};
use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
use crate::error::{CloudscError, CloudscResult};
use crate::grid::ComputationalGrid;
use crate::physics::Constants;

/// Grid, constants, stage bindings, scratch pool and optional reporter of one engine
pub(crate) struct EngineCore {
    pub grid: ComputationalGrid,
    pub constants: Constants,
    pub enable_checks: bool,
    pub bindings: Vec<StageBinding>,
    pub pool: ScratchPool,
    reporter: Option<Arc<dyn PerformanceReporter>>,
}

impl EngineCore {
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidConstant`] if `NLEV` disagrees with the grid.
    pub fn new(
        grid: ComputationalGrid,
        constants: Constants,
        config: &EngineConfig,
    ) -> CloudscResult<Self> {
        if constants.nlev != grid.nz() {
            return Err(CloudscError::invalid(
                "NLEV",
                format!("{} levels but the grid has {}", constants.nlev, grid.nz()),
            ));
        }
        let with_intermediates = config.mode == ExecutionMode::Split;
        let bindings = stage_bindings(config.mode);
        for binding in &bindings {
            debug!(
                mode = %config.mode,
                stage = binding.stage,
                arguments = binding.arguments.len(),
                "stage binding"
            );
        }
        Ok(Self {
            grid,
            constants,
            enable_checks: config.enable_checks,
            bindings,
            pool: ScratchPool::new(grid, with_intermediates),
            reporter: None,
        })
    }

    pub fn set_reporter(&mut self, reporter: Arc<dyn PerformanceReporter>) {
        self.reporter = Some(reporter);
    }

    /// Schema and shape checks of every caller field a stage binds
    ///
    /// # Errors
    ///
    /// Returns the first [`CloudscError::PlacementMismatch`] or
    /// [`CloudscError::UnknownField`] met while walking the stage bindings.
    pub fn check_call(
        &self,
        state: &StateBundle,
        tendencies: &TendencyBundle,
        diagnostics: &DiagnosticBundle,
    ) -> CloudscResult<()> {
        if !self.enable_checks {
            return Ok(());
        }
        for binding in &self.bindings {
            for bound in &binding.arguments {
                let checked = match bound.source {
                    FieldSource::State => state.check_field(&self.grid, bound.spec),
                    FieldSource::Tendencies => tendencies.check_field(&self.grid, bound.spec),
                    FieldSource::Diagnostics => diagnostics.check_field(&self.grid, bound.spec),
                    // Engine-owned, sized with the pool
                    FieldSource::Intermediates => continue,
                };
                if let Err(err) = checked {
                    debug!(
                        stage = binding.stage,
                        argument = bound.argument,
                        source = %bound.source,
                        "bound field rejected"
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Run `body` as the named stage, reporting its elapsed time
    pub fn stage<R>(&self, name: &'static str, body: impl FnOnce() -> R) -> R {
        let scope = ProfilerScope::new(name);
        let result = body();
        if let Some(reporter) = &self.reporter {
            reporter.record_stage(name, scope.elapsed_ms());
        }
        result
    }

    /// Close a call opened with [`ProfilerScope::new`]
    pub fn finish_call(&self, mode: ExecutionMode, call: &ProfilerScope) {
        let elapsed_ms = call.elapsed_ms();
        trace!(%mode, elapsed_ms, "evaluation finished");
        if let Some(reporter) = &self.reporter {
            reporter.record_call(elapsed_ms);
        }
    }
}
