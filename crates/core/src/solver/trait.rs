//! Engine trait definition
//!
//! Both execution strategies implement [`CloudMicrophysics`]; callers pick one at
//! construction time through [`super::create_engine`] and never branch on it again.

use super::ExecutionMode;
use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
use crate::error::CloudscResult;
use crate::grid::ComputationalGrid;
use crate::physics::Constants;

/// Strategy-agnostic interface of the cloud microphysics engine
///
/// Engines are immutable after construction. Every call works on scratch buffers
/// private to that call, so one engine may be shared between threads.
pub trait CloudMicrophysics: Send + Sync {
    /// Evaluate one timestep into freshly allocated outputs
    ///
    /// # Arguments
    ///
    /// * `state` - Input state on the engine grid; never modified
    /// * `timestep` - Timestep in seconds
    ///
    /// # Returns
    ///
    /// Tendencies and diagnostics of the call
    ///
    /// # Errors
    ///
    /// Returns [`crate::CloudscError::PlacementMismatch`] if checks are enabled and a
    /// state field disagrees with the schema or the engine grid.
    fn evaluate(
        &self,
        state: &StateBundle,
        timestep: f64,
    ) -> CloudscResult<(TendencyBundle, DiagnosticBundle)> {
        let mut tendencies = TendencyBundle::zeros(self.grid());
        let mut diagnostics = DiagnosticBundle::zeros(self.grid());
        self.evaluate_into(state, timestep, &mut tendencies, &mut diagnostics)?;
        Ok((tendencies, diagnostics))
    }

    /// Evaluate one timestep into caller-owned outputs
    ///
    /// Every element of both output bundles is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CloudscError::PlacementMismatch`] if checks are enabled and a
    /// state or output field disagrees with the schema or the engine grid.
    fn evaluate_into(
        &self,
        state: &StateBundle,
        timestep: f64,
        tendencies: &mut TendencyBundle,
        diagnostics: &mut DiagnosticBundle,
    ) -> CloudscResult<()>;

    /// Grid the engine was built for
    fn grid(&self) -> &ComputationalGrid;

    /// Execution strategy
    fn mode(&self) -> ExecutionMode;

    /// Resolved constant set
    fn constants(&self) -> &Constants;
}
