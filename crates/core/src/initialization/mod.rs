//! Input and reference collaborators
//!
//! The engine never reads files itself. A [`StateProvider`] fills a [`StateBundle`];
//! a [`ReferenceProvider`] supplies the outputs a run is validated against.

mod synthetic;

pub use synthetic::SyntheticColumns;

use crate::core_types::{DiagnosticBundle, StateBundle, TendencyBundle};
use crate::error::CloudscResult;
use crate::grid::ComputationalGrid;
use crate::solver::CloudMicrophysics;

/// Source of input states
pub trait StateProvider {
    /// Populate every state field on `grid`
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot supply a field for this grid.
    fn state(&self, grid: &ComputationalGrid) -> CloudscResult<StateBundle>;
}

/// Source of reference outputs
pub trait ReferenceProvider {
    /// Reference tendencies and diagnostics on `grid`
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be produced for this grid.
    fn reference(
        &self,
        grid: &ComputationalGrid,
    ) -> CloudscResult<(TendencyBundle, DiagnosticBundle)>;
}

/// Reference produced by running another engine on the same input
pub struct EngineReference<'a> {
    engine: &'a dyn CloudMicrophysics,
    state: &'a StateBundle,
    timestep: f64,
}

impl<'a> EngineReference<'a> {
    #[must_use]
    pub fn new(engine: &'a dyn CloudMicrophysics, state: &'a StateBundle, timestep: f64) -> Self {
        Self {
            engine,
            state,
            timestep,
        }
    }
}

impl ReferenceProvider for EngineReference<'_> {
    fn reference(
        &self,
        grid: &ComputationalGrid,
    ) -> CloudscResult<(TendencyBundle, DiagnosticBundle)> {
        let mut tendencies = TendencyBundle::zeros(grid);
        let mut diagnostics = DiagnosticBundle::zeros(grid);
        // Holds even when the engine skips its own checks
        let engine_grid = self.engine.grid();
        self.state.check(engine_grid)?;
        tendencies.check(engine_grid)?;
        diagnostics.check(engine_grid)?;
        self.engine
            .evaluate_into(self.state, self.timestep, &mut tendencies, &mut diagnostics)?;
        Ok((tendencies, diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudscError;
    use crate::physics::{LiteralSet, ParameterGroups};
    use crate::solver::{create_engine, EngineConfig, ExecutionMode};

    #[test]
    fn test_reference_rejects_foreign_grid_without_engine_checks() {
        let grid = ComputationalGrid::new(3, 1, 8).unwrap();
        let config = EngineConfig {
            mode: ExecutionMode::Split,
            enable_checks: false,
        };
        let engine = create_engine(
            grid,
            &ParameterGroups::ifs_defaults(),
            &LiteralSet::standard(8),
            &config,
        )
        .unwrap();
        let state = SyntheticColumns::new().state(&grid).unwrap();
        let reference = EngineReference::new(engine.as_ref(), &state, 600.0);

        let wider = ComputationalGrid::new(5, 1, 8).unwrap();
        assert!(matches!(
            reference.reference(&wider),
            Err(CloudscError::PlacementMismatch { .. })
        ));
        assert!(reference.reference(&grid).is_ok());
    }
}
