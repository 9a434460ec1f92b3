//! Cloud microphysics engines
//!
//! The core abstraction is the [`CloudMicrophysics`] trait, implemented by a fused
//! single-stage engine and a split two-stage engine. Both share the per-level physics
//! and must agree within floating tolerance; the split strategy exists to cross-check
//! the fused one.
//!
//! # Strategy Selection
//!
//! The strategy is chosen once, at construction, from [`EngineConfig::mode`]:
//! 1. `Fused`: tendency sweep integrates fluxes inline
//! 2. `Split`: tendency stage writes 18 intermediates, flux stage consumes them
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudsc_core::physics::{LiteralSet, ParameterGroups};
//! use cloudsc_core::solver::{create_engine, EngineConfig};
//! use cloudsc_core::ComputationalGrid;
//!
//! let grid = ComputationalGrid::new(64, 1, 137)?;
//! let engine = create_engine(
//!     grid,
//!     &ParameterGroups::ifs_defaults(),
//!     &LiteralSet::standard(grid.nz()),
//!     &EngineConfig::default(),
//! )?;
//! let (tendencies, diagnostics) = engine.evaluate(&state, 3600.0)?;
//! ```

#[allow(clippy::module_name_repetitions)]
pub mod binding;
mod engine;
pub mod flux_stage;
mod fused;
pub mod profiler;
mod split;
pub mod temporaries;
pub mod tendency_stage;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

// Re-exports
pub use binding::{stage_bindings, BoundField, FieldSource, StageBinding};
pub use fused::FusedCloudsc;
pub use profiler::{ExecInfo, PerformanceReporter, ProfilerScope, StageTiming};
pub use r#trait::CloudMicrophysics;
pub use split::SplitCloudsc;
pub use temporaries::{IntermediateFields, ScratchGuard, ScratchPool, Temporaries};
pub use tendency_stage::{sweep_column, FusedSink, LevelSink, SplitSink};

use crate::error::{CloudscError, CloudscResult};
use crate::grid::ComputationalGrid;
use crate::physics::{Constants, LiteralSet, ParameterGroups};

/// Execution strategy of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One stage producing all outputs
    #[default]
    Fused,
    /// Tendency stage followed by a flux stage
    Split,
}

impl ExecutionMode {
    /// The other strategy, used as a reference
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Fused => Self::Split,
            Self::Split => Self::Fused,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fused => "fused",
            Self::Split => "split",
        })
    }
}

impl FromStr for ExecutionMode {
    type Err = CloudscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fused" => Ok(Self::Fused),
            "split" => Ok(Self::Split),
            other => Err(CloudscError::invalid(
                "mode",
                format!("unknown execution mode '{other}'"),
            )),
        }
    }
}

/// Construction-time engine options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Execution strategy
    pub mode: ExecutionMode,
    /// Check bundle fields against the schema and grid on every call
    pub enable_checks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Fused,
            enable_checks: true,
        }
    }
}

/// Create an engine with the strategy named by `config`
///
/// Merges the parameter groups and literals into the constant table, lowers it to the
/// typed constant set, and builds the selected engine.
///
/// # Arguments
///
/// * `grid` - Column grid of every call
/// * `groups` - Externally supplied parameter groups
/// * `literals` - Literal constants; override group values
/// * `config` - Strategy and check options
///
/// # Returns
///
/// A boxed `CloudMicrophysics` trait object
///
/// # Errors
///
/// Returns [`CloudscError::MissingConstant`], [`CloudscError::MissingSourceKey`] or
/// [`CloudscError::InvalidConstant`] when the constant table cannot be resolved.
pub fn create_engine(
    grid: ComputationalGrid,
    groups: &ParameterGroups,
    literals: &LiteralSet,
    config: &EngineConfig,
) -> CloudscResult<Box<dyn CloudMicrophysics>> {
    create_engine_with_reporter(grid, groups, literals, config, None)
}

/// [`create_engine`] with an optional timing observer attached
///
/// # Errors
///
/// Same as [`create_engine`].
pub fn create_engine_with_reporter(
    grid: ComputationalGrid,
    groups: &ParameterGroups,
    literals: &LiteralSet,
    config: &EngineConfig,
    reporter: Option<Arc<dyn PerformanceReporter>>,
) -> CloudscResult<Box<dyn CloudMicrophysics>> {
    let constants = Constants::resolve(groups, literals)?;
    info!(
        "Using {} engine ({} columns x {} levels, checks {})",
        config.mode,
        grid.nx(),
        grid.nz(),
        if config.enable_checks { "on" } else { "off" }
    );

    Ok(match config.mode {
        ExecutionMode::Fused => {
            let engine = FusedCloudsc::new(grid, constants, config.enable_checks)?;
            match reporter {
                Some(reporter) => Box::new(engine.with_reporter(reporter)),
                None => Box::new(engine),
            }
        }
        ExecutionMode::Split => {
            let engine = SplitCloudsc::new(grid, constants, config.enable_checks)?;
            match reporter {
                Some(reporter) => Box::new(engine.with_reporter(reporter)),
                None => Box::new(engine),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!("fused".parse::<ExecutionMode>().unwrap(), ExecutionMode::Fused);
        assert_eq!("Split".parse::<ExecutionMode>().unwrap(), ExecutionMode::Split);
        assert!("gpu".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::Fused.other(), ExecutionMode::Split);
        assert_eq!(ExecutionMode::Split.to_string(), "split");
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, ExecutionMode::Fused);
        assert!(config.enable_checks);
    }

    #[test]
    fn test_engine_reports_selected_mode() {
        let grid = ComputationalGrid::new(2, 1, 5).unwrap();
        let groups = ParameterGroups::ifs_defaults();
        let literals = LiteralSet::standard(5);
        for mode in [ExecutionMode::Fused, ExecutionMode::Split] {
            let config = EngineConfig {
                mode,
                enable_checks: true,
            };
            let engine = create_engine(grid, &groups, &literals, &config).unwrap();
            assert_eq!(engine.mode(), mode);
            assert_eq!(engine.grid().nz(), 5);
            assert_eq!(engine.constants().nlev, 5);
        }
    }

    #[test]
    fn test_level_count_mismatch_rejected() {
        let grid = ComputationalGrid::new(2, 1, 5).unwrap();
        let result = create_engine(
            grid,
            &ParameterGroups::ifs_defaults(),
            &LiteralSet::standard(7),
            &EngineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(CloudscError::InvalidConstant { ref key, .. }) if key == "NLEV"
        ));
    }
}
