//! Cloud Microphysics Core Library
//!
//! A column-parallel cloud and precipitation scheme for atmospheric models. For every
//! column it sweeps the levels top to bottom, evaluates the cloud processes, solves the
//! coupled five-species moisture budget implicitly, and produces per-variable tendencies
//! and vertical flux diagnostics.
//!
//! ## Execution Strategies
//!
//! - Fused: one sweep writes tendencies and every flux diagnostic
//! - Split: a tendency stage writes intermediate fields, a flux stage integrates them
//!
//! Both strategies share the per-level physics and are used to cross-check each other.

// Error taxonomy
pub mod error;

// Grid, field storage and bundles
pub mod core_types;
pub mod grid;

// Constants, saturation thermodynamics and process physics
pub mod physics;

// Engines and stages
pub mod solver;

// Collaborators
pub mod initialization;
pub mod validation;

// Re-export core types
pub use core_types::{DiagnosticBundle, Field, StateBundle, TendencyBundle};
pub use error::{CloudscError, CloudscResult};
pub use grid::{ComputationalGrid, GridPlacement};

// Re-export engine types
pub use physics::{ConstantTable, Constants, LiteralSet, ParameterGroups};
pub use solver::{
    create_engine, create_engine_with_reporter, CloudMicrophysics, EngineConfig, ExecInfo,
    ExecutionMode, FusedCloudsc, PerformanceReporter, SplitCloudsc,
};

// Re-export collaborators
pub use initialization::{EngineReference, ReferenceProvider, StateProvider, SyntheticColumns};
pub use validation::{validate, ValidationReport};
