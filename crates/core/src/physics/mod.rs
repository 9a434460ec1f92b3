//! Cloud microphysics: constants, saturation thermodynamics and per-level processes

pub mod adjustment;
pub mod constants;
pub mod fluxes;
pub mod implicit;
pub mod microphysics;
pub mod saturation;
pub mod species;

// Re-exports
pub use adjustment::{cuadjtq, cuadjtq_step};
pub use constants::{
    ConstantTable, Constants, EvaporationScheme, LiteralSet, LiteralValue, ParameterGroup,
    ParameterGroups, SupersaturationScheme, WarmRainScheme,
};
pub use fluxes::{FluxAccumulator, FluxInputs};
pub use implicit::{solve_species, SpeciesMatrix, SpeciesVector, NCLV};
pub use microphysics::{level_step, ColumnTemporaries, LevelBudget, LevelCarry, LevelOutcome};
pub use species::{PerSpecies, Phase, Species, SpeciesTable};
