//! Core types: field storage, static field catalogue and bundles

pub mod bundles;
pub mod field;
pub mod schema;

// Re-export
pub use bundles::*;
pub use field::Field;
pub use schema::{ElementType, FieldSpec};
