//! Grid model: column count, full levels and staggered interface levels

pub mod computational_grid;

// Re-export main types
pub use computational_grid::*;
