//! Error taxonomy for engine construction and bundle checks
//!
//! Only configuration problems are errors. Numerical hazards inside the level sweep
//! (poles of the saturation formulas, negative pressures) are documented preconditions
//! and propagate as NaN/Inf; validation mismatches are reported by
//! [`crate::validation::ValidationReport`] rather than raised.

use crate::grid::GridPlacement;
use thiserror::Error;

/// Result alias used throughout the crate
pub type CloudscResult<T> = Result<T, CloudscError>;

/// Errors raised while building an engine or checking bundles against the schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloudscError {
    /// A grid dimension is zero, or the degenerate `ny` axis is not 1
    #[error("invalid grid dimension {dimension} = {value}")]
    InvalidGrid {
        /// Dimension name (`nx`, `ny`, `nz`)
        dimension: &'static str,
        /// Rejected value
        value: usize,
    },

    /// A constant required by the kernels is absent after merging
    #[error("missing constant '{key}'")]
    MissingConstant {
        /// Constant name
        key: String,
    },

    /// A literal formula refers to a parameter that no group provides
    #[error("literal '{literal}' references missing source key '{key}'")]
    MissingSourceKey {
        /// Literal being evaluated
        literal: String,
        /// Parameter it depends on
        key: String,
    },

    /// A constant exists but cannot be used (bad index, unknown mode)
    #[error("invalid constant '{key}': {reason}")]
    InvalidConstant {
        /// Constant name
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A field descriptor has a rank other than 2 or 3
    #[error("field '{field}' has rank {rank}, expected 2 or 3")]
    InvalidRank {
        /// Field name
        field: String,
        /// Rejected rank
        rank: usize,
    },

    /// A bundle field disagrees with its schema entry or with the engine grid
    #[error("field '{field}' expected {expected:?} with {expected_len} values, found {found:?} with {found_len}")]
    PlacementMismatch {
        /// Field name
        field: String,
        /// Placement from the schema
        expected: GridPlacement,
        /// Number of values the grid implies
        expected_len: usize,
        /// Placement carried by the field
        found: GridPlacement,
        /// Number of values stored
        found_len: usize,
    },

    /// A name that no schema table knows
    #[error("unknown field '{name}'")]
    UnknownField {
        /// Requested name
        name: String,
    },
}

impl CloudscError {
    /// Shorthand for [`CloudscError::MissingConstant`]
    pub(crate) fn missing(key: &str) -> Self {
        Self::MissingConstant {
            key: key.to_owned(),
        }
    }

    /// Shorthand for [`CloudscError::InvalidConstant`]
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConstant {
            key: key.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_key() {
        let err = CloudscError::missing("RVSNOW");
        assert_eq!(err.to_string(), "missing constant 'RVSNOW'");

        let err = CloudscError::MissingSourceKey {
            literal: "VQS".into(),
            key: "RVSNOW".into(),
        };
        assert!(err.to_string().contains("VQS"));
        assert!(err.to_string().contains("RVSNOW"));
    }

    #[test]
    fn test_invalid_grid_message() {
        let err = CloudscError::InvalidGrid {
            dimension: "nz",
            value: 0,
        };
        assert_eq!(err.to_string(), "invalid grid dimension nz = 0");
    }
}
