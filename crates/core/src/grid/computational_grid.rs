//! Computational index space of the microphysics engine
//!
//! The engine works on `nx` independent columns (the second horizontal axis is
//! degenerate, `ny = 1`) with `nz` full levels and `nz + 1` interface levels.
//! Levels are numbered top-down: level 0 is the highest, interface 0 is the model top
//! and interface `nz` is the surface.

use crate::error::{CloudscError, CloudscResult};
use serde::{Deserialize, Serialize};

/// Vertical placement of a field on the computational grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridPlacement {
    /// One value per column (2D, `(nx, ny)`)
    Columns,
    /// One value per column and full level (3D, `(nx, ny, nz)`)
    FullLevels,
    /// One value per column and interface level (3D, `(nx, ny, nz + 1)`)
    Interfaces,
}

impl GridPlacement {
    /// Array rank implied by the placement
    #[must_use]
    pub const fn rank(&self) -> usize {
        match self {
            Self::Columns => 2,
            Self::FullLevels | Self::Interfaces => 3,
        }
    }

    /// Placement from an array rank and vertical staggering
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidRank`] for ranks other than 2 or 3.
    pub fn from_rank(field: &str, rank: usize, staggered: bool) -> CloudscResult<Self> {
        match (rank, staggered) {
            (2, _) => Ok(Self::Columns),
            (3, false) => Ok(Self::FullLevels),
            (3, true) => Ok(Self::Interfaces),
            _ => Err(CloudscError::InvalidRank {
                field: field.to_owned(),
                rank,
            }),
        }
    }

    /// Number of vertical values per column on `grid`
    #[must_use]
    pub const fn levels(&self, grid: &ComputationalGrid) -> usize {
        match self {
            Self::Columns => 1,
            Self::FullLevels => grid.nz,
            Self::Interfaces => grid.nz + 1,
        }
    }
}

/// Column grid with full and staggered vertical levels
///
/// Immutable after construction and shared read-only by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationalGrid {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl ComputationalGrid {
    /// Create a grid of `nx` columns and `nz` full levels
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidGrid`] when any dimension is zero or `ny != 1`.
    pub fn new(nx: usize, ny: usize, nz: usize) -> CloudscResult<Self> {
        if nx == 0 {
            return Err(CloudscError::InvalidGrid {
                dimension: "nx",
                value: nx,
            });
        }
        if ny != 1 {
            return Err(CloudscError::InvalidGrid {
                dimension: "ny",
                value: ny,
            });
        }
        if nz == 0 {
            return Err(CloudscError::InvalidGrid {
                dimension: "nz",
                value: nz,
            });
        }
        Ok(Self { nx, ny, nz })
    }

    /// Number of columns
    #[must_use]
    pub const fn nx(&self) -> usize {
        self.nx
    }

    /// Size of the degenerate horizontal axis (always 1)
    #[must_use]
    pub const fn ny(&self) -> usize {
        self.ny
    }

    /// Number of full levels
    #[must_use]
    pub const fn nz(&self) -> usize {
        self.nz
    }

    /// Number of full levels (alias of [`Self::nz`])
    #[must_use]
    pub const fn full_levels(&self) -> usize {
        self.nz
    }

    /// Number of interface levels, `nz + 1`
    #[must_use]
    pub const fn interface_levels(&self) -> usize {
        self.nz + 1
    }

    /// Array shape `(nx, ny, nk)` of a field with the given placement
    #[must_use]
    pub const fn shape(&self, placement: GridPlacement) -> (usize, usize, usize) {
        (self.nx, self.ny, placement.levels(self))
    }

    /// Number of values stored by a field with the given placement
    #[must_use]
    pub const fn len(&self, placement: GridPlacement) -> usize {
        self.nx * self.ny * placement.levels(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_shapes() {
        let grid = ComputationalGrid::new(4, 1, 10).unwrap();
        assert_eq!(grid.full_levels(), 10);
        assert_eq!(grid.interface_levels(), 11);
        assert_eq!(grid.shape(GridPlacement::Columns), (4, 1, 1));
        assert_eq!(grid.shape(GridPlacement::FullLevels), (4, 1, 10));
        assert_eq!(grid.shape(GridPlacement::Interfaces), (4, 1, 11));
        assert_eq!(grid.len(GridPlacement::Interfaces), 44);
    }

    #[test]
    fn test_grid_rejects_empty_dimensions() {
        assert!(matches!(
            ComputationalGrid::new(0, 1, 10),
            Err(CloudscError::InvalidGrid { dimension: "nx", .. })
        ));
        assert!(matches!(
            ComputationalGrid::new(3, 1, 0),
            Err(CloudscError::InvalidGrid { dimension: "nz", .. })
        ));
        assert!(matches!(
            ComputationalGrid::new(3, 2, 5),
            Err(CloudscError::InvalidGrid { dimension: "ny", .. })
        ));
    }

    #[test]
    fn test_placement_from_rank() {
        assert_eq!(
            GridPlacement::from_rank("f_lsm", 2, false).unwrap(),
            GridPlacement::Columns
        );
        assert_eq!(
            GridPlacement::from_rank("f_aph", 3, true).unwrap(),
            GridPlacement::Interfaces
        );
        assert!(matches!(
            GridPlacement::from_rank("f_bad", 4, false),
            Err(CloudscError::InvalidRank { rank: 4, .. })
        ));
    }
}
