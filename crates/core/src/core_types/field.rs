//! Named field storage on the computational grid
//!
//! Values are stored column-contiguous (`i * nk + k`) so that the vertical sweep of a
//! column reads and writes one contiguous slice, and columns can be handed to worker
//! threads as disjoint `&mut [T]` chunks.

use crate::error::{CloudscError, CloudscResult};
use crate::grid::{ComputationalGrid, GridPlacement};

use super::schema::FieldSpec;

/// Field data container
///
/// `T` is `bool`, `i32` or `f64` according to the field's schema element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T> {
    name: &'static str,
    placement: GridPlacement,
    nx: usize,
    nk: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Field<T> {
    /// Create a field for `spec` on `grid`, initialized to the default value
    ///
    /// # Arguments
    ///
    /// * `grid` - Computational grid
    /// * `spec` - Schema entry giving name and placement
    ///
    /// # Returns
    ///
    /// New field with every value set to `T::default()`
    #[must_use]
    pub fn zeros(grid: &ComputationalGrid, spec: &FieldSpec) -> Self {
        Self::filled(grid, spec, T::default())
    }

    /// Create a field for `spec` on `grid`, initialized to `value`
    #[must_use]
    pub fn filled(grid: &ComputationalGrid, spec: &FieldSpec, value: T) -> Self {
        let nk = spec.placement.levels(grid);
        Self {
            name: spec.name,
            placement: spec.placement,
            nx: grid.nx(),
            nk,
            data: vec![value; grid.nx() * nk],
        }
    }

    /// Build a field by evaluating `f(i, k)` at every point
    #[must_use]
    pub fn from_fn(
        grid: &ComputationalGrid,
        spec: &FieldSpec,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        let mut field = Self::zeros(grid, spec);
        for i in 0..field.nx {
            for k in 0..field.nk {
                field.data[i * field.nk + k] = f(i, k);
            }
        }
        field
    }
}

impl<T: Copy> Field<T> {
    /// Wrap a row-major `(nx, ny)` or `(nx, ny, nk)` array produced outside the crate
    ///
    /// The placement is derived from the array's rank and vertical extent and must
    /// agree with `spec`. With `ny = 1` the row-major layout is already
    /// column-contiguous, so `data` is taken over as is.
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::InvalidRank`] for arrays that are neither 2D nor 3D, and
    /// [`CloudscError::PlacementMismatch`] when the derived placement, the shape or the
    /// number of values disagrees with `spec` on `grid`.
    pub fn from_array(
        grid: &ComputationalGrid,
        spec: &FieldSpec,
        shape: &[usize],
        data: Vec<T>,
    ) -> CloudscResult<Self> {
        let staggered = shape.len() == 3 && shape[2] == grid.interface_levels();
        let placement = GridPlacement::from_rank(spec.name, shape.len(), staggered)?;
        let (nx, ny, nk) = grid.shape(placement);
        let expected_shape = [nx, ny, nk];
        let expected_len = grid.len(spec.placement);
        if placement != spec.placement
            || *shape != expected_shape[..placement.rank()]
            || data.len() != expected_len
        {
            return Err(CloudscError::PlacementMismatch {
                field: spec.name.to_owned(),
                expected: spec.placement,
                expected_len,
                found: placement,
                found_len: data.len(),
            });
        }
        Ok(Self {
            name: spec.name,
            placement,
            nx,
            nk,
            data,
        })
    }

    /// Schema name (`f_t`, `b_convection_on`, ...)
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Vertical placement
    #[must_use]
    pub fn placement(&self) -> GridPlacement {
        self.placement
    }

    /// Number of columns
    #[must_use]
    pub fn columns(&self) -> usize {
        self.nx
    }

    /// Number of vertical values per column
    #[must_use]
    pub fn levels(&self) -> usize {
        self.nk
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get value at column `i`, level `k`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, i: usize, k: usize) -> T {
        assert!(i < self.nx && k < self.nk, "Coordinates out of bounds");
        self.data[i * self.nk + k]
    }

    /// Set value at column `i`, level `k`
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn set(&mut self, i: usize, k: usize, value: T) {
        assert!(i < self.nx && k < self.nk, "Coordinates out of bounds");
        self.data[i * self.nk + k] = value;
    }

    /// Vertical profile of column `i`
    #[must_use]
    pub fn column(&self, i: usize) -> &[T] {
        &self.data[i * self.nk..(i + 1) * self.nk]
    }

    /// Disjoint mutable profiles of all columns, in column order
    pub fn columns_mut(&mut self) -> std::slice::ChunksMut<'_, T> {
        self.data.chunks_mut(self.nk)
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Check that the field matches its schema entry on `grid`
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::PlacementMismatch`] when the placement or the number of
    /// stored values disagrees with the schema.
    pub fn check_against(&self, grid: &ComputationalGrid, spec: &FieldSpec) -> CloudscResult<()> {
        let expected_len = grid.len(spec.placement);
        if self.placement != spec.placement
            || self.data.len() != expected_len
            || self.nx != grid.nx()
        {
            return Err(CloudscError::PlacementMismatch {
                field: spec.name.to_owned(),
                expected: spec.placement,
                expected_len,
                found: self.placement,
                found_len: self.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::schema::{lookup, STATE_SCHEMA};

    fn grid() -> ComputationalGrid {
        ComputationalGrid::new(3, 1, 4).unwrap()
    }

    #[test]
    fn test_field_creation() {
        let spec = lookup(&STATE_SCHEMA, "f_t").unwrap();
        let field: Field<f64> = Field::zeros(&grid(), spec);
        assert_eq!(field.columns(), 3);
        assert_eq!(field.levels(), 4);
        assert_eq!(field.as_slice().len(), 12);
        assert!(field.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_field_get_set_is_column_contiguous() {
        let spec = lookup(&STATE_SCHEMA, "f_aph").unwrap();
        let mut field: Field<f64> = Field::zeros(&grid(), spec);
        assert_eq!(field.levels(), 5);
        field.set(1, 2, 42.0);
        assert_eq!(field.get(1, 2), 42.0);
        assert_eq!(field.as_slice()[5 + 2], 42.0);
        assert_eq!(field.column(1)[2], 42.0);
    }

    #[test]
    #[should_panic(expected = "Coordinates out of bounds")]
    fn test_field_bounds_check() {
        let spec = lookup(&STATE_SCHEMA, "f_t").unwrap();
        let field: Field<f64> = Field::zeros(&grid(), spec);
        let _ = field.get(0, 4);
    }

    #[test]
    fn test_check_against_rejects_wrong_placement() {
        let t_spec = lookup(&STATE_SCHEMA, "f_t").unwrap();
        let aph_spec = lookup(&STATE_SCHEMA, "f_aph").unwrap();
        let field: Field<f64> = Field::zeros(&grid(), t_spec);
        assert!(field.check_against(&grid(), t_spec).is_ok());
        assert!(matches!(
            field.check_against(&grid(), aph_spec),
            Err(CloudscError::PlacementMismatch { .. })
        ));
    }

    #[test]
    fn test_from_array_derives_placement() {
        let g = grid();
        let aph_spec = lookup(&STATE_SCHEMA, "f_aph").unwrap();
        let aph = Field::from_array(&g, aph_spec, &[3, 1, 5], vec![1.0; 15]).unwrap();
        assert_eq!(aph.placement(), GridPlacement::Interfaces);
        assert_eq!(aph.levels(), 5);

        let lsm_spec = lookup(&STATE_SCHEMA, "f_lsm").unwrap();
        let lsm = Field::from_array(&g, lsm_spec, &[3, 1], vec![0.0, 1.0, 1.0]).unwrap();
        assert_eq!(lsm.placement(), GridPlacement::Columns);
        assert_eq!(lsm.get(2, 0), 1.0);
    }

    #[test]
    fn test_from_array_rejects_bad_rank() {
        let spec = lookup(&STATE_SCHEMA, "f_t").unwrap();
        for shape in [&[12][..], &[3, 1, 4, 1][..]] {
            let err = Field::from_array(&grid(), spec, shape, vec![0.0; 12]).unwrap_err();
            assert_eq!(
                err,
                CloudscError::InvalidRank {
                    field: "f_t".into(),
                    rank: shape.len()
                }
            );
        }
    }

    #[test]
    fn test_from_array_rejects_staggered_full_level_field() {
        let spec = lookup(&STATE_SCHEMA, "f_t").unwrap();
        let err = Field::from_array(&grid(), spec, &[3, 1, 5], vec![0.0; 15]).unwrap_err();
        assert!(matches!(
            err,
            CloudscError::PlacementMismatch {
                expected: GridPlacement::FullLevels,
                found: GridPlacement::Interfaces,
                ..
            }
        ));
        // Right rank, wrong column count
        assert!(Field::from_array(&grid(), spec, &[2, 1, 4], vec![0.0; 8]).is_err());
    }
}
