//! Per-call scratch storage
//!
//! Every evaluation borrows one [`Temporaries`] set from the engine's [`ScratchPool`]
//! through a [`ScratchGuard`]. The guard hands the buffers back on drop, on the
//! error and unwind paths as well, so repeated calls reuse allocations while
//! concurrent calls never share them.

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use tracing::warn;

use crate::core_types::field::Field;
use crate::core_types::schema::{schema_position, INTERMEDIATE_SCHEMA};
use crate::grid::ComputationalGrid;
use crate::physics::species::Species::{self, Ice, Liquid, Rain, Snow};
use crate::physics::{ColumnTemporaries, FluxInputs};

const FOEALFA: usize = schema_position(&INTERMEDIATE_SCHEMA, "f_foealfa");
const LUDE: usize = schema_position(&INTERMEDIATE_SCHEMA, "f_lude");

/// Schema positions of the per-species intermediates: `lneg`, `pfpls`, `q0`, `qn`
const PER_SPECIES: [(Species, [usize; 4]); 4] = [
    (
        Liquid,
        [
            schema_position(&INTERMEDIATE_SCHEMA, "f_lneg_ql"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_pfplsl"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_ql0"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qln"),
        ],
    ),
    (
        Ice,
        [
            schema_position(&INTERMEDIATE_SCHEMA, "f_lneg_qi"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_pfplsi"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qi0"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qin"),
        ],
    ),
    (
        Rain,
        [
            schema_position(&INTERMEDIATE_SCHEMA, "f_lneg_qr"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_pfplsr"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qr0"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qrn"),
        ],
    ),
    (
        Snow,
        [
            schema_position(&INTERMEDIATE_SCHEMA, "f_lneg_qs"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_pfplss"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qs0"),
            schema_position(&INTERMEDIATE_SCHEMA, "f_qsn"),
        ],
    ),
];

/// The 18 full-level fields bridging the split tendency stage to the flux stage
///
/// Stored in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateFields {
    fields: Vec<Field<f64>>,
}

/// Mutable view of one column of every intermediate, in schema order
#[derive(Debug)]
pub struct IntermediateColumn<'a> {
    slices: Vec<&'a mut [f64]>,
}

impl IntermediateFields {
    /// Allocate zeroed intermediates on `grid`
    #[must_use]
    pub fn zeros(grid: &ComputationalGrid) -> Self {
        Self {
            fields: INTERMEDIATE_SCHEMA
                .iter()
                .map(|spec| Field::zeros(grid, spec))
                .collect(),
        }
    }

    /// Field by bundle name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field<f64>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Fields in schema order
    #[must_use]
    pub fn named_fields(&self) -> Vec<(&'static str, &Field<f64>)> {
        self.fields.iter().map(|f| (f.name(), f)).collect()
    }

    /// Flux-stage inputs stored for column `i`, level `k`
    ///
    /// The turbulent flux terms are not intermediates and come back as zero.
    #[must_use]
    pub fn load(&self, i: usize, k: usize) -> FluxInputs {
        let get = |pos: usize| self.fields[pos].get(i, k);
        let mut level = FluxInputs {
            foealfa: get(FOEALFA),
            lude: get(LUDE),
            ..FluxInputs::default()
        };
        for (species, [lneg, pfpls, q0, qn]) in PER_SPECIES {
            level.lneg[species] = get(lneg);
            level.pfpls[species] = get(pfpls);
            level.qx0[species] = get(q0);
            level.qxn[species] = get(qn);
        }
        level
    }

    /// Disjoint mutable column views, in column order
    pub fn columns_mut(&mut self) -> Vec<IntermediateColumn<'_>> {
        let nx = self.fields.first().map_or(0, Field::columns);
        let mut iters: Vec<_> = self.fields.iter_mut().map(Field::columns_mut).collect();
        (0..nx)
            .map(|_| IntermediateColumn {
                slices: iters.iter_mut().filter_map(Iterator::next).collect(),
            })
            .collect()
    }
}

impl IntermediateColumn<'_> {
    /// Store the flux-stage inputs of level `k`
    pub fn store(&mut self, k: usize, level: &FluxInputs) {
        self.slices[FOEALFA][k] = level.foealfa;
        self.slices[LUDE][k] = level.lude;
        for (species, [lneg, pfpls, q0, qn]) in PER_SPECIES {
            self.slices[lneg][k] = level.lneg[species];
            self.slices[pfpls][k] = level.pfpls[species];
            self.slices[q0][k] = level.qx0[species];
            self.slices[qn][k] = level.qxn[species];
        }
    }
}

/// Scratch buffers of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Temporaries {
    /// Column scalars, one set per column
    pub columns: Vec<ColumnTemporaries>,
    /// Split-mode bridge fields; `None` for the fused strategy
    pub intermediates: Option<IntermediateFields>,
}

impl Temporaries {
    #[must_use]
    pub fn new(grid: &ComputationalGrid, with_intermediates: bool) -> Self {
        Self {
            columns: vec![ColumnTemporaries::default(); grid.nx()],
            intermediates: with_intermediates.then(|| IntermediateFields::zeros(grid)),
        }
    }
}

/// Pool of reusable [`Temporaries`]
#[derive(Debug)]
pub struct ScratchPool {
    grid: ComputationalGrid,
    with_intermediates: bool,
    free: Mutex<Vec<Temporaries>>,
}

impl ScratchPool {
    #[must_use]
    pub fn new(grid: ComputationalGrid, with_intermediates: bool) -> Self {
        Self {
            grid,
            with_intermediates,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Borrow a scratch set for the duration of one call
    ///
    /// Reuses a returned set when one is available, otherwise allocates.
    pub fn acquire(&self) -> ScratchGuard<'_> {
        let reused = match self.free.lock() {
            Ok(mut free) => free.pop(),
            Err(_) => {
                warn!("Scratch pool lock poisoned, allocating fresh temporaries");
                None
            }
        };
        let tmp = reused.unwrap_or_else(|| Temporaries::new(&self.grid, self.with_intermediates));
        ScratchGuard {
            pool: self,
            tmp: Some(tmp),
        }
    }

    /// Number of idle scratch sets
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().map_or(0, |free| free.len())
    }

    fn release(&self, tmp: Temporaries) {
        match self.free.lock() {
            Ok(mut free) => free.push(tmp),
            Err(_) => warn!("Scratch pool lock poisoned, dropping returned temporaries"),
        }
    }
}

/// Scoped borrow of a [`Temporaries`] set
#[derive(Debug)]
pub struct ScratchGuard<'p> {
    pool: &'p ScratchPool,
    tmp: Option<Temporaries>,
}

impl Deref for ScratchGuard<'_> {
    type Target = Temporaries;

    fn deref(&self) -> &Temporaries {
        // Only `drop` takes the value out
        self.tmp.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for ScratchGuard<'_> {
    fn deref_mut(&mut self) -> &mut Temporaries {
        self.tmp.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        if let Some(tmp) = self.tmp.take() {
            self.pool.release(tmp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> ComputationalGrid {
        ComputationalGrid::new(3, 1, 4).unwrap()
    }

    #[test]
    fn test_guard_returns_buffers_on_drop() {
        let pool = ScratchPool::new(grid(), false);
        assert_eq!(pool.idle(), 0);
        {
            let tmp = pool.acquire();
            assert_eq!(tmp.columns.len(), 3);
            assert!(tmp.intermediates.is_none());
        }
        assert_eq!(pool.idle(), 1);
        let _again = pool.acquire();
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_concurrent_guards_are_disjoint() {
        let pool = ScratchPool::new(grid(), true);
        let mut a = pool.acquire();
        let b = pool.acquire();
        a.columns[0].covptot = 0.5;
        assert_eq!(b.columns[0].covptot, 0.0);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_guard_returns_buffers_on_unwind() {
        let pool = ScratchPool::new(grid(), false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _tmp = pool.acquire();
            panic!("stage failed");
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_intermediates_store_and_load() {
        let g = grid();
        let mut inter = IntermediateFields::zeros(&g);
        let mut level = FluxInputs {
            foealfa: 0.25,
            lude: 1.0e-5,
            ..FluxInputs::default()
        };
        level.lneg[Snow] = 2.0e-7;
        level.pfpls[Rain] = 3.0e-4;
        level.qx0[Ice] = 4.0e-5;
        level.qxn[Liquid] = 5.0e-5;
        level.vfl = 9.0;
        {
            let mut columns = inter.columns_mut();
            assert_eq!(columns.len(), 3);
            columns[1].store(2, &level);
        }
        let loaded = inter.load(1, 2);
        assert_eq!(loaded.foealfa, 0.25);
        assert_eq!(loaded.lneg[Snow], 2.0e-7);
        assert_eq!(loaded.pfpls[Rain], 3.0e-4);
        assert_eq!(loaded.qx0[Ice], 4.0e-5);
        assert_eq!(loaded.qxn[Liquid], 5.0e-5);
        assert_eq!(loaded.vfl, 0.0);
        assert_eq!(inter.field("f_qsn").map(|f| f.get(1, 2)), Some(0.0));
        assert_eq!(inter.named_fields().len(), 18);
        assert_eq!(inter.load(0, 2), FluxInputs::default());
    }
}
