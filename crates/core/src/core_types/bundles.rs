//! State, tendency and diagnostic bundles
//!
//! Bundles own one [`Field`] per schema entry. Kernels never see a bundle directly:
//! they receive per-column views holding plain slices, which is what lets the engines
//! hand disjoint columns to worker threads.

use crate::core_types::field::Field;
use crate::core_types::schema::{
    lookup, ElementType, FieldSpec, DIAGNOSTIC_SCHEMA, STATE_SCHEMA, TENDENCY_SCHEMA,
};
use crate::error::{CloudscError, CloudscResult};
use crate::field_spec;
use crate::grid::ComputationalGrid;

/// Prognostic and forcing inputs of one call
///
/// Populated by a state provider, read-only during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBundle {
    /// Convection active in the column
    pub convection_on: Field<bool>,
    /// Cloud fraction
    pub a: Field<f64>,
    /// Full-level pressure
    pub ap: Field<f64>,
    /// Interface pressure
    pub aph: Field<f64>,
    /// Cloud condensation nuclei
    pub ccn: Field<f64>,
    /// Long-wave heating rate
    pub hrlw: Field<f64>,
    /// Short-wave heating rate
    pub hrsw: Field<f64>,
    /// Aerosol-aware critical ice content
    pub icrit_aer: Field<f64>,
    /// Aerosol-aware critical liquid content
    pub lcrit_aer: Field<f64>,
    /// Land-sea mask
    pub lsm: Field<f64>,
    /// Convective updraught condensate
    pub lu: Field<f64>,
    /// Convective detrainment of condensate
    pub lude: Field<f64>,
    /// Convective downdraught mass flux
    pub mfd: Field<f64>,
    /// Convective updraught mass flux
    pub mfu: Field<f64>,
    /// Ice number concentration
    pub nice: Field<f64>,
    /// Cloud ice
    pub qi: Field<f64>,
    /// Cloud liquid
    pub ql: Field<f64>,
    /// Rain
    pub qr: Field<f64>,
    /// Snow
    pub qs: Field<f64>,
    /// Water vapour
    pub qv: Field<f64>,
    /// Ice effective radius
    pub re_ice: Field<f64>,
    /// Convective detrainment of snow
    pub snde: Field<f64>,
    /// Externally diagnosed supersaturation
    pub supsat: Field<f64>,
    /// Temperature
    pub t: Field<f64>,
    /// Cloud fraction tendency from earlier physics
    pub tnd_tmp_a: Field<f64>,
    /// Ice tendency from earlier physics
    pub tnd_tmp_qi: Field<f64>,
    /// Liquid tendency from earlier physics
    pub tnd_tmp_ql: Field<f64>,
    /// Rain tendency from earlier physics
    pub tnd_tmp_qr: Field<f64>,
    /// Snow tendency from earlier physics
    pub tnd_tmp_qs: Field<f64>,
    /// Vapour tendency from earlier physics
    pub tnd_tmp_qv: Field<f64>,
    /// Temperature tendency from earlier physics
    pub tnd_tmp_t: Field<f64>,
    /// Turbulent ice flux source
    pub vfi: Field<f64>,
    /// Turbulent liquid flux source
    pub vfl: Field<f64>,
    /// Vertical velocity
    pub w: Field<f64>,
    /// Convection type code
    pub convection_type: Field<i32>,
}

/// Read-only view of one state column
#[derive(Debug, Clone, Copy)]
pub struct StateColumn<'a> {
    pub convection_on: bool,
    pub convection_type: i32,
    pub lsm: f64,
    pub a: &'a [f64],
    pub ap: &'a [f64],
    pub aph: &'a [f64],
    pub ccn: &'a [f64],
    pub hrlw: &'a [f64],
    pub hrsw: &'a [f64],
    pub icrit_aer: &'a [f64],
    pub lcrit_aer: &'a [f64],
    pub lu: &'a [f64],
    pub lude: &'a [f64],
    pub mfd: &'a [f64],
    pub mfu: &'a [f64],
    pub nice: &'a [f64],
    pub qi: &'a [f64],
    pub ql: &'a [f64],
    pub qr: &'a [f64],
    pub qs: &'a [f64],
    pub qv: &'a [f64],
    pub re_ice: &'a [f64],
    pub snde: &'a [f64],
    pub supsat: &'a [f64],
    pub t: &'a [f64],
    pub tnd_tmp_a: &'a [f64],
    pub tnd_tmp_qi: &'a [f64],
    pub tnd_tmp_ql: &'a [f64],
    pub tnd_tmp_qr: &'a [f64],
    pub tnd_tmp_qs: &'a [f64],
    pub tnd_tmp_qv: &'a [f64],
    pub tnd_tmp_t: &'a [f64],
    pub vfi: &'a [f64],
    pub vfl: &'a [f64],
    pub w: &'a [f64],
}

impl StateBundle {
    /// Allocate a zero-initialized state on `grid`
    #[must_use]
    pub fn zeros(grid: &ComputationalGrid) -> Self {
        Self {
            convection_on: Field::zeros(grid, field_spec!(STATE_SCHEMA, "b_convection_on")),
            a: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_a")),
            ap: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_ap")),
            aph: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_aph")),
            ccn: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_ccn")),
            hrlw: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_hrlw")),
            hrsw: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_hrsw")),
            icrit_aer: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_icrit_aer")),
            lcrit_aer: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_lcrit_aer")),
            lsm: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_lsm")),
            lu: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_lu")),
            lude: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_lude")),
            mfd: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_mfd")),
            mfu: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_mfu")),
            nice: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_nice")),
            qi: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_qi")),
            ql: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_ql")),
            qr: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_qr")),
            qs: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_qs")),
            qv: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_qv")),
            re_ice: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_re_ice")),
            snde: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_snde")),
            supsat: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_supsat")),
            t: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_t")),
            tnd_tmp_a: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_a")),
            tnd_tmp_qi: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_qi")),
            tnd_tmp_ql: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_ql")),
            tnd_tmp_qr: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_qr")),
            tnd_tmp_qs: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_qs")),
            tnd_tmp_qv: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_qv")),
            tnd_tmp_t: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_tnd_tmp_t")),
            vfi: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_vfi")),
            vfl: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_vfl")),
            w: Field::zeros(grid, field_spec!(STATE_SCHEMA, "f_w")),
            convection_type: Field::zeros(grid, field_spec!(STATE_SCHEMA, "i_convection_type")),
        }
    }

    /// Float field by bundle name
    #[must_use]
    pub fn float_field(&self, name: &str) -> Option<&Field<f64>> {
        Some(match name {
            "f_a" => &self.a,
            "f_ap" => &self.ap,
            "f_aph" => &self.aph,
            "f_ccn" => &self.ccn,
            "f_hrlw" => &self.hrlw,
            "f_hrsw" => &self.hrsw,
            "f_icrit_aer" => &self.icrit_aer,
            "f_lcrit_aer" => &self.lcrit_aer,
            "f_lsm" => &self.lsm,
            "f_lu" => &self.lu,
            "f_lude" => &self.lude,
            "f_mfd" => &self.mfd,
            "f_mfu" => &self.mfu,
            "f_nice" => &self.nice,
            "f_qi" => &self.qi,
            "f_ql" => &self.ql,
            "f_qr" => &self.qr,
            "f_qs" => &self.qs,
            "f_qv" => &self.qv,
            "f_re_ice" => &self.re_ice,
            "f_snde" => &self.snde,
            "f_supsat" => &self.supsat,
            "f_t" => &self.t,
            "f_tnd_tmp_a" => &self.tnd_tmp_a,
            "f_tnd_tmp_qi" => &self.tnd_tmp_qi,
            "f_tnd_tmp_ql" => &self.tnd_tmp_ql,
            "f_tnd_tmp_qr" => &self.tnd_tmp_qr,
            "f_tnd_tmp_qs" => &self.tnd_tmp_qs,
            "f_tnd_tmp_qv" => &self.tnd_tmp_qv,
            "f_tnd_tmp_t" => &self.tnd_tmp_t,
            "f_vfi" => &self.vfi,
            "f_vfl" => &self.vfl,
            "f_w" => &self.w,
            _ => return None,
        })
    }

    /// Mutable float field by bundle name
    pub fn float_field_mut(&mut self, name: &str) -> Option<&mut Field<f64>> {
        Some(match name {
            "f_a" => &mut self.a,
            "f_ap" => &mut self.ap,
            "f_aph" => &mut self.aph,
            "f_ccn" => &mut self.ccn,
            "f_hrlw" => &mut self.hrlw,
            "f_hrsw" => &mut self.hrsw,
            "f_icrit_aer" => &mut self.icrit_aer,
            "f_lcrit_aer" => &mut self.lcrit_aer,
            "f_lsm" => &mut self.lsm,
            "f_lu" => &mut self.lu,
            "f_lude" => &mut self.lude,
            "f_mfd" => &mut self.mfd,
            "f_mfu" => &mut self.mfu,
            "f_nice" => &mut self.nice,
            "f_qi" => &mut self.qi,
            "f_ql" => &mut self.ql,
            "f_qr" => &mut self.qr,
            "f_qs" => &mut self.qs,
            "f_qv" => &mut self.qv,
            "f_re_ice" => &mut self.re_ice,
            "f_snde" => &mut self.snde,
            "f_supsat" => &mut self.supsat,
            "f_t" => &mut self.t,
            "f_tnd_tmp_a" => &mut self.tnd_tmp_a,
            "f_tnd_tmp_qi" => &mut self.tnd_tmp_qi,
            "f_tnd_tmp_ql" => &mut self.tnd_tmp_ql,
            "f_tnd_tmp_qr" => &mut self.tnd_tmp_qr,
            "f_tnd_tmp_qs" => &mut self.tnd_tmp_qs,
            "f_tnd_tmp_qv" => &mut self.tnd_tmp_qv,
            "f_tnd_tmp_t" => &mut self.tnd_tmp_t,
            "f_vfi" => &mut self.vfi,
            "f_vfl" => &mut self.vfl,
            "f_w" => &mut self.w,
            _ => return None,
        })
    }

    /// Replace a float field with a row-major array produced by a state provider
    ///
    /// # Arguments
    ///
    /// * `grid` - Grid the bundle lives on
    /// * `name` - Bundle name of a float state field (`f_t`)
    /// * `shape` - `(nx, ny)` for column fields, `(nx, ny, nk)` for level fields
    /// * `data` - Values in row-major order
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::UnknownField`] when `name` is not a float state field,
    /// [`CloudscError::InvalidRank`] or [`CloudscError::PlacementMismatch`] when the
    /// array does not fit the field's schema entry.
    pub fn load(
        &mut self,
        grid: &ComputationalGrid,
        name: &str,
        shape: &[usize],
        data: Vec<f64>,
    ) -> CloudscResult<()> {
        let unknown = || CloudscError::UnknownField {
            name: name.to_owned(),
        };
        let spec = lookup(&STATE_SCHEMA, name)
            .filter(|spec| spec.element == ElementType::Float)
            .ok_or_else(unknown)?;
        let field = Field::from_array(grid, spec, shape, data)?;
        *self.float_field_mut(name).ok_or_else(unknown)? = field;
        Ok(())
    }

    /// Check every field against the state schema on `grid`
    ///
    /// # Errors
    ///
    /// Returns the first [`CloudscError::PlacementMismatch`] found.
    pub fn check(&self, grid: &ComputationalGrid) -> CloudscResult<()> {
        STATE_SCHEMA
            .iter()
            .try_for_each(|spec| self.check_field(grid, spec))
    }

    /// Check the field behind one state schema entry
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::UnknownField`] if no state field has the entry's name,
    /// [`CloudscError::PlacementMismatch`] if the field does not fit it.
    pub fn check_field(&self, grid: &ComputationalGrid, spec: &FieldSpec) -> CloudscResult<()> {
        match spec.name {
            "b_convection_on" => self.convection_on.check_against(grid, spec),
            "i_convection_type" => self.convection_type.check_against(grid, spec),
            name => check_named(self.float_field(name), grid, spec),
        }
    }

    /// View of column `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a column of the bundle.
    #[must_use]
    pub fn column(&self, i: usize) -> StateColumn<'_> {
        StateColumn {
            convection_on: self.convection_on.get(i, 0),
            convection_type: self.convection_type.get(i, 0),
            lsm: self.lsm.get(i, 0),
            a: self.a.column(i),
            ap: self.ap.column(i),
            aph: self.aph.column(i),
            ccn: self.ccn.column(i),
            hrlw: self.hrlw.column(i),
            hrsw: self.hrsw.column(i),
            icrit_aer: self.icrit_aer.column(i),
            lcrit_aer: self.lcrit_aer.column(i),
            lu: self.lu.column(i),
            lude: self.lude.column(i),
            mfd: self.mfd.column(i),
            mfu: self.mfu.column(i),
            nice: self.nice.column(i),
            qi: self.qi.column(i),
            ql: self.ql.column(i),
            qr: self.qr.column(i),
            qs: self.qs.column(i),
            qv: self.qv.column(i),
            re_ice: self.re_ice.column(i),
            snde: self.snde.column(i),
            supsat: self.supsat.column(i),
            t: self.t.column(i),
            tnd_tmp_a: self.tnd_tmp_a.column(i),
            tnd_tmp_qi: self.tnd_tmp_qi.column(i),
            tnd_tmp_ql: self.tnd_tmp_ql.column(i),
            tnd_tmp_qr: self.tnd_tmp_qr.column(i),
            tnd_tmp_qs: self.tnd_tmp_qs.column(i),
            tnd_tmp_qv: self.tnd_tmp_qv.column(i),
            tnd_tmp_t: self.tnd_tmp_t.column(i),
            vfi: self.vfi.column(i),
            vfl: self.vfl.column(i),
            w: self.w.column(i),
        }
    }
}

fn check_named(
    field: Option<&Field<f64>>,
    grid: &ComputationalGrid,
    spec: &FieldSpec,
) -> CloudscResult<()> {
    match field {
        Some(field) => field.check_against(grid, spec),
        None => Err(CloudscError::UnknownField {
            name: spec.name.to_owned(),
        }),
    }
}

/// Per-variable rates of change produced by one call
#[derive(Debug, Clone, PartialEq)]
pub struct TendencyBundle {
    pub a: Field<f64>,
    pub t: Field<f64>,
    pub qv: Field<f64>,
    pub ql: Field<f64>,
    pub qi: Field<f64>,
    pub qr: Field<f64>,
    pub qs: Field<f64>,
}

/// Mutable view of one tendency column
#[derive(Debug)]
pub struct TendencyColumn<'a> {
    pub a: &'a mut [f64],
    pub t: &'a mut [f64],
    pub qv: &'a mut [f64],
    pub ql: &'a mut [f64],
    pub qi: &'a mut [f64],
    pub qr: &'a mut [f64],
    pub qs: &'a mut [f64],
}

impl TendencyBundle {
    /// Allocate zeroed tendencies on `grid`
    #[must_use]
    pub fn zeros(grid: &ComputationalGrid) -> Self {
        Self {
            a: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_a")),
            t: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_t")),
            qv: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_qv")),
            ql: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_ql")),
            qi: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_qi")),
            qr: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_qr")),
            qs: Field::zeros(grid, field_spec!(TENDENCY_SCHEMA, "f_qs")),
        }
    }

    /// Field by bundle name
    #[must_use]
    pub fn float_field(&self, name: &str) -> Option<&Field<f64>> {
        Some(match name {
            "f_a" => &self.a,
            "f_t" => &self.t,
            "f_qv" => &self.qv,
            "f_ql" => &self.ql,
            "f_qi" => &self.qi,
            "f_qr" => &self.qr,
            "f_qs" => &self.qs,
            _ => return None,
        })
    }

    /// Fields in schema order
    #[must_use]
    pub fn named_fields(&self) -> Vec<(&'static str, &Field<f64>)> {
        TENDENCY_SCHEMA
            .iter()
            .filter_map(|spec| self.float_field(spec.name).map(|f| (spec.name, f)))
            .collect()
    }

    /// Check every field against the tendency schema on `grid`
    ///
    /// # Errors
    ///
    /// Returns the first [`CloudscError::PlacementMismatch`] found.
    pub fn check(&self, grid: &ComputationalGrid) -> CloudscResult<()> {
        TENDENCY_SCHEMA
            .iter()
            .try_for_each(|spec| self.check_field(grid, spec))
    }

    /// Check the field behind one schema entry
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::UnknownField`] if no field has the entry's name,
    /// [`CloudscError::PlacementMismatch`] if the field does not fit it.
    pub fn check_field(&self, grid: &ComputationalGrid, spec: &FieldSpec) -> CloudscResult<()> {
        check_named(self.float_field(spec.name), grid, spec)
    }

    /// Disjoint mutable column views, in column order
    pub fn columns_mut(&mut self) -> Vec<TendencyColumn<'_>> {
        let mut a = self.a.columns_mut();
        let mut t = self.t.columns_mut();
        let mut qv = self.qv.columns_mut();
        let mut ql = self.ql.columns_mut();
        let mut qi = self.qi.columns_mut();
        let mut qr = self.qr.columns_mut();
        let mut qs = self.qs.columns_mut();
        std::iter::from_fn(move || {
            Some(TendencyColumn {
                a: a.next()?,
                t: t.next()?,
                qv: qv.next()?,
                ql: ql.next()?,
                qi: qi.next()?,
                qr: qr.next()?,
                qs: qs.next()?,
            })
        })
        .collect()
    }
}

/// Flux and overlap diagnostics produced by one call
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticBundle {
    pub covptot: Field<f64>,
    pub fcqlng: Field<f64>,
    pub fcqnng: Field<f64>,
    pub fcqrng: Field<f64>,
    pub fcqsng: Field<f64>,
    pub fhpsl: Field<f64>,
    pub fhpsn: Field<f64>,
    pub fplsl: Field<f64>,
    pub fplsn: Field<f64>,
    pub fsqif: Field<f64>,
    pub fsqitur: Field<f64>,
    pub fsqlf: Field<f64>,
    pub fsqltur: Field<f64>,
    pub fsqrf: Field<f64>,
    pub fsqsf: Field<f64>,
    pub rainfrac_toprfz: Field<f64>,
}

/// Overlap diagnostics of one column, written by the tendency stage
#[derive(Debug)]
pub struct OverlapColumn<'a> {
    pub covptot: &'a mut [f64],
    pub rainfrac_toprfz: &'a mut f64,
}

/// Interface fluxes of one column
#[derive(Debug)]
pub struct FluxColumn<'a> {
    pub fcqlng: &'a mut [f64],
    pub fcqnng: &'a mut [f64],
    pub fcqrng: &'a mut [f64],
    pub fcqsng: &'a mut [f64],
    pub fhpsl: &'a mut [f64],
    pub fhpsn: &'a mut [f64],
    pub fplsl: &'a mut [f64],
    pub fplsn: &'a mut [f64],
    pub fsqif: &'a mut [f64],
    pub fsqitur: &'a mut [f64],
    pub fsqlf: &'a mut [f64],
    pub fsqltur: &'a mut [f64],
    pub fsqrf: &'a mut [f64],
    pub fsqsf: &'a mut [f64],
}

impl FluxColumn<'_> {
    /// Every flux profile, in schema order
    pub fn all_mut(&mut self) -> [&mut [f64]; 14] {
        [
            &mut *self.fcqlng,
            &mut *self.fcqnng,
            &mut *self.fcqrng,
            &mut *self.fcqsng,
            &mut *self.fhpsl,
            &mut *self.fhpsn,
            &mut *self.fplsl,
            &mut *self.fplsn,
            &mut *self.fsqif,
            &mut *self.fsqitur,
            &mut *self.fsqlf,
            &mut *self.fsqltur,
            &mut *self.fsqrf,
            &mut *self.fsqsf,
        ]
    }
}

impl DiagnosticBundle {
    /// Allocate zeroed diagnostics on `grid`
    #[must_use]
    pub fn zeros(grid: &ComputationalGrid) -> Self {
        Self {
            covptot: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_covptot")),
            fcqlng: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fcqlng")),
            fcqnng: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fcqnng")),
            fcqrng: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fcqrng")),
            fcqsng: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fcqsng")),
            fhpsl: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fhpsl")),
            fhpsn: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fhpsn")),
            fplsl: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fplsl")),
            fplsn: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fplsn")),
            fsqif: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqif")),
            fsqitur: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqitur")),
            fsqlf: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqlf")),
            fsqltur: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqltur")),
            fsqrf: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqrf")),
            fsqsf: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_fsqsf")),
            rainfrac_toprfz: Field::zeros(grid, field_spec!(DIAGNOSTIC_SCHEMA, "f_rainfrac_toprfz")),
        }
    }

    /// Field by bundle name
    #[must_use]
    pub fn float_field(&self, name: &str) -> Option<&Field<f64>> {
        Some(match name {
            "f_covptot" => &self.covptot,
            "f_fcqlng" => &self.fcqlng,
            "f_fcqnng" => &self.fcqnng,
            "f_fcqrng" => &self.fcqrng,
            "f_fcqsng" => &self.fcqsng,
            "f_fhpsl" => &self.fhpsl,
            "f_fhpsn" => &self.fhpsn,
            "f_fplsl" => &self.fplsl,
            "f_fplsn" => &self.fplsn,
            "f_fsqif" => &self.fsqif,
            "f_fsqitur" => &self.fsqitur,
            "f_fsqlf" => &self.fsqlf,
            "f_fsqltur" => &self.fsqltur,
            "f_fsqrf" => &self.fsqrf,
            "f_fsqsf" => &self.fsqsf,
            "f_rainfrac_toprfz" => &self.rainfrac_toprfz,
            _ => return None,
        })
    }

    /// Fields in schema order
    #[must_use]
    pub fn named_fields(&self) -> Vec<(&'static str, &Field<f64>)> {
        DIAGNOSTIC_SCHEMA
            .iter()
            .filter_map(|spec| self.float_field(spec.name).map(|f| (spec.name, f)))
            .collect()
    }

    /// Check every field against the diagnostic schema on `grid`
    ///
    /// # Errors
    ///
    /// Returns the first [`CloudscError::PlacementMismatch`] found.
    pub fn check(&self, grid: &ComputationalGrid) -> CloudscResult<()> {
        DIAGNOSTIC_SCHEMA
            .iter()
            .try_for_each(|spec| self.check_field(grid, spec))
    }

    /// Check the field behind one schema entry
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::UnknownField`] if no field has the entry's name,
    /// [`CloudscError::PlacementMismatch`] if the field does not fit it.
    pub fn check_field(&self, grid: &ComputationalGrid, spec: &FieldSpec) -> CloudscResult<()> {
        check_named(self.float_field(spec.name), grid, spec)
    }

    /// Disjoint mutable column views, in column order
    pub fn columns_mut(&mut self) -> Vec<(OverlapColumn<'_>, FluxColumn<'_>)> {
        let mut covptot = self.covptot.columns_mut();
        let mut rainfrac = self.rainfrac_toprfz.columns_mut();
        let mut fcqlng = self.fcqlng.columns_mut();
        let mut fcqnng = self.fcqnng.columns_mut();
        let mut fcqrng = self.fcqrng.columns_mut();
        let mut fcqsng = self.fcqsng.columns_mut();
        let mut fhpsl = self.fhpsl.columns_mut();
        let mut fhpsn = self.fhpsn.columns_mut();
        let mut fplsl = self.fplsl.columns_mut();
        let mut fplsn = self.fplsn.columns_mut();
        let mut fsqif = self.fsqif.columns_mut();
        let mut fsqitur = self.fsqitur.columns_mut();
        let mut fsqlf = self.fsqlf.columns_mut();
        let mut fsqltur = self.fsqltur.columns_mut();
        let mut fsqrf = self.fsqrf.columns_mut();
        let mut fsqsf = self.fsqsf.columns_mut();
        std::iter::from_fn(move || {
            let overlap = OverlapColumn {
                covptot: covptot.next()?,
                rainfrac_toprfz: rainfrac.next()?.first_mut()?,
            };
            let fluxes = FluxColumn {
                fcqlng: fcqlng.next()?,
                fcqnng: fcqnng.next()?,
                fcqrng: fcqrng.next()?,
                fcqsng: fcqsng.next()?,
                fhpsl: fhpsl.next()?,
                fhpsn: fhpsn.next()?,
                fplsl: fplsl.next()?,
                fplsn: fplsn.next()?,
                fsqif: fsqif.next()?,
                fsqitur: fsqitur.next()?,
                fsqlf: fsqlf.next()?,
                fsqltur: fsqltur.next()?,
                fsqrf: fsqrf.next()?,
                fsqsf: fsqsf.next()?,
            };
            Some((overlap, fluxes))
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridPlacement;

    fn grid() -> ComputationalGrid {
        ComputationalGrid::new(2, 1, 3).unwrap()
    }

    #[test]
    fn test_zero_bundles_pass_schema_check() {
        let grid = grid();
        assert!(StateBundle::zeros(&grid).check(&grid).is_ok());
        assert!(TendencyBundle::zeros(&grid).check(&grid).is_ok());
        assert!(DiagnosticBundle::zeros(&grid).check(&grid).is_ok());
    }

    #[test]
    fn test_check_rejects_bundle_from_other_grid() {
        let other = ComputationalGrid::new(2, 1, 4).unwrap();
        let state = StateBundle::zeros(&other);
        assert!(matches!(
            state.check(&grid()),
            Err(CloudscError::PlacementMismatch { .. })
        ));
    }

    #[test]
    fn test_state_placements() {
        let state = StateBundle::zeros(&grid());
        assert_eq!(state.aph.placement(), GridPlacement::Interfaces);
        assert_eq!(state.lsm.placement(), GridPlacement::Columns);
        assert_eq!(state.convection_type.placement(), GridPlacement::Columns);
        assert_eq!(state.column(1).aph.len(), 4);
        assert_eq!(state.column(1).t.len(), 3);
    }

    #[test]
    fn test_named_fields_follow_schema_order() {
        let grid = grid();
        let names: Vec<_> = DiagnosticBundle::zeros(&grid)
            .named_fields()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.len(), 16);
        assert_eq!(names[0], "f_covptot");
        assert_eq!(names[15], "f_rainfrac_toprfz");
        assert_eq!(TendencyBundle::zeros(&grid).named_fields().len(), 7);
    }

    #[test]
    fn test_column_views_write_through() {
        let grid = grid();
        let mut diagnostics = DiagnosticBundle::zeros(&grid);
        {
            let mut columns = diagnostics.columns_mut();
            assert_eq!(columns.len(), 2);
            let (overlap, fluxes) = &mut columns[1];
            *overlap.rainfrac_toprfz = 0.5;
            fluxes.fplsl[3] = 1.0e-3;
        }
        assert_eq!(diagnostics.rainfrac_toprfz.get(1, 0), 0.5);
        assert_eq!(diagnostics.fplsl.get(1, 3), 1.0e-3);

        let mut tendencies = TendencyBundle::zeros(&grid);
        tendencies.columns_mut()[0].qv[2] = -1.0;
        assert_eq!(tendencies.qv.get(0, 2), -1.0);
    }
}
