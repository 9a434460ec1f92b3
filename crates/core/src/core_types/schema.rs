//! Static field catalogue
//!
//! Every field the engine consumes or produces is listed here once, with its grid
//! placement, element type, unit, and the kernel argument it binds to. Bundle names
//! carry a type prefix (`b_` bool, `i_` int, `f_` float); kernel arguments carry a
//! direction prefix (`in_`, `out_`, `out_tnd_loc_`). The mapping between the two is a
//! table lookup, never string surgery.

use crate::grid::GridPlacement;
use serde::Serialize;

/// Element type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementType {
    /// Boolean flag
    Bool,
    /// Integer code
    Int,
    /// Double precision value
    Float,
}

/// One schema entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Bundle name (`f_t`)
    pub name: &'static str,
    /// Argument name in the tendency stage (or fused kernel)
    pub stage_arg: &'static str,
    /// Argument name in the split flux stage, if that stage binds the field
    pub flux_stage_arg: Option<&'static str>,
    /// Whether the tendency stage binds the field
    pub tendency_stage: bool,
    /// Grid placement
    pub placement: GridPlacement,
    /// Element type
    pub element: ElementType,
    /// Physical unit
    pub units: &'static str,
}

impl FieldSpec {
    /// Argument bound by the single fused kernel
    #[must_use]
    pub const fn kernel_argument(&self) -> Option<&'static str> {
        Some(self.stage_arg)
    }

    /// Argument bound by the split tendency stage, if that stage uses the field
    #[must_use]
    pub const fn tendency_argument(&self) -> Option<&'static str> {
        if self.tendency_stage {
            Some(self.stage_arg)
        } else {
            None
        }
    }

    /// Argument bound by the split flux stage, if that stage uses the field
    #[must_use]
    pub const fn flux_argument(&self) -> Option<&'static str> {
        self.flux_stage_arg
    }
}

const fn input(name: &'static str, stage_arg: &'static str, units: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        stage_arg,
        flux_stage_arg: None,
        tendency_stage: true,
        placement: GridPlacement::FullLevels,
        element: ElementType::Float,
        units,
    }
}

const fn column(
    name: &'static str,
    stage_arg: &'static str,
    element: ElementType,
    units: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        stage_arg,
        flux_stage_arg: None,
        tendency_stage: true,
        placement: GridPlacement::Columns,
        element,
        units,
    }
}

const fn tendency(name: &'static str, stage_arg: &'static str, units: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        stage_arg,
        flux_stage_arg: None,
        tendency_stage: true,
        placement: GridPlacement::FullLevels,
        element: ElementType::Float,
        units,
    }
}

const fn flux(
    name: &'static str,
    stage_arg: &'static str,
    units: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        stage_arg,
        flux_stage_arg: Some(stage_arg),
        tendency_stage: false,
        placement: GridPlacement::Interfaces,
        element: ElementType::Float,
        units,
    }
}

const fn bridge(
    name: &'static str,
    stage_arg: &'static str,
    flux_stage_arg: &'static str,
    units: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        stage_arg,
        flux_stage_arg: Some(flux_stage_arg),
        tendency_stage: true,
        placement: GridPlacement::FullLevels,
        element: ElementType::Float,
        units,
    }
}

/// Prognostic and forcing inputs
pub const STATE_SCHEMA: [FieldSpec; 35] = [
    column("b_convection_on", "in_convection_on", ElementType::Bool, ""),
    input("f_a", "in_a", "1"),
    input("f_ap", "in_ap", "Pa"),
    FieldSpec {
        name: "f_aph",
        stage_arg: "in_aph",
        flux_stage_arg: Some("in_aph"),
        tendency_stage: true,
        placement: GridPlacement::Interfaces,
        element: ElementType::Float,
        units: "Pa",
    },
    input("f_ccn", "in_ccn", "cm^-3"),
    input("f_hrlw", "in_hrlw", "K s^-1"),
    input("f_hrsw", "in_hrsw", "K s^-1"),
    input("f_icrit_aer", "in_icrit_aer", "kg kg^-1"),
    input("f_lcrit_aer", "in_lcrit_aer", "kg kg^-1"),
    column("f_lsm", "in_lsm", ElementType::Float, "1"),
    input("f_lu", "in_lu", "kg kg^-1"),
    input("f_lude", "in_lude", "kg m^-3 s^-1"),
    input("f_mfd", "in_mfd", "kg m^-2 s^-1"),
    input("f_mfu", "in_mfu", "kg m^-2 s^-1"),
    input("f_nice", "in_nice", "cm^-3"),
    input("f_qi", "in_qi", "kg kg^-1"),
    input("f_ql", "in_ql", "kg kg^-1"),
    input("f_qr", "in_qr", "kg kg^-1"),
    input("f_qs", "in_qs", "kg kg^-1"),
    input("f_qv", "in_qv", "kg kg^-1"),
    input("f_re_ice", "in_re_ice", "um"),
    input("f_snde", "in_snde", "kg m^-3 s^-1"),
    input("f_supsat", "in_supsat", "kg kg^-1"),
    input("f_t", "in_t", "K"),
    input("f_tnd_tmp_a", "in_tnd_tmp_a", "s^-1"),
    input("f_tnd_tmp_qi", "in_tnd_tmp_qi", "kg kg^-1 s^-1"),
    input("f_tnd_tmp_ql", "in_tnd_tmp_ql", "kg kg^-1 s^-1"),
    input("f_tnd_tmp_qr", "in_tnd_tmp_qr", "kg kg^-1 s^-1"),
    input("f_tnd_tmp_qs", "in_tnd_tmp_qs", "kg kg^-1 s^-1"),
    input("f_tnd_tmp_qv", "in_tnd_tmp_qv", "kg kg^-1 s^-1"),
    input("f_tnd_tmp_t", "in_tnd_tmp_t", "K s^-1"),
    FieldSpec {
        name: "f_vfi",
        stage_arg: "in_vfi",
        flux_stage_arg: Some("in_vfi"),
        tendency_stage: false,
        placement: GridPlacement::FullLevels,
        element: ElementType::Float,
        units: "kg kg^-1 s^-1",
    },
    FieldSpec {
        name: "f_vfl",
        stage_arg: "in_vfl",
        flux_stage_arg: Some("in_vfl"),
        tendency_stage: false,
        placement: GridPlacement::FullLevels,
        element: ElementType::Float,
        units: "kg kg^-1 s^-1",
    },
    input("f_w", "in_w", "Pa s^-1"),
    column("i_convection_type", "in_convection_type", ElementType::Int, ""),
];

/// Rate-of-change outputs, one per prognostic variable
pub const TENDENCY_SCHEMA: [FieldSpec; 7] = [
    tendency("f_a", "out_tnd_loc_a", "s^-1"),
    tendency("f_t", "out_tnd_loc_t", "K s^-1"),
    tendency("f_qv", "out_tnd_loc_qv", "kg kg^-1 s^-1"),
    tendency("f_ql", "out_tnd_loc_ql", "kg kg^-1 s^-1"),
    tendency("f_qi", "out_tnd_loc_qi", "kg kg^-1 s^-1"),
    tendency("f_qr", "out_tnd_loc_qr", "kg kg^-1 s^-1"),
    tendency("f_qs", "out_tnd_loc_qs", "kg kg^-1 s^-1"),
];

/// Flux and overlap diagnostics
pub const DIAGNOSTIC_SCHEMA: [FieldSpec; 16] = [
    tendency("f_covptot", "out_covptot", "1"),
    flux("f_fcqlng", "out_fcqlng", "kg m^-2 s^-1"),
    flux("f_fcqnng", "out_fcqnng", "kg m^-2 s^-1"),
    flux("f_fcqrng", "out_fcqrng", "kg m^-2 s^-1"),
    flux("f_fcqsng", "out_fcqsng", "kg m^-2 s^-1"),
    flux("f_fhpsl", "out_fhpsl", "J m^-2 s^-1"),
    flux("f_fhpsn", "out_fhpsn", "J m^-2 s^-1"),
    flux("f_fplsl", "out_fplsl", "kg m^-2 s^-1"),
    flux("f_fplsn", "out_fplsn", "kg m^-2 s^-1"),
    flux("f_fsqif", "out_fsqif", "kg m^-2 s^-1"),
    flux("f_fsqitur", "out_fsqitur", "kg m^-2 s^-1"),
    flux("f_fsqlf", "out_fsqlf", "kg m^-2 s^-1"),
    flux("f_fsqltur", "out_fsqltur", "kg m^-2 s^-1"),
    flux("f_fsqrf", "out_fsqrf", "kg m^-2 s^-1"),
    flux("f_fsqsf", "out_fsqsf", "kg m^-2 s^-1"),
    column("f_rainfrac_toprfz", "out_rainfrac_toprfz", ElementType::Float, "1"),
];

/// Fields bridging the split tendency stage to the flux stage
pub const INTERMEDIATE_SCHEMA: [FieldSpec; 18] = [
    bridge("f_foealfa", "out_foealfa", "in_foealfa", "1"),
    bridge("f_lneg_qi", "out_lneg_qi", "in_lneg_qi", "kg kg^-1"),
    bridge("f_lneg_ql", "out_lneg_ql", "in_lneg_ql", "kg kg^-1"),
    bridge("f_lneg_qr", "out_lneg_qr", "in_lneg_qr", "kg kg^-1"),
    bridge("f_lneg_qs", "out_lneg_qs", "in_lneg_qs", "kg kg^-1"),
    bridge("f_lude", "out_lude", "in_lude", "kg kg^-1"),
    bridge("f_pfplsi", "out_pfplsi", "in_pfplsi", "kg m^-2 s^-1"),
    bridge("f_pfplsl", "out_pfplsl", "in_pfplsl", "kg m^-2 s^-1"),
    bridge("f_pfplsr", "out_pfplsr", "in_pfplsr", "kg m^-2 s^-1"),
    bridge("f_pfplss", "out_pfplss", "in_pfplss", "kg m^-2 s^-1"),
    bridge("f_qi0", "out_qi0", "in_qi0", "kg kg^-1"),
    bridge("f_qin", "out_qin", "in_qin", "kg kg^-1"),
    bridge("f_ql0", "out_ql0", "in_ql0", "kg kg^-1"),
    bridge("f_qln", "out_qln", "in_qln", "kg kg^-1"),
    bridge("f_qr0", "out_qr0", "in_qr0", "kg kg^-1"),
    bridge("f_qrn", "out_qrn", "in_qrn", "kg kg^-1"),
    bridge("f_qs0", "out_qs0", "in_qs0", "kg kg^-1"),
    bridge("f_qsn", "out_qsn", "in_qsn", "kg kg^-1"),
];

/// Position of `name` in `schema`, usable in constant context
///
/// # Panics
///
/// Panics (at compile time when const-evaluated) if `name` is not in `schema`.
#[must_use]
pub const fn schema_position(schema: &[FieldSpec], name: &str) -> usize {
    let mut idx = 0;
    while idx < schema.len() {
        if str_eq(schema[idx].name, name) {
            return idx;
        }
        idx += 1;
    }
    panic!("field not present in schema");
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Static schema entry by name, resolved at compile time
#[macro_export]
macro_rules! field_spec {
    ($schema:path, $name:literal) => {
        &$schema[const { $crate::core_types::schema::schema_position(&$schema, $name) }]
    };
}

/// Find a schema entry by bundle name
#[must_use]
pub fn lookup<'a>(schema: &'a [FieldSpec], name: &str) -> Option<&'a FieldSpec> {
    schema.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    fn assert_unique(schema: &[FieldSpec]) {
        let names: FxHashSet<_> = schema.iter().map(|s| s.name).collect();
        let args: FxHashSet<_> = schema.iter().map(|s| s.stage_arg).collect();
        assert_eq!(names.len(), schema.len());
        assert_eq!(args.len(), schema.len());
    }

    #[test]
    fn test_schema_names_and_arguments_are_unique() {
        assert_unique(&STATE_SCHEMA);
        assert_unique(&TENDENCY_SCHEMA);
        assert_unique(&DIAGNOSTIC_SCHEMA);
        assert_unique(&INTERMEDIATE_SCHEMA);
    }

    #[test]
    fn test_prefix_matches_element_type() {
        for spec in STATE_SCHEMA
            .iter()
            .chain(&TENDENCY_SCHEMA)
            .chain(&DIAGNOSTIC_SCHEMA)
        {
            let expected = match &spec.name[..2] {
                "b_" => ElementType::Bool,
                "i_" => ElementType::Int,
                _ => ElementType::Float,
            };
            assert_eq!(spec.element, expected, "{}", spec.name);
        }
    }

    #[test]
    fn test_stage_arguments() {
        let qv = lookup(&STATE_SCHEMA, "f_qv").unwrap();
        assert_eq!(qv.kernel_argument(), Some("in_qv"));
        assert_eq!(qv.tendency_argument(), Some("in_qv"));
        assert_eq!(qv.flux_argument(), None);

        let vfl = lookup(&STATE_SCHEMA, "f_vfl").unwrap();
        assert_eq!(vfl.tendency_argument(), None);
        assert_eq!(vfl.flux_argument(), Some("in_vfl"));

        let qln = lookup(&INTERMEDIATE_SCHEMA, "f_qln").unwrap();
        assert_eq!(qln.tendency_argument(), Some("out_qln"));
        assert_eq!(qln.flux_argument(), Some("in_qln"));

        let tnd = lookup(&TENDENCY_SCHEMA, "f_qv").unwrap();
        assert_eq!(tnd.kernel_argument(), Some("out_tnd_loc_qv"));
        assert!(lookup(&STATE_SCHEMA, "f_missing").is_none());
    }

    #[test]
    fn test_schema_position_matches_lookup() {
        let spec = crate::field_spec!(STATE_SCHEMA, "f_aph");
        assert_eq!(spec.placement, GridPlacement::Interfaces);
        assert_eq!(schema_position(&DIAGNOSTIC_SCHEMA, "f_rainfrac_toprfz"), 15);
    }

    #[test]
    fn test_split_binding_counts() {
        let untouched_by_stage_one: Vec<_> = STATE_SCHEMA
            .iter()
            .filter(|s| !s.tendency_stage)
            .map(|s| s.name)
            .collect();
        assert_eq!(untouched_by_stage_one, ["f_vfi", "f_vfl"]);

        let flux_outputs = DIAGNOSTIC_SCHEMA
            .iter()
            .filter(|s| s.flux_stage_arg.is_some())
            .count();
        assert_eq!(flux_outputs, 14);
        assert!(DIAGNOSTIC_SCHEMA
            .iter()
            .filter(|s| s.flux_stage_arg.is_some())
            .all(|s| s.placement == GridPlacement::Interfaces));
    }
}
