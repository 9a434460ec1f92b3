//! Tolerance validation of engine outputs against a reference
//!
//! A value passes when `|a - b| <= atol + rtol * |b|` with `b` the reference. NaN on
//! either side fails. Every field is checked; validation never stops at the first
//! failure and never raises an error.

use std::fmt;

use serde::Serialize;

use crate::core_types::{DiagnosticBundle, Field, TendencyBundle};

/// Outcome for one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReport {
    /// Bundle-qualified name (`tendencies/f_t`)
    pub name: String,
    pub passed: bool,
    /// Number of values outside tolerance
    pub mismatches: usize,
    pub max_abs_error: f64,
    pub max_rel_error: f64,
    /// Set when the field could not be compared at all
    pub note: Option<String>,
}

/// Per-field outcome of one validation
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValidationReport {
    pub fields: Vec<FieldReport>,
}

impl ValidationReport {
    /// Every field passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.fields.iter().all(|f| f.passed)
    }

    /// Fields that failed
    pub fn failures(&self) -> impl Iterator<Item = &FieldReport> {
        self.fields.iter().filter(|f| !f.passed)
    }

    /// Report for a bundle-qualified name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldReport> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in &self.fields {
            let status = if field.passed { "OK" } else { "FAIL" };
            write!(
                f,
                "{:<28} {:<4} max abs {:.3e} max rel {:.3e}",
                field.name, status, field.max_abs_error, field.max_rel_error
            )?;
            if field.mismatches > 0 {
                write!(f, " ({} mismatches)", field.mismatches)?;
            }
            if let Some(note) = &field.note {
                write!(f, " [{note}]")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Compare one field against its reference
#[must_use]
pub fn compare_field(
    name: String,
    produced: &Field<f64>,
    reference: &Field<f64>,
    atol: f64,
    rtol: f64,
) -> FieldReport {
    let (a, b) = (produced.as_slice(), reference.as_slice());
    if a.len() != b.len() {
        return FieldReport {
            name,
            passed: false,
            mismatches: a.len().max(b.len()),
            max_abs_error: f64::NAN,
            max_rel_error: f64::NAN,
            note: Some(format!("length {} vs reference {}", a.len(), b.len())),
        };
    }

    let mut mismatches = 0;
    let mut max_abs_error = 0.0_f64;
    let mut max_rel_error = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let abs = (x - y).abs();
        // NaN compares false and counts as a mismatch
        let within = abs <= atol + rtol * y.abs();
        if !within {
            mismatches += 1;
        }
        if abs.is_nan() {
            max_abs_error = f64::NAN;
            max_rel_error = f64::NAN;
        } else if !max_abs_error.is_nan() {
            max_abs_error = max_abs_error.max(abs);
            if y != 0.0 {
                max_rel_error = max_rel_error.max(abs / y.abs());
            }
        }
    }
    FieldReport {
        name,
        passed: mismatches == 0,
        mismatches,
        max_abs_error,
        max_rel_error,
        note: None,
    }
}

fn compare_named<'a>(
    report: &mut ValidationReport,
    bundle: &str,
    produced: &[(&'static str, &'a Field<f64>)],
    reference: &[(&'static str, &'a Field<f64>)],
    atol: f64,
    rtol: f64,
) {
    for &(name, field) in produced {
        let qualified = format!("{bundle}/{name}");
        let entry = match reference.iter().find(|(r, _)| *r == name) {
            Some((_, expected)) => compare_field(qualified, field, expected, atol, rtol),
            None => FieldReport {
                name: qualified,
                passed: false,
                mismatches: 0,
                max_abs_error: f64::NAN,
                max_rel_error: f64::NAN,
                note: Some("missing from reference".to_owned()),
            },
        };
        report.fields.push(entry);
    }
}

/// Validate tendencies and diagnostics against reference bundles
///
/// # Arguments
///
/// * `produced` - Outputs under test
/// * `reference` - Expected outputs
/// * `atol` - Absolute tolerance
/// * `rtol` - Relative tolerance, scaled by the reference magnitude
#[must_use]
pub fn validate(
    produced: (&TendencyBundle, &DiagnosticBundle),
    reference: (&TendencyBundle, &DiagnosticBundle),
    atol: f64,
    rtol: f64,
) -> ValidationReport {
    let mut report = ValidationReport::default();
    compare_named(
        &mut report,
        "tendencies",
        &produced.0.named_fields(),
        &reference.0.named_fields(),
        atol,
        rtol,
    );
    compare_named(
        &mut report,
        "diagnostics",
        &produced.1.named_fields(),
        &reference.1.named_fields(),
        atol,
        rtol,
    );
    report
}
