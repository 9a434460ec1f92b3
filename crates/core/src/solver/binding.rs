//! Kernel argument bindings of the execution stages
//!
//! Each stage binds a fixed set of bundle fields to kernel arguments. The sets are
//! read off the static schema once per engine, and the per-call checks walk them, so
//! a field is validated exactly when some stage of the engine reads or writes it.

use std::fmt;

use super::ExecutionMode;
use crate::core_types::schema::{
    FieldSpec, DIAGNOSTIC_SCHEMA, INTERMEDIATE_SCHEMA, STATE_SCHEMA, TENDENCY_SCHEMA,
};

/// Owner of a bound field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSource {
    /// Caller's input state
    State,
    /// Caller's tendency outputs
    Tendencies,
    /// Caller's diagnostic outputs
    Diagnostics,
    /// Engine-owned split intermediates
    Intermediates,
}

impl fmt::Display for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::State => "state",
            Self::Tendencies => "tendencies",
            Self::Diagnostics => "diagnostics",
            Self::Intermediates => "intermediates",
        })
    }
}

/// One kernel argument and the bundle field behind it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundField {
    pub argument: &'static str,
    pub source: FieldSource,
    pub spec: &'static FieldSpec,
}

/// Arguments of one stage, in schema order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBinding {
    pub stage: &'static str,
    pub arguments: Vec<BoundField>,
}

impl StageBinding {
    /// Field bound to a kernel argument
    #[must_use]
    pub fn argument(&self, argument: &str) -> Option<&BoundField> {
        self.arguments.iter().find(|bound| bound.argument == argument)
    }

    /// Kernel argument a bundle field is bound to
    #[must_use]
    pub fn argument_of(&self, source: FieldSource, name: &str) -> Option<&'static str> {
        self.arguments
            .iter()
            .find(|bound| bound.source == source && bound.spec.name == name)
            .map(|bound| bound.argument)
    }
}

type ArgumentOf = fn(&FieldSpec) -> Option<&'static str>;

fn bind(
    source: FieldSource,
    schema: &'static [FieldSpec],
    argument_of: ArgumentOf,
) -> impl Iterator<Item = BoundField> {
    schema.iter().filter_map(move |spec| {
        Some(BoundField {
            argument: argument_of(spec)?,
            source,
            spec,
        })
    })
}

/// Bindings of every stage `mode` runs, in execution order
#[must_use]
pub fn stage_bindings(mode: ExecutionMode) -> Vec<StageBinding> {
    use FieldSource::{Diagnostics, Intermediates, State, Tendencies};

    match mode {
        ExecutionMode::Fused => {
            let kernel: ArgumentOf = FieldSpec::kernel_argument;
            vec![StageBinding {
                stage: "tendency",
                arguments: bind(State, &STATE_SCHEMA, kernel)
                    .chain(bind(Tendencies, &TENDENCY_SCHEMA, kernel))
                    .chain(bind(Diagnostics, &DIAGNOSTIC_SCHEMA, kernel))
                    .collect(),
            }]
        }
        ExecutionMode::Split => {
            let tendency: ArgumentOf = FieldSpec::tendency_argument;
            let flux: ArgumentOf = FieldSpec::flux_argument;
            vec![
                StageBinding {
                    stage: "tendency",
                    arguments: bind(State, &STATE_SCHEMA, tendency)
                        .chain(bind(Tendencies, &TENDENCY_SCHEMA, tendency))
                        .chain(bind(Diagnostics, &DIAGNOSTIC_SCHEMA, tendency))
                        .chain(bind(Intermediates, &INTERMEDIATE_SCHEMA, tendency))
                        .collect(),
                },
                StageBinding {
                    stage: "flux",
                    arguments: bind(State, &STATE_SCHEMA, flux)
                        .chain(bind(Intermediates, &INTERMEDIATE_SCHEMA, flux))
                        .chain(bind(Diagnostics, &DIAGNOSTIC_SCHEMA, flux))
                        .collect(),
                },
            ]
        }
    }
}
