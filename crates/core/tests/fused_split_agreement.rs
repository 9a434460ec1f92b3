//! Fused and split strategies agree on randomized inputs
mod common;

use cloudsc_core::physics::LiteralValue;
use cloudsc_core::{
    create_engine, validate, CloudMicrophysics, ComputationalGrid, EngineConfig, EngineReference,
    ExecutionMode, LiteralSet, ParameterGroups, ReferenceProvider,
};
use common::{engine, synthetic_state};

const ATOL: f64 = 1e-12;
const RTOL: f64 = 1e-12;

#[test]
fn test_fused_and_split_agree_on_random_states() {
    let grid = ComputationalGrid::new(24, 1, 50).unwrap();
    let fused = engine(grid, ExecutionMode::Fused);
    let split = engine(grid, ExecutionMode::Split);
    for seed in [1, 17, 123, 4242] {
        let state = synthetic_state(&grid, 0.3, seed);
        for dt in [300.0, 3600.0] {
            let (t, d) = fused.evaluate(&state, dt).unwrap();
            let (rt, rd) = split.evaluate(&state, dt).unwrap();
            let report = validate((&t, &d), (&rt, &rd), ATOL, RTOL);
            assert!(report.passed(), "seed {seed}, dt {dt}:\n{report}");
        }
    }
}

#[test]
fn test_engine_reference_matches_direct_evaluation() {
    let grid = ComputationalGrid::new(6, 1, 25).unwrap();
    let state = synthetic_state(&grid, 0.2, 77);
    let split = engine(grid, ExecutionMode::Split);
    let reference = EngineReference::new(split.as_ref(), &state, 900.0);
    let (rt, rd) = reference.reference(&grid).unwrap();

    let fused = engine(grid, ExecutionMode::Fused);
    let (t, d) = fused.evaluate(&state, 900.0).unwrap();
    assert!(validate((&t, &d), (&rt, &rd), ATOL, RTOL).passed());
}

#[test]
fn test_agreement_with_permuted_species_order() {
    let grid = ComputationalGrid::new(8, 1, 40).unwrap();
    let mut groups = ParameterGroups::ifs_defaults();
    for (key, index) in [
        ("NCLDQV", 1.0),
        ("NCLDQS", 2.0),
        ("NCLDQR", 3.0),
        ("NCLDQI", 4.0),
        ("NCLDQL", 5.0),
    ] {
        groups.yoecldp.insert(key, index);
    }
    let mut literals = LiteralSet::standard(40);
    literals.insert("EVAPRAIN", LiteralValue::Index(1));
    let build = |mode| {
        let config = EngineConfig {
            mode,
            enable_checks: true,
        };
        create_engine(grid, &groups, &literals, &config).unwrap()
    };
    let state = synthetic_state(&grid, 0.25, 5);
    let (t, d) = build(ExecutionMode::Fused).evaluate(&state, 1800.0).unwrap();
    let (rt, rd) = build(ExecutionMode::Split).evaluate(&state, 1800.0).unwrap();
    assert!(validate((&t, &d), (&rt, &rd), ATOL, RTOL).passed());
}
