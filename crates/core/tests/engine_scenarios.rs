//! End-to-end engine scenarios
mod common;

use std::sync::Arc;

use cloudsc_core::physics::saturation::foeeice;
use cloudsc_core::physics::{Constants, LiteralValue};
use cloudsc_core::{
    create_engine, create_engine_with_reporter, validate, CloudMicrophysics, CloudscError,
    ComputationalGrid, DiagnosticBundle, EngineConfig, ExecInfo, ExecutionMode, LiteralSet,
    ParameterGroups, PerformanceReporter, StateBundle, TendencyBundle,
};
use common::{dry_column, engine, synthetic_state};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DT: f64 = 3600.0;

fn assert_inert(grid: ComputationalGrid, state: &StateBundle) {
    for mode in [ExecutionMode::Fused, ExecutionMode::Split] {
        let (tendencies, diagnostics) = engine(grid, mode).evaluate(state, DT).unwrap();
        for (name, field) in tendencies.named_fields() {
            assert!(
                field.as_slice().iter().all(|v| v.abs() < 1e-18),
                "{mode}: tendency {name} not zero"
            );
        }
        for (name, field) in diagnostics.named_fields() {
            assert!(
                field.as_slice().iter().all(|v| v.abs() < 1e-18),
                "{mode}: diagnostic {name} not zero"
            );
        }
    }
}

#[test]
fn test_scenario_b_dry_column_is_inert() {
    let (grid, state) = dry_column(8, 285.0, 2.0e-3);
    assert_inert(grid, &state);
}

#[test]
fn test_scenario_b_subfreezing_column_is_inert() {
    // Ice-subsaturated below the triple point, where the Koop limit applies
    let (grid, state) = dry_column(8, 250.0, 1.0e-5);
    let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(8)).unwrap();
    for k in 0..grid.nz() {
        let ap = state.ap.get(0, k);
        assert!(state.t.get(0, k) < c.thermo.rtt);
        assert!(state.qv.get(0, k) < foeeice(&c, 250.0) / ap);
    }
    assert_inert(grid, &state);
}

#[test]
fn test_single_level_grid_runs_in_both_modes() {
    let grid = ComputationalGrid::new(6, 1, 1).unwrap();
    let state = synthetic_state(&grid, 0.2, 31);
    let (t, d) = engine(grid, ExecutionMode::Fused).evaluate(&state, DT).unwrap();
    let (rt, rd) = engine(grid, ExecutionMode::Split).evaluate(&state, DT).unwrap();
    for (name, field) in t.named_fields().into_iter().chain(d.named_fields()) {
        assert!(
            field.as_slice().iter().all(|v| v.is_finite()),
            "{name} not finite"
        );
    }
    assert_eq!(d.fplsl.as_slice().len(), 6 * 2);
    assert!(validate((&t, &d), (&rt, &rd), 1e-12, 1e-12).passed());

    let (dry_grid, dry) = dry_column(1, 285.0, 2.0e-3);
    assert_inert(dry_grid, &dry);
}

#[test]
fn test_scenario_c_missing_literal_fails_construction() {
    let grid = ComputationalGrid::new(4, 1, 10).unwrap();
    let mut literals = LiteralSet::standard(10);
    literals.remove("VQS");
    let result = create_engine(
        grid,
        &ParameterGroups::ifs_defaults(),
        &literals,
        &EngineConfig::default(),
    );
    assert!(matches!(
        result,
        Err(CloudscError::MissingConstant { ref key }) if key == "VQS"
    ));
}

#[test]
fn test_missing_fall_speed_source_fails_construction() {
    let grid = ComputationalGrid::new(4, 1, 10).unwrap();
    let mut groups = ParameterGroups::ifs_defaults();
    groups.yrecldp.remove("RVRAIN");
    let config = EngineConfig {
        mode: ExecutionMode::Split,
        enable_checks: true,
    };
    let result = create_engine(grid, &groups, &LiteralSet::standard(10), &config);
    assert!(matches!(result, Err(CloudscError::MissingSourceKey { .. })));
}

#[test]
fn test_checks_reject_state_from_another_grid() {
    let grid = ComputationalGrid::new(4, 1, 10).unwrap();
    let other = ComputationalGrid::new(4, 1, 12).unwrap();
    let state = StateBundle::zeros(&other);
    let result = engine(grid, ExecutionMode::Fused).evaluate(&state, DT);
    assert!(matches!(
        result,
        Err(CloudscError::PlacementMismatch { .. })
    ));
}

#[test]
fn test_precipitation_fluxes_are_non_negative() {
    let grid = ComputationalGrid::new(16, 1, 40).unwrap();
    for seed in 0..4 {
        let state = synthetic_state(&grid, 0.2, seed);
        let (_, diagnostics) = engine(grid, ExecutionMode::Fused)
            .evaluate(&state, DT)
            .unwrap();
        for field in [&diagnostics.fplsl, &diagnostics.fplsn] {
            assert!(
                field.as_slice().iter().all(|&v| v >= 0.0),
                "{} has negative values (seed {seed})",
                field.name()
            );
        }
        assert!(diagnostics
            .covptot
            .as_slice()
            .iter()
            .all(|&v| (0.0..=1.0).contains(&v)));
    }
}

#[test]
fn test_precipitation_non_negative_on_random_inputs() {
    let grid = ComputationalGrid::new(32, 1, 30).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..4 {
        let mut state = synthetic_state(&grid, 0.0, 0);
        for i in 0..grid.nx() {
            for k in 0..grid.nz() {
                state.t.set(i, k, rng.random_range(200.0..305.0));
                state.qv.set(i, k, rng.random_range(0.0..0.02));
                state.a.set(i, k, rng.random_range(0.0..=1.0));
                for field in [&mut state.ql, &mut state.qi, &mut state.qr, &mut state.qs] {
                    field.set(i, k, rng.random_range(0.0..1.0e-3));
                }
                state.lude.set(i, k, rng.random_range(0.0..1.0e-4));
                state.snde.set(i, k, rng.random_range(0.0..1.0e-5));
                state.supsat.set(i, k, rng.random_range(0.0..1.0e-6));
            }
        }
        for mode in [ExecutionMode::Fused, ExecutionMode::Split] {
            let (_, diagnostics) = engine(grid, mode).evaluate(&state, DT).unwrap();
            for field in [&diagnostics.fplsl, &diagnostics.fplsn] {
                assert!(
                    field.as_slice().iter().all(|&v| v >= 0.0),
                    "{mode}: {} has negative values",
                    field.name()
                );
            }
            for field in [&diagnostics.fhpsl, &diagnostics.fhpsn] {
                assert!(field.as_slice().iter().all(|&v| v <= 0.0));
            }
        }
    }
}

#[test]
fn test_synthetic_columns_precipitate() {
    let grid = ComputationalGrid::new(4, 1, 40).unwrap();
    let state = synthetic_state(&grid, 0.0, 0);
    let (tendencies, diagnostics) = engine(grid, ExecutionMode::Fused)
        .evaluate(&state, DT)
        .unwrap();
    let surface = grid.nz();
    let surface_precip: f64 = (0..grid.nx())
        .map(|i| diagnostics.fplsl.get(i, surface) + diagnostics.fplsn.get(i, surface))
        .sum();
    assert!(surface_precip > 0.0);
    assert!(tendencies.t.as_slice().iter().any(|&v| v != 0.0));
    assert!(tendencies.t.as_slice().iter().all(|v| v.is_finite()));
}

#[test]
fn test_evaluate_into_overwrites_outputs() {
    let grid = ComputationalGrid::new(4, 1, 30).unwrap();
    let state = synthetic_state(&grid, 0.1, 3);
    let engine = engine(grid, ExecutionMode::Split);
    let (expected_t, expected_d) = engine.evaluate(&state, DT).unwrap();

    let mut tendencies = TendencyBundle::zeros(&grid);
    let mut diagnostics = DiagnosticBundle::zeros(&grid);
    tendencies.qv.fill(f64::NAN);
    diagnostics.fsqlf.fill(42.0);
    diagnostics.rainfrac_toprfz.fill(-1.0);
    for _ in 0..3 {
        engine
            .evaluate_into(&state, DT, &mut tendencies, &mut diagnostics)
            .unwrap();
        assert_eq!(tendencies, expected_t);
        assert_eq!(diagnostics, expected_d);
    }
}

#[test]
fn test_results_are_deterministic_across_threads() {
    let grid = ComputationalGrid::new(12, 1, 30).unwrap();
    let state = synthetic_state(&grid, 0.15, 9);
    let engine = engine(grid, ExecutionMode::Fused);
    let (reference, _) = engine.evaluate(&state, DT).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.evaluate(&state, DT).unwrap().0))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), reference);
        }
    });
}

#[test]
fn test_reporter_receives_stage_timings() {
    let grid = ComputationalGrid::new(4, 1, 20).unwrap();
    let state = synthetic_state(&grid, 0.0, 0);
    let info = Arc::new(ExecInfo::new());
    let reporter: Arc<dyn PerformanceReporter> = info.clone();
    let config = EngineConfig {
        mode: ExecutionMode::Split,
        enable_checks: false,
    };
    let engine = create_engine_with_reporter(
        grid,
        &ParameterGroups::ifs_defaults(),
        &LiteralSet::standard(20),
        &config,
        Some(reporter),
    )
    .unwrap();
    engine.evaluate(&state, DT).unwrap();
    engine.evaluate(&state, DT).unwrap();

    assert_eq!(info.call_times_ms().len(), 2);
    assert_eq!(info.stage("tendency").map(|s| s.calls), Some(2));
    assert_eq!(info.stage("flux").map(|s| s.calls), Some(2));
}

#[test]
fn test_sundqvist_schemes_run() {
    let grid = ComputationalGrid::new(4, 1, 30).unwrap();
    let state = synthetic_state(&grid, 0.1, 1);
    let mut literals = LiteralSet::standard(30);
    literals.insert("WARMRAIN", LiteralValue::Index(1));
    literals.insert("EVAPRAIN", LiteralValue::Index(1));
    let engine = create_engine(
        grid,
        &ParameterGroups::ifs_defaults(),
        &literals,
        &EngineConfig::default(),
    )
    .unwrap();
    let (tendencies, diagnostics) = engine.evaluate(&state, DT).unwrap();
    assert!(tendencies.qr.as_slice().iter().all(|v| v.is_finite()));
    assert!(diagnostics.fplsl.as_slice().iter().all(|&v| v >= 0.0));
}
