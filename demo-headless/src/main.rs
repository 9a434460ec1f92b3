use std::process::ExitCode;
use std::fmt;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use cloudsc_core::{
    create_engine, create_engine_with_reporter, validate, CloudMicrophysics, CloudscResult,
    ComputationalGrid, DiagnosticBundle, EngineConfig, EngineReference, ExecInfo, ExecutionMode,
    LiteralSet, ParameterGroups, PerformanceReporter, ReferenceProvider, StateProvider,
    SyntheticColumns, TendencyBundle,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Estimated floating-point operations per grid point and call
const FLOPS_PER_POINT: f64 = 398.0;

/// Floating-point width of the fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Precision {
    Double,
    Single,
}

/// Cloud microphysics benchmark driver
#[derive(Parser, Debug)]
#[command(name = "cloudsc-bench")]
#[command(about = "Time the cloud microphysics engine on synthetic columns", long_about = None)]
struct Args {
    /// Number of columns
    #[arg(long, default_value_t = 1024)]
    num_cols: usize,

    /// Number of timed runs after the warm-up
    #[arg(long, default_value_t = 15)]
    num_runs: usize,

    /// Number of full levels
    #[arg(long, default_value_t = 137)]
    nlev: usize,

    /// Execution strategy (fused, split)
    #[arg(long, default_value = "fused")]
    variant: ExecutionMode,

    /// Field precision (only double is built)
    #[arg(long, value_enum, default_value_t = Precision::Double)]
    precision: Precision,

    /// Operation count per grid point used for the MFLOPS estimate
    #[arg(long, default_value_t = FLOPS_PER_POINT)]
    flops_per_point: f64,

    /// Timestep in seconds
    #[arg(long, default_value_t = 3600.0)]
    timestep: f64,

    /// Check bundles against the schema on every call
    #[arg(long, overrides_with = "disable_checks")]
    enable_checks: bool,

    /// Skip bundle checks
    #[arg(long)]
    disable_checks: bool,

    /// Validate against the other strategy
    #[arg(long)]
    enable_validation: bool,

    /// Absolute validation tolerance
    #[arg(long, default_value_t = 1e-12)]
    atol: f64,

    /// Relative validation tolerance
    #[arg(long, default_value_t = 1e-12)]
    rtol: f64,

    /// Seed of the input perturbation
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Relative amplitude of the input perturbation (0 disables it)
    #[arg(long, default_value_t = 0.1)]
    perturbation: f64,
}

fn mean_and_stddev(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    if samples.len() < 2 {
        return (mean, 0.0);
    }
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Runtime and MFLOPS statistics over the timed runs
#[derive(Debug, Clone, Copy, PartialEq)]
struct PerformanceSummary {
    runs: usize,
    runtime_mean_ms: f64,
    runtime_stddev_ms: f64,
    mflops_mean: f64,
    mflops_stddev: f64,
}

impl PerformanceSummary {
    /// `None` without any timed run
    fn new(points: usize, flops_per_point: f64, runtimes_ms: &[f64]) -> Option<Self> {
        if runtimes_ms.is_empty() {
            return None;
        }
        let flops = flops_per_point * points as f64;
        // flop per microsecond is MFLOPS
        let mflops: Vec<f64> = runtimes_ms.iter().map(|ms| flops / (ms * 1000.0)).collect();
        let (runtime_mean_ms, runtime_stddev_ms) = mean_and_stddev(runtimes_ms);
        let (mflops_mean, mflops_stddev) = mean_and_stddev(&mflops);
        Some(Self {
            runs: runtimes_ms.len(),
            runtime_mean_ms,
            runtime_stddev_ms,
            mflops_mean,
            mflops_stddev,
        })
    }
}

impl fmt::Display for PerformanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} ms +- {:.3} ms, {:.1} MFLOPS +- {:.1} MFLOPS over {} runs",
            self.runtime_mean_ms,
            self.runtime_stddev_ms,
            self.mflops_mean,
            self.mflops_stddev,
            self.runs
        )
    }
}

/// Millions of grid points per second over every call of a stage
fn stage_throughput(points: usize, calls: usize, total_ms: f64) -> f64 {
    points as f64 * calls as f64 / (total_ms * 1000.0)
}

fn run(args: &Args) -> CloudscResult<bool> {
    let grid = ComputationalGrid::new(args.num_cols, 1, args.nlev)?;
    let groups = ParameterGroups::ifs_defaults();
    let literals = LiteralSet::standard(args.nlev);
    let config = EngineConfig {
        mode: args.variant,
        enable_checks: args.enable_checks || !args.disable_checks,
    };

    let exec_info = Arc::new(ExecInfo::new());
    let reporter: Arc<dyn PerformanceReporter> = exec_info.clone();
    let engine = create_engine_with_reporter(grid, &groups, &literals, &config, Some(reporter))?;

    let state = SyntheticColumns::new()
        .with_perturbation(args.perturbation, args.seed)
        .state(&grid)?;
    let mut tendencies = TendencyBundle::zeros(&grid);
    let mut diagnostics = DiagnosticBundle::zeros(&grid);

    // Warm-up: fills the scratch pool
    engine.evaluate_into(&state, args.timestep, &mut tendencies, &mut diagnostics)?;
    exec_info.reset();

    for _ in 0..args.num_runs {
        engine.evaluate_into(&state, args.timestep, &mut tendencies, &mut diagnostics)?;
    }

    let points = grid.nx() * grid.nz();
    let runtimes = exec_info.call_times_ms();
    if let Some(summary) = PerformanceSummary::new(points, args.flops_per_point, &runtimes) {
        println!(
            "{} ({:?}) on {} columns x {} levels: {summary}",
            engine.mode(),
            args.precision,
            grid.nx(),
            grid.nz(),
        );
    }
    for stage in ["tendency", "flux"] {
        if let Some(timing) = exec_info.stage(stage) {
            println!(
                "  {stage:<9} {:.3} ms/call, {:.2} Mpoints/s",
                timing.total_ms / timing.calls as f64,
                stage_throughput(points, timing.calls, timing.total_ms)
            );
        }
    }

    if !args.enable_validation {
        return Ok(true);
    }

    let reference_config = EngineConfig {
        mode: args.variant.other(),
        ..config
    };
    let reference_engine = create_engine(grid, &groups, &literals, &reference_config)?;
    let reference = EngineReference::new(reference_engine.as_ref(), &state, args.timestep);
    let (ref_tendencies, ref_diagnostics) = reference.reference(&grid)?;
    let report = validate(
        (&tendencies, &diagnostics),
        (&ref_tendencies, &ref_diagnostics),
        args.atol,
        args.rtol,
    );
    print!("{report}");
    if report.passed() {
        info!("Validation against {} passed", reference_config.mode);
    } else {
        error!(
            "Validation against {} failed for {} fields",
            reference_config.mode,
            report.failures().count()
        );
    }
    Ok(report.passed())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    if args.precision == Precision::Single {
        error!("Single precision is not built; fields are f64");
        return ExitCode::FAILURE;
    }
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_stddev_uses_sample_variance() {
        let (mean, stddev) = mean_and_stddev(&[2.0, 4.0, 6.0]);
        assert_eq!(mean, 4.0);
        assert_eq!(stddev, 2.0);
        assert_eq!(mean_and_stddev(&[3.0]), (3.0, 0.0));
    }

    #[test]
    fn test_summary_converts_runtimes_to_mflops() {
        // 1000 points x 400 flop in 1 ms and 2 ms
        let summary = PerformanceSummary::new(1000, 400.0, &[1.0, 2.0]).unwrap();
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.runtime_mean_ms, 1.5);
        assert_eq!(summary.mflops_mean, 300.0);
        assert!((summary.mflops_stddev - 100.0 * 2.0_f64.sqrt()).abs() < 1e-9);
        assert!(summary.to_string().contains("300.0 MFLOPS"));
        assert!(PerformanceSummary::new(1000, 400.0, &[]).is_none());
    }

    #[test]
    fn test_stage_throughput() {
        assert_eq!(stage_throughput(2000, 4, 8.0), 1.0);
    }

    #[test]
    fn test_precision_flag_parses() {
        let args = Args::try_parse_from(["cloudsc-bench", "--precision", "single"]).unwrap();
        assert_eq!(args.precision, Precision::Single);
        let args = Args::try_parse_from(["cloudsc-bench"]).unwrap();
        assert_eq!(args.precision, Precision::Double);
        assert_eq!(args.flops_per_point, FLOPS_PER_POINT);
    }
}
