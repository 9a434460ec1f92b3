/// Timing helpers for engine calls and their stages.
///
/// Provides an RAII profiling scope and the performance-reporter collaborator that
/// receives call and stage timings.
use std::sync::Mutex;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::trace;

/// A profiling scope that measures elapsed time using RAII.
///
/// The elapsed time is traced when dropped.
pub struct ProfilerScope {
    start: Instant,
    name: &'static str,
}

impl ProfilerScope {
    /// Creates a new profiling scope.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Name the scope was opened with.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for ProfilerScope {
    fn drop(&mut self) {
        trace!(stage = self.name, elapsed_ms = self.elapsed_ms(), "stage finished");
    }
}

/// Read-only observer of engine timings
pub trait PerformanceReporter: Send + Sync {
    /// Elapsed wall time of one full call
    fn record_call(&self, elapsed_ms: f64);

    /// Elapsed wall time of one stage within a call
    fn record_stage(&self, stage: &'static str, elapsed_ms: f64);
}

/// Accumulated timings of one stage
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StageTiming {
    pub calls: usize,
    pub total_ms: f64,
}

/// In-memory [`PerformanceReporter`]
#[derive(Debug, Default)]
pub struct ExecInfo {
    calls: Mutex<Vec<f64>>,
    stages: Mutex<FxHashMap<&'static str, StageTiming>>,
}

impl ExecInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-call elapsed times in milliseconds, in arrival order
    #[must_use]
    pub fn call_times_ms(&self) -> Vec<f64> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Accumulated timing of `stage`
    #[must_use]
    pub fn stage(&self, stage: &str) -> Option<StageTiming> {
        self.stages.lock().ok()?.get(stage).copied()
    }

    /// Drop everything recorded so far
    pub fn reset(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
        if let Ok(mut stages) = self.stages.lock() {
            stages.clear();
        }
    }
}

impl PerformanceReporter for ExecInfo {
    fn record_call(&self, elapsed_ms: f64) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(elapsed_ms);
        }
    }

    fn record_stage(&self, stage: &'static str, elapsed_ms: f64) {
        if let Ok(mut stages) = self.stages.lock() {
            let timing = stages.entry(stage).or_default();
            timing.calls += 1;
            timing.total_ms += elapsed_ms;
        }
    }
}
