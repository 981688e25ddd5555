//! Observability infrastructure for the load test harness
//!
//! Provides:
//! - Prometheus metrics (fetch latency, sampler ticks and failures, samples
//!   collected, driver exit code, run progress)
//! - Structured logging of the run lifecycle with tracing

use crate::models::{DriverOutcome, RunResult, ShutdownStatus};
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for metrics endpoint latency (in seconds)
const FETCH_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HarnessMetricsInner> = OnceLock::new();

struct HarnessMetricsInner {
    fetch_latency_seconds: Histogram,
    sampler_ticks: IntCounter,
    sampler_failures: IntCounter,
    samples_collected: IntCounter,
    driver_exit_code: IntGauge,
    run_in_progress: IntGauge,
    shutdown_timeouts: IntCounter,
}

impl HarnessMetricsInner {
    fn new() -> Self {
        Self {
            fetch_latency_seconds: register_histogram!(
                "loadtest_fetch_latency_seconds",
                "Time spent fetching pod resources from the metrics endpoint",
                FETCH_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register fetch_latency_seconds"),

            sampler_ticks: register_int_counter!(
                "loadtest_sampler_ticks_total",
                "Total number of sampler poll attempts"
            )
            .expect("Failed to register sampler_ticks"),

            sampler_failures: register_int_counter!(
                "loadtest_sampler_failures_total",
                "Total number of failed sampler polls"
            )
            .expect("Failed to register sampler_failures"),

            samples_collected: register_int_counter!(
                "loadtest_samples_collected_total",
                "Total number of pod resource samples collected"
            )
            .expect("Failed to register samples_collected"),

            driver_exit_code: register_int_gauge!(
                "loadtest_driver_exit_code",
                "Exit code of the last traffic driver process (-1 if it did not exit normally)"
            )
            .expect("Failed to register driver_exit_code"),

            run_in_progress: register_int_gauge!(
                "loadtest_run_in_progress",
                "1 while a load test run is in progress"
            )
            .expect("Failed to register run_in_progress"),

            shutdown_timeouts: register_int_counter!(
                "loadtest_sampler_shutdown_timeouts_total",
                "Number of runs where the sampler did not join in time"
            )
            .expect("Failed to register shutdown_timeouts"),
        }
    }
}

/// Harness metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct HarnessMetrics {
    _private: (),
}

impl Default for HarnessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HarnessMetrics {
    /// Create a metrics handle (registers the global metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HarnessMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HarnessMetricsInner {
        GLOBAL_METRICS.get_or_init(HarnessMetricsInner::new)
    }

    pub fn observe_fetch_latency(&self, duration_secs: f64) {
        self.inner().fetch_latency_seconds.observe(duration_secs);
    }

    pub fn inc_sampler_ticks(&self) {
        self.inner().sampler_ticks.inc();
    }

    pub fn inc_sampler_failures(&self) {
        self.inner().sampler_failures.inc();
    }

    pub fn add_samples_collected(&self, count: u64) {
        self.inner().samples_collected.inc_by(count);
    }

    pub fn set_driver_outcome(&self, outcome: &DriverOutcome) {
        let code = match outcome {
            DriverOutcome::Exited { code } => i64::from(*code),
            DriverOutcome::Signaled
            | DriverOutcome::TimedOut
            | DriverOutcome::Interrupted
            | DriverOutcome::Unknown => -1,
        };
        self.inner().driver_exit_code.set(code);
    }

    pub fn set_run_in_progress(&self, running: bool) {
        self.inner().run_in_progress.set(i64::from(running));
    }

    pub fn inc_shutdown_timeouts(&self) {
        self.inner().shutdown_timeouts.inc();
    }
}

/// Structured logger for run lifecycle events
///
/// Every event carries the run id so interleaved runs can be told apart.
#[derive(Clone)]
pub struct StructuredLogger {
    run_id: String,
}

impl StructuredLogger {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_run_started(&self, source: &str, interval_ms: u128) {
        info!(
            event = "run_started",
            run_id = %self.run_id,
            source = %source,
            interval_ms = interval_ms,
            "Load test run started"
        );
    }

    pub fn log_driver_launched(&self, program: &str, pid: Option<u32>) {
        info!(
            event = "driver_launched",
            run_id = %self.run_id,
            program = %program,
            pid = ?pid,
            "Traffic driver launched"
        );
    }

    pub fn log_driver_launch_failed(&self, program: &str, reason: &str) {
        error!(
            event = "driver_launch_failed",
            run_id = %self.run_id,
            program = %program,
            reason = %reason,
            "Traffic driver could not be launched, aborting run"
        );
    }

    pub fn log_driver_exited(&self, outcome: &DriverOutcome) {
        match outcome {
            DriverOutcome::Exited { code: 0 } => {
                info!(
                    event = "driver_exited",
                    run_id = %self.run_id,
                    exit_code = 0,
                    "Traffic driver finished"
                );
            }
            DriverOutcome::Exited { code } => {
                warn!(
                    event = "driver_exited",
                    run_id = %self.run_id,
                    exit_code = *code,
                    "Traffic driver exited with failure, keeping collected samples"
                );
            }
            DriverOutcome::Signaled => {
                warn!(
                    event = "driver_exited",
                    run_id = %self.run_id,
                    "Traffic driver terminated by signal, keeping collected samples"
                );
            }
            DriverOutcome::TimedOut => {
                warn!(
                    event = "driver_timed_out",
                    run_id = %self.run_id,
                    "Traffic driver exceeded its timeout and was killed"
                );
            }
            DriverOutcome::Interrupted => {
                warn!(
                    event = "driver_interrupted",
                    run_id = %self.run_id,
                    "Run interrupted, traffic driver killed"
                );
            }
            DriverOutcome::Unknown => {
                warn!(
                    event = "driver_exited",
                    run_id = %self.run_id,
                    "Traffic driver exit status unknown, keeping collected samples"
                );
            }
        }
    }

    pub fn log_sampler_stopped(&self, status: ShutdownStatus, samples: usize) {
        match status {
            ShutdownStatus::Clean => info!(
                event = "sampler_stopped",
                run_id = %self.run_id,
                samples = samples,
                "Resource sampler stopped"
            ),
            ShutdownStatus::TimedOut => warn!(
                event = "sampler_stop_timeout",
                run_id = %self.run_id,
                samples = samples,
                "Resource sampler did not stop in time, completing with collected samples"
            ),
        }
    }

    pub fn log_run_completed(&self, result: &RunResult) {
        let elapsed_secs = (result.finished_at - result.started_at).num_milliseconds() as f64 / 1000.0;
        if result.is_degraded() {
            warn!(
                event = "run_completed",
                run_id = %self.run_id,
                samples = result.samples.len(),
                driver = ?result.driver_outcome,
                shutdown = ?result.shutdown,
                elapsed_secs = elapsed_secs,
                "Load test run completed in degraded state"
            );
        } else {
            info!(
                event = "run_completed",
                run_id = %self.run_id,
                samples = result.samples.len(),
                elapsed_secs = elapsed_secs,
                "Load test run completed"
            );
        }
    }
}
