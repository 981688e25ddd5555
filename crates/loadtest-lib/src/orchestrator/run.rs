//! Run sequencing

use super::driver::{DriverCommand, DriverProcess};
use super::OrchestratorError;
use crate::export::{ExportError, RunExporter};
use crate::health::{components, HealthRegistry, RunPhase};
use crate::models::{DriverOutcome, RunResult, Sample, ShutdownStatus};
use crate::observability::{HarnessMetrics, StructuredLogger};
use crate::sampler::{ResourceSampler, ResourceSource, SamplerConfig};
use chrono::Utc;
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Timing of one orchestration run
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub sampler: SamplerConfig,
    /// Sampling continues this long after the driver exits (default: 10 seconds)
    pub grace_period: Duration,
    /// Upper bound on waiting for the sampler to exit (default: 5 seconds)
    pub join_timeout: Duration,
    /// Kill the driver after this long; `None` waits for it indefinitely
    pub driver_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerConfig::default(),
            grace_period: Duration::from_secs(10),
            join_timeout: Duration::from_secs(5),
            driver_timeout: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        self.sampler.validate()?;
        if self.join_timeout.is_zero() {
            return Err(OrchestratorError::ZeroJoinTimeout);
        }
        Ok(())
    }
}

/// A finished run together with the result of exporting it
///
/// Export failures never discard the collected samples.
#[derive(Debug)]
pub struct CompletedRun {
    pub result: RunResult,
    pub export_error: Option<ExportError>,
}

/// Drives one load test run end to end
pub struct Orchestrator {
    source: Arc<dyn ResourceSource>,
    driver: DriverCommand,
    config: OrchestratorConfig,
    health: HealthRegistry,
    metrics: HarnessMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        driver: DriverCommand,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let run_id = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S"));

        Ok(Self {
            source,
            driver,
            config,
            health: HealthRegistry::new(),
            metrics: HarnessMetrics::new(),
            logger: StructuredLogger::new(run_id),
        })
    }

    /// Report into a shared registry, e.g. one served by the status API
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.logger = StructuredLogger::new(run_id);
        self
    }

    pub fn run_id(&self) -> &str {
        self.logger.run_id()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Sample while the driver runs, then through the grace period
    ///
    /// Only a driver that cannot be launched aborts the run. A failing or
    /// killed driver and a sampler that will not stop in time are recorded
    /// on the result alongside every sample gathered.
    pub async fn run(&self) -> Result<RunResult, OrchestratorError> {
        self.run_until(pending::<()>()).await
    }

    /// Like `run`, but stop early once `interrupt` completes
    ///
    /// An interrupt kills the driver and cuts the grace period short. The
    /// sampler is still joined within its bound and its samples are kept.
    pub async fn run_until<I>(&self, interrupt: I) -> Result<RunResult, OrchestratorError>
    where
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);
        let mut interrupted = false;

        let started_at = Utc::now();
        self.health.register(components::SAMPLER).await;
        self.health.register(components::DRIVER).await;
        self.metrics.set_run_in_progress(true);

        let sampler = ResourceSampler::new(self.source.clone(), self.config.sampler.clone())?;
        let mut handle = sampler.start();
        self.logger.log_run_started(
            &self.source.describe(),
            self.config.sampler.interval.as_millis(),
        );

        let mut driver = match DriverProcess::spawn(&self.driver) {
            Ok(driver) => driver,
            Err(e) => {
                self.logger
                    .log_driver_launch_failed(&self.driver.display(), &e.to_string());

                // Nothing useful was measured without traffic
                let discarded = handle.join(self.config.join_timeout).await;
                info!(
                    run_id = %self.run_id(),
                    discarded = discarded.samples.len(),
                    "Discarded samples of aborted run"
                );

                self.health
                    .set_unhealthy(components::DRIVER, e.to_string())
                    .await;
                self.health.set_phase(RunPhase::Aborted).await;
                self.metrics.set_run_in_progress(false);
                return Err(e);
            }
        };

        self.health.set_phase(RunPhase::Driving).await;
        self.logger
            .log_driver_launched(&self.driver.display(), driver.id());

        let mut samples: Vec<Sample> = Vec::new();
        let waited = handle
            .collect_while(
                async {
                    tokio::select! {
                        outcome = driver.wait_with_timeout(self.config.driver_timeout) => outcome.map(Some),
                        () = &mut interrupt => Ok(None),
                    }
                },
                &mut samples,
            )
            .await;

        let driver_outcome = match waited {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                interrupted = true;
                warn!(run_id = %self.run_id(), "Run interrupted, stopping traffic driver");
                if let Err(e) = driver.kill().await {
                    error!(run_id = %self.run_id(), error = %e, "Failed to kill traffic driver");
                }
                DriverOutcome::Interrupted
            }
            Err(e) => {
                error!(
                    run_id = %self.run_id(),
                    program = %driver.program(),
                    error = %e,
                    "Failed to observe traffic driver exit"
                );
                DriverOutcome::Unknown
            }
        };
        self.record_driver_outcome(&driver_outcome).await;

        self.health.set_phase(RunPhase::Draining).await;
        if !interrupted {
            handle
                .collect_while(
                    async {
                        tokio::select! {
                            () = sleep(self.config.grace_period) => {}
                            () = &mut interrupt => {
                                warn!(run_id = %self.run_id(), "Run interrupted, ending grace period");
                            }
                        }
                    },
                    &mut samples,
                )
                .await;
        }

        let joined = handle.join(self.config.join_timeout).await;
        samples.extend(joined.samples);

        if joined.status == ShutdownStatus::TimedOut {
            self.metrics.inc_shutdown_timeouts();
            self.health
                .set_degraded(components::SAMPLER, "did not stop within join timeout")
                .await;
        } else if let Some(stats) = joined.stats.filter(|s| s.failures > 0) {
            self.health
                .set_degraded(
                    components::SAMPLER,
                    format!("{} of {} fetches failed", stats.failures, stats.ticks),
                )
                .await;
        }
        self.logger.log_sampler_stopped(joined.status, samples.len());

        let result = RunResult {
            samples,
            driver_outcome,
            shutdown: joined.status,
            sampler_stats: joined.stats,
            started_at,
            finished_at: Utc::now(),
        };

        self.health.set_phase(RunPhase::Finished).await;
        self.metrics.set_run_in_progress(false);
        self.logger.log_run_completed(&result);

        Ok(result)
    }

    /// Run and hand the result to `exporter`
    pub async fn run_and_export(
        &self,
        exporter: &dyn RunExporter,
    ) -> Result<CompletedRun, OrchestratorError> {
        self.run_and_export_until(exporter, pending::<()>()).await
    }

    /// Run until done or interrupted, then export whatever was collected
    pub async fn run_and_export_until<I>(
        &self,
        exporter: &dyn RunExporter,
        interrupt: I,
    ) -> Result<CompletedRun, OrchestratorError>
    where
        I: Future<Output = ()>,
    {
        let result = self.run_until(interrupt).await?;

        self.health.set_phase(RunPhase::Exporting).await;
        let export_error = match exporter.export(&result) {
            Ok(()) => {
                self.health.set_healthy(components::EXPORTER).await;
                None
            }
            Err(e) => {
                error!(run_id = %self.run_id(), error = %e, "Failed to export run data");
                self.health
                    .set_unhealthy(components::EXPORTER, e.to_string())
                    .await;
                Some(e)
            }
        };
        self.health.set_phase(RunPhase::Finished).await;

        Ok(CompletedRun {
            result,
            export_error,
        })
    }

    async fn record_driver_outcome(&self, outcome: &DriverOutcome) {
        self.logger.log_driver_exited(outcome);
        self.metrics.set_driver_outcome(outcome);

        match outcome {
            DriverOutcome::Exited { code: 0 } => {}
            DriverOutcome::Exited { code } => {
                self.health
                    .set_degraded(components::DRIVER, format!("exit code {code}"))
                    .await
            }
            DriverOutcome::Signaled => {
                self.health
                    .set_degraded(components::DRIVER, "terminated by signal")
                    .await
            }
            DriverOutcome::TimedOut => {
                self.health
                    .set_degraded(components::DRIVER, "killed after driver timeout")
                    .await
            }
            DriverOutcome::Interrupted => {
                self.health
                    .set_degraded(components::DRIVER, "killed after interrupt")
                    .await
            }
            DriverOutcome::Unknown => {
                self.health
                    .set_degraded(components::DRIVER, "exit status unknown")
                    .await
            }
        }
    }
}
