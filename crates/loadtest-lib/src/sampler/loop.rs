//! Resource sampling loop
//!
//! Runs on its own task, polling the resource source once per interval.
//! Each successful poll is stamped with a single capture time and sent as
//! one batch, so a failed poll never contributes partial data.

use super::{ResourceSource, SampleError, SamplerConfigError};
use crate::models::{Sample, SamplerStats, ShutdownStatus};
use crate::observability::HarnessMetrics;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between polls (default: 2 seconds)
    pub interval: Duration,
    /// Upper bound on a single poll; must stay below `interval`
    pub fetch_timeout: Duration,
    /// Number of batches the channel holds before the loop waits
    pub channel_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(1),
            channel_capacity: 1024,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), SamplerConfigError> {
        if self.interval.is_zero() {
            return Err(SamplerConfigError::ZeroInterval);
        }
        if self.fetch_timeout.is_zero() {
            return Err(SamplerConfigError::ZeroFetchTimeout);
        }
        if self.fetch_timeout >= self.interval {
            return Err(SamplerConfigError::FetchTimeoutTooLong {
                fetch_timeout: self.fetch_timeout,
                interval: self.interval,
            });
        }
        if self.channel_capacity == 0 {
            return Err(SamplerConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Longest time between `stop()` and the loop exiting
    pub fn stop_latency_bound(&self) -> Duration {
        self.interval + self.fetch_timeout
    }
}

/// One-way stop flag: once triggered it stays triggered
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag; repeated calls are no-ops
    pub fn trigger(&self) {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader side of a `StopSignal`
///
/// A dropped signal counts as a stop.
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal is triggered or dropped
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Lifecycle of a sampler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl SamplerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SamplerState::Idle,
            1 => SamplerState::Running,
            2 => SamplerState::Stopping,
            _ => SamplerState::Stopped,
        }
    }
}

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SamplerState::Idle as u8)))
    }

    fn get(&self) -> SamplerState {
        SamplerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: SamplerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Move forward only; states never go back
    fn advance(&self, state: SamplerState) {
        self.0.fetch_max(state as u8, Ordering::SeqCst);
    }
}

/// Resource sampler that has not been started yet
pub struct ResourceSampler {
    source: Arc<dyn ResourceSource>,
    config: SamplerConfig,
    metrics: HarnessMetrics,
}

impl ResourceSampler {
    pub fn new(
        source: Arc<dyn ResourceSource>,
        config: SamplerConfig,
    ) -> Result<Self, SamplerConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            metrics: HarnessMetrics::new(),
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Spawn the sampling loop on its own task
    pub fn start(self) -> SamplerHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let stop = StopSignal::new();
        let state = SharedState::new();
        let config = self.config.clone();

        state.set(SamplerState::Running);
        info!(
            source = %self.source.describe(),
            interval_ms = config.interval.as_millis(),
            fetch_timeout_ms = config.fetch_timeout.as_millis(),
            "Starting resource sampler"
        );

        let task = tokio::spawn(self.run(tx, stop.subscribe(), state.clone()));

        SamplerHandle {
            stop,
            task,
            rx,
            state,
            config,
        }
    }

    async fn run(
        self,
        tx: mpsc::Sender<Vec<Sample>>,
        mut stop: StopListener,
        state: SharedState,
    ) -> SamplerStats {
        let mut stats = SamplerStats::default();

        loop {
            if stop.is_stopped() {
                break;
            }

            stats.ticks += 1;
            self.metrics.inc_sampler_ticks();

            match self.poll_once().await {
                Ok(batch) => {
                    stats.successes += 1;
                    stats.samples += batch.len() as u64;
                    self.metrics.add_samples_collected(batch.len() as u64);

                    if !batch.is_empty() && tx.send(batch).await.is_err() {
                        warn!("Sample receiver dropped, stopping sampler");
                        break;
                    }
                }
                Err(e) => {
                    stats.failures += 1;
                    self.metrics.inc_sampler_failures();
                    warn!(
                        tick = stats.ticks,
                        error = %e,
                        "Failed to fetch pod resources, skipping tick"
                    );
                }
            }

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = stop.stopped() => {}
            }
        }

        state.set(SamplerState::Stopped);
        info!(
            ticks = stats.ticks,
            successes = stats.successes,
            failures = stats.failures,
            samples = stats.samples,
            "Resource sampler stopped"
        );

        stats
    }

    /// Fetch once and stamp every entry with the same capture time
    async fn poll_once(&self) -> Result<Vec<Sample>, SampleError> {
        let start = Instant::now();
        let fetched = timeout(self.config.fetch_timeout, self.source.fetch()).await;
        self.metrics
            .observe_fetch_latency(start.elapsed().as_secs_f64());

        let resources = fetched.map_err(|_| SampleError::Timeout(self.config.fetch_timeout))??;

        let captured_at = Utc::now();
        debug!(pods = resources.len(), "Captured pod resources");
        Ok(resources
            .into_iter()
            .map(|r| Sample::from_resource(captured_at, r))
            .collect())
    }
}

/// Samples and stats gathered when a sampler is joined
#[derive(Debug)]
pub struct SamplerJoin {
    pub samples: Vec<Sample>,
    /// None when the loop did not exit in time
    pub stats: Option<SamplerStats>,
    pub status: ShutdownStatus,
}

/// Handle to a running sampler
///
/// Owns the receiving end of the batch channel: the sampler is the only
/// writer and the holder of this handle the only reader.
pub struct SamplerHandle {
    stop: StopSignal,
    task: JoinHandle<SamplerStats>,
    rx: mpsc::Receiver<Vec<Sample>>,
    state: SharedState,
    config: SamplerConfig,
}

impl SamplerHandle {
    pub fn state(&self) -> SamplerState {
        self.state.get()
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Ask the loop to exit at its next iteration; an in-flight poll finishes
    pub fn stop(&self) {
        self.stop.trigger();
        self.state.advance(SamplerState::Stopping);
    }

    /// Move every batch already delivered into `buffer`
    pub fn drain_into(&mut self, buffer: &mut Vec<Sample>) -> usize {
        let mut count = 0;
        while let Ok(batch) = self.rx.try_recv() {
            count += batch.len();
            buffer.extend(batch);
        }
        count
    }

    /// Await `fut` while moving delivered batches into `buffer`
    ///
    /// Keeps the channel flowing while the caller is blocked elsewhere.
    pub async fn collect_while<F: Future>(&mut self, fut: F, buffer: &mut Vec<Sample>) -> F::Output {
        tokio::pin!(fut);
        let mut channel_open = true;

        loop {
            tokio::select! {
                output = &mut fut => return output,
                batch = self.rx.recv(), if channel_open => match batch {
                    Some(batch) => buffer.extend(batch),
                    None => channel_open = false,
                },
            }
        }
    }

    /// Stop the loop and wait at most `join_timeout` for it to exit
    ///
    /// On timeout the task is aborted and whatever was delivered so far is
    /// returned with `ShutdownStatus::TimedOut`.
    pub async fn join(mut self, join_timeout: Duration) -> SamplerJoin {
        self.stop();
        let mut samples = Vec::new();

        let rx = &mut self.rx;
        let task = &mut self.task;
        let joined = timeout(join_timeout, async {
            while let Some(batch) = rx.recv().await {
                samples.extend(batch);
            }
            task.await
        })
        .await;

        match joined {
            Ok(Ok(stats)) => SamplerJoin {
                samples,
                stats: Some(stats),
                status: ShutdownStatus::Clean,
            },
            Ok(Err(e)) => {
                // The loop itself failed; batches sent before that are kept
                warn!(error = %e, "Resource sampler task failed");
                self.state.set(SamplerState::Stopped);
                SamplerJoin {
                    samples,
                    stats: None,
                    status: ShutdownStatus::Clean,
                }
            }
            Err(_) => {
                warn!(
                    timeout_ms = join_timeout.as_millis(),
                    "Resource sampler did not stop in time, aborting task"
                );
                self.task.abort();
                self.drain_into(&mut samples);
                SamplerJoin {
                    samples,
                    stats: None,
                    status: ShutdownStatus::TimedOut,
                }
            }
        }
    }
}

/// Builder for creating a resource sampler
pub struct ResourceSamplerBuilder {
    source: Option<Arc<dyn ResourceSource>>,
    config: SamplerConfig,
}

impl ResourceSamplerBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            config: SamplerConfig::default(),
        }
    }

    pub fn source(mut self, source: Arc<dyn ResourceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.config.fetch_timeout = fetch_timeout;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<ResourceSampler, SamplerConfigError> {
        let source = self.source.ok_or(SamplerConfigError::MissingSource)?;
        ResourceSampler::new(source, self.config)
    }
}

impl Default for ResourceSamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
