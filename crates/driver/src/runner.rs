//! Virtual users paced by the diurnal rate model
//!
//! Every user runs `index` once, then loops: pick an operation, run its
//! request sequence, wait the delay the rate model gives for the current
//! point of the day. All users stop at the run deadline; a request still in
//! flight at that moment is abandoned and not counted.

use crate::client::TargetClient;
use crate::operations;
use anyhow::{bail, Result};
use chrono::Timelike;
use clap::ValueEnum;
use loadtest_lib::{EndpointSelector, EndpointWeightTable, Operation, RateShaper, ShapeConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info, warn};

/// How the rate model's minute of day is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ClockMode {
    /// Local wall-clock time of day
    #[default]
    Wall,
    /// Elapsed run time scaled so a whole day fits into the run
    Compressed,
}

/// Settings for one driver run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub host: String,
    pub users: u32,
    pub run_time: Duration,
    pub clock: ClockMode,
    pub weights: EndpointWeightTable,
    pub shape: ShapeConfig,
    pub request_timeout: Duration,
    /// Seed for reproducible runs; user `i` uses `seed + i`
    pub seed: Option<u64>,
}

/// Counters for one operation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperationStats {
    pub requests: u64,
    pub failures: u64,
    pub total_latency: Duration,
}

impl OperationStats {
    pub fn record(&mut self, latency: Duration, ok: bool) {
        self.requests += 1;
        if !ok {
            self.failures += 1;
        }
        self.total_latency += latency;
    }

    pub fn merge(&mut self, other: &OperationStats) {
        self.requests += other.requests;
        self.failures += other.failures;
        self.total_latency += other.total_latency;
    }

    pub fn mean_latency(&self) -> Duration {
        match u32::try_from(self.requests) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => Duration::from_secs_f64(self.total_latency.as_secs_f64() / self.requests as f64),
        }
    }
}

/// Per-operation statistics of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub operations: BTreeMap<Operation, OperationStats>,
}

impl RunStats {
    pub fn record(&mut self, operation: Operation, latency: Duration, ok: bool) {
        self.operations
            .entry(operation)
            .or_default()
            .record(latency, ok);
    }

    pub fn merge(&mut self, other: &RunStats) {
        for (operation, stats) in &other.operations {
            self.operations.entry(*operation).or_default().merge(stats);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.operations.values().map(|s| s.requests).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.operations.values().map(|s| s.failures).sum()
    }
}

/// Result of a finished driver run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub users: u32,
    pub elapsed: Duration,
    pub stats: RunStats,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.stats.total_failures() > 0
    }
}

/// Live totals shared with the progress reporter
#[derive(Debug, Default)]
pub struct LiveCounters {
    requests: AtomicU64,
    failures: AtomicU64,
}

impl LiveCounters {
    fn record(&self, ok: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Progress snapshot handed to the reporter
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Progress {
    pub elapsed_secs: u64,
    pub requests: u64,
    pub failures: u64,
}

/// Run every virtual user until the run time is over
///
/// `on_progress` is called every `progress_every` while users are active.
pub async fn run<F>(
    settings: RunSettings,
    progress_every: Option<Duration>,
    mut on_progress: F,
) -> Result<RunSummary>
where
    F: FnMut(Progress),
{
    if settings.users == 0 {
        bail!("at least one virtual user is required");
    }
    if settings.run_time.is_zero() {
        bail!("run time must be greater than zero");
    }

    let mut shape = settings.shape.clone();
    shape.total_run_time = settings.run_time;
    let selector = EndpointSelector::new(&settings.weights)?;
    // Reject a bad shape before any user starts
    RateShaper::new(shape.clone(), StdRng::seed_from_u64(0))?;

    info!(
        host = %settings.host,
        users = settings.users,
        run_time_secs = settings.run_time.as_secs_f64(),
        clock = ?settings.clock,
        "Starting virtual users"
    );

    let started = Instant::now();
    let Some(deadline) = started.checked_add(settings.run_time) else {
        bail!("run time of {:?} is too long", settings.run_time);
    };
    let counters = Arc::new(LiveCounters::default());

    let mut tasks = Vec::with_capacity(settings.users as usize);
    for user in 0..settings.users {
        let client = TargetClient::new(&settings.host, settings.request_timeout)?;
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(user))),
            None => StdRng::from_entropy(),
        };
        let user = VirtualUser {
            id: user,
            client,
            selector: selector.clone(),
            shape: shape.clone(),
            clock: settings.clock,
            started,
            deadline,
            counters: counters.clone(),
        };
        tasks.push(tokio::spawn(user.run(rng)));
    }

    let joined = join_users(tasks);
    tokio::pin!(joined);

    let results = match progress_every {
        Some(every) => {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    results = &mut joined => break results,
                    _ = ticker.tick() => on_progress(Progress {
                        elapsed_secs: started.elapsed().as_secs(),
                        requests: counters.requests(),
                        failures: counters.failures(),
                    }),
                }
            }
        }
        None => joined.await,
    };

    let mut stats = RunStats::default();
    for result in results {
        match result {
            Ok(user_stats) => stats.merge(&user_stats),
            Err(e) => warn!(error = %e, "Virtual user task failed"),
        }
    }

    let summary = RunSummary {
        users: settings.users,
        elapsed: started.elapsed(),
        stats,
    };
    info!(
        requests = summary.stats.total_requests(),
        failures = summary.stats.total_failures(),
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Virtual users finished"
    );
    Ok(summary)
}

async fn join_users(
    tasks: Vec<tokio::task::JoinHandle<RunStats>>,
) -> Vec<Result<RunStats, tokio::task::JoinError>> {
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await);
    }
    results
}

struct VirtualUser {
    id: u32,
    client: TargetClient,
    selector: EndpointSelector,
    shape: ShapeConfig,
    clock: ClockMode,
    started: Instant,
    deadline: Instant,
    counters: Arc<LiveCounters>,
}

impl VirtualUser {
    async fn run(self, mut rng: StdRng) -> RunStats {
        let mut stats = RunStats::default();
        let shaper_rng = StdRng::seed_from_u64(rng.gen());
        let mut shaper = match RateShaper::new(self.shape.clone(), shaper_rng) {
            Ok(shaper) => shaper,
            Err(e) => {
                warn!(user = self.id, error = %e, "Invalid shape configuration");
                return stats;
            }
        };

        if !self.execute(Operation::Index, &mut rng, &mut stats).await {
            return stats;
        }

        while Instant::now() < self.deadline {
            let operation = self.selector.select(&mut rng);
            if !self.execute(operation, &mut rng, &mut stats).await {
                break;
            }

            let state = match self.clock {
                ClockMode::Wall => shaper.at_minute(wall_clock_minute()),
                ClockMode::Compressed => shaper.at_elapsed(self.started.elapsed()),
            };
            debug!(
                user = self.id,
                rate = state.rate,
                wait_ms = state.wait_time.as_millis(),
                "Waiting before next operation"
            );

            let wake = Instant::now()
                .checked_add(state.wait_time)
                .map_or(self.deadline, |at| at.min(self.deadline));
            sleep_until(wake).await;
        }

        stats
    }

    /// Run one operation; false once the deadline cut it off
    async fn execute(&self, operation: Operation, rng: &mut StdRng, stats: &mut RunStats) -> bool {
        let begin = Instant::now();
        match timeout_at(self.deadline, operations::execute(operation, &self.client, rng)).await {
            Ok(result) => {
                let ok = match result {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(user = self.id, operation = %operation, error = %e, "Operation failed");
                        false
                    }
                };
                stats.record(operation, begin.elapsed(), ok);
                self.counters.record(ok);
                true
            }
            Err(_) => false,
        }
    }
}

/// Current local time as fractional minutes since midnight
pub fn wall_clock_minute() -> f64 {
    let now = chrono::Local::now();
    f64::from(now.hour() * 60 + now.minute()) + f64::from(now.second()) / 60.0
}

/// Parse run lengths such as `600`, `90s`, `10m`, `2h` or `1h30m`
///
/// A bare number is taken as seconds. Lengths that would overflow the run
/// deadline are rejected.
pub fn parse_run_time(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("run time is empty".to_string());
    }
    let run_time = match input.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(input)
            .map_err(|e| format!("invalid run time `{input}`: {e}"))?,
    };
    if Instant::now().checked_add(run_time).is_none() {
        return Err(format!("run time `{input}` is too long"));
    }

    Ok(run_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_parse_run_time() {
        assert_eq!(parse_run_time("600"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_run_time("90s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_run_time("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_run_time("1h30m"), Ok(Duration::from_secs(5400)));
        assert!(parse_run_time("").is_err());
        assert!(parse_run_time("10x").is_err());
        assert!(parse_run_time("h").is_err());
        assert!(parse_run_time("1h30").is_err());
    }

    #[test]
    fn test_parse_run_time_rejects_overflow() {
        assert!(parse_run_time("5124095576030432h").is_err());
        assert!(parse_run_time("18446744073709551615").is_err());
        assert!(parse_run_time("99999999999999999999999s").is_err());
    }

    #[test]
    fn test_stats_merge_and_mean() {
        let mut a = RunStats::default();
        a.record(Operation::Index, Duration::from_millis(10), true);
        a.record(Operation::Index, Duration::from_millis(30), false);

        let mut b = RunStats::default();
        b.record(Operation::Index, Duration::from_millis(20), true);
        b.record(Operation::Checkout, Duration::from_millis(100), true);

        a.merge(&b);

        let index = a.operations[&Operation::Index];
        assert_eq!(index.requests, 3);
        assert_eq!(index.failures, 1);
        assert_eq!(index.mean_latency(), Duration::from_millis(20));
        assert_eq!(a.total_requests(), 4);
        assert_eq!(a.total_failures(), 1);
        assert_eq!(OperationStats::default().mean_latency(), Duration::ZERO);
    }

    #[test]
    fn test_wall_clock_minute_in_day() {
        let minute = wall_clock_minute();
        assert!((0.0..1440.0).contains(&minute));
    }

    fn settings(host: String, users: u32, run_time_ms: u64) -> RunSettings {
        RunSettings {
            host,
            users,
            run_time: Duration::from_millis(run_time_ms),
            clock: ClockMode::Compressed,
            weights: EndpointWeightTable::default(),
            shape: ShapeConfig::default(),
            request_timeout: Duration::from_secs(2),
            seed: Some(11),
        }
    }

    async fn catch_all(server: &mut mockito::Server, status: usize) {
        for method in ["GET", "POST"] {
            server
                .mock(method, Matcher::Any)
                .with_status(status)
                .expect_at_least(0)
                .create_async()
                .await;
        }
    }

    #[tokio::test]
    async fn test_every_user_starts_with_index() {
        let mut server = mockito::Server::new_async().await;
        catch_all(&mut server, 200).await;

        let summary = run(settings(server.url(), 3, 400), None, |_| {})
            .await
            .unwrap();

        assert_eq!(summary.users, 3);
        assert!(summary.stats.operations[&Operation::Index].requests >= 3);
        assert!(!summary.has_failures());
        assert!(summary.elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failed_requests_are_counted() {
        let mut server = mockito::Server::new_async().await;
        catch_all(&mut server, 503).await;

        let summary = run(settings(server.url(), 2, 300), None, |_| {})
            .await
            .unwrap();

        assert!(summary.has_failures());
        assert_eq!(
            summary.stats.total_failures(),
            summary.stats.total_requests()
        );
    }

    #[tokio::test]
    async fn test_progress_reported_while_running() {
        let mut server = mockito::Server::new_async().await;
        catch_all(&mut server, 200).await;

        let mut reports = Vec::new();
        run(
            settings(server.url(), 1, 500),
            Some(Duration::from_millis(100)),
            |p| reports.push(p),
        )
        .await
        .unwrap();

        assert!(!reports.is_empty());
        assert!(reports.iter().all(|p| p.failures == 0));
    }

    #[tokio::test]
    async fn test_zero_users_rejected() {
        let err = run(settings("http://127.0.0.1:9".to_string(), 0, 100), None, |_| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("virtual user"));
    }

    #[tokio::test]
    async fn test_unbounded_run_time_rejected() {
        let mut settings = settings("http://127.0.0.1:9".to_string(), 1, 100);
        settings.run_time = Duration::from_secs(u64::MAX);

        let err = run(settings, None, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("too long"));
    }
}
