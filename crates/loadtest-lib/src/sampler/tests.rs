//! Tests for the sampling loop
//!
//! These use in-memory sources with controllable latency and failures
//! instead of a live metrics endpoint.

use super::*;
use crate::models::{PodResource, ShutdownStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn pod(name: &str, cpu: f64) -> PodResource {
    PodResource {
        node_id: "1".to_string(),
        node_name: "worker-1".to_string(),
        pod_name: name.to_string(),
        usage_cpu: cpu,
        usage_memory: 64.0 * 1024.0 * 1024.0,
    }
}

/// Returns a fixed pod list after an optional delay; fails every `fail_every` calls
struct MockSource {
    calls: AtomicUsize,
    pods: Vec<PodResource>,
    delay: Duration,
    fail_every: Option<usize>,
}

impl MockSource {
    fn new(pods: Vec<PodResource>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            pods,
            delay: Duration::ZERO,
            fail_every: None,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceSource for MockSource {
    async fn fetch(&self) -> Result<Vec<PodResource>, SampleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(n) = self.fail_every {
            if call % n == 0 {
                return Err(SampleError::Source(format!("simulated failure on call {call}")));
            }
        }
        Ok(self.pods.clone())
    }
}

fn sampler(source: Arc<MockSource>, interval_ms: u64, timeout_ms: u64) -> ResourceSampler {
    ResourceSamplerBuilder::new()
        .source(source)
        .interval(Duration::from_millis(interval_ms))
        .fetch_timeout(Duration::from_millis(timeout_ms))
        .build()
        .unwrap()
}

mod config_tests {
    use super::*;

    #[test]
    fn test_sampler_config_default() {
        let config = SamplerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.fetch_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
        assert_eq!(config.stop_latency_bound(), Duration::from_secs(3));
    }

    #[test]
    fn test_fetch_timeout_must_be_below_interval() {
        let config = SamplerConfig {
            interval: Duration::from_secs(2),
            fetch_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SamplerConfigError::FetchTimeoutTooLong { .. })
        ));
    }

    #[test]
    fn test_builder_missing_source() {
        let result = ResourceSamplerBuilder::new().build();
        assert!(matches!(result, Err(SamplerConfigError::MissingSource)));
    }

    #[test]
    fn test_stop_signal_is_monotonic() {
        let signal = StopSignal::new();
        let listener = signal.subscribe();
        assert!(!signal.is_triggered());
        assert!(!listener.is_stopped());

        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
        assert!(listener.is_stopped());
    }

    #[test]
    fn test_dropped_signal_counts_as_stop() {
        let signal = StopSignal::new();
        let listener = signal.subscribe();
        drop(signal);
        assert!(listener.is_stopped());
    }
}

mod loop_tests {
    use super::*;

    #[tokio::test]
    async fn test_samples_collected_and_state_transitions() {
        let source = Arc::new(MockSource::new(vec![pod("frontend", 10.0), pod("cart", 20.0)]));
        let handle = sampler(source.clone(), 20, 10).start();
        assert_eq!(handle.state(), SamplerState::Running);

        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.stop();
        assert_eq!(handle.state(), SamplerState::Stopping);

        let joined = handle.join(Duration::from_secs(2)).await;
        assert_eq!(joined.status, ShutdownStatus::Clean);

        let stats = joined.stats.unwrap();
        assert!(stats.ticks >= 2, "only {} ticks", stats.ticks);
        assert_eq!(stats.samples as usize, joined.samples.len());
        assert_eq!(source.calls() as u64, stats.ticks);
    }

    #[tokio::test]
    async fn test_each_batch_shares_one_timestamp() {
        let pods = vec![pod("a", 1.0), pod("b", 2.0), pod("c", 3.0)];
        let source = Arc::new(MockSource::new(pods));
        let handle = sampler(source, 15, 5).start();

        tokio::time::sleep(Duration::from_millis(80)).await;
        let joined = handle.join(Duration::from_secs(2)).await;

        assert!(!joined.samples.is_empty());
        assert_eq!(joined.samples.len() % 3, 0);
        for batch in joined.samples.chunks(3) {
            assert!(batch.iter().all(|s| s.timestamp == batch[0].timestamp));
            assert_eq!(
                batch.iter().map(|s| s.pod_name.as_str()).collect::<Vec<_>>(),
                vec!["a", "b", "c"]
            );
        }
        for pair in joined.samples.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_failed_poll_does_not_end_loop() {
        let source = Arc::new(MockSource::new(vec![pod("frontend", 5.0)]).failing_every(2));
        let handle = sampler(source.clone(), 15, 5).start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        let joined = handle.join(Duration::from_secs(2)).await;
        let stats = joined.stats.unwrap();

        assert!(stats.failures >= 1);
        // The tick after a failure still ran and succeeded
        assert!(stats.successes >= 2);
        assert_eq!(stats.ticks, stats.successes + stats.failures);
        assert_eq!(joined.samples.len() as u64, stats.successes);
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out_and_loop_continues() {
        let source =
            Arc::new(MockSource::new(vec![pod("frontend", 5.0)]).with_delay(Duration::from_secs(5)));
        let handle = sampler(source.clone(), 40, 10).start();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let joined = handle.join(Duration::from_secs(2)).await;
        let stats = joined.stats.unwrap();

        assert!(joined.samples.is_empty());
        assert!(stats.ticks >= 2);
        assert_eq!(stats.failures, stats.ticks);
    }

    #[tokio::test]
    async fn test_stop_returns_within_interval_plus_fetch_timeout() {
        let interval = Duration::from_millis(200);
        let fetch_timeout = Duration::from_millis(50);
        let source =
            Arc::new(MockSource::new(vec![pod("frontend", 5.0)]).with_delay(Duration::from_secs(5)));
        let handle = sampler(source, 200, 50).start();

        // Stop while the first fetch is in flight
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stopped_at = Instant::now();
        let joined = handle.join(Duration::from_secs(5)).await;
        let elapsed = stopped_at.elapsed();

        assert_eq!(joined.status, ShutdownStatus::Clean);
        assert!(
            elapsed <= interval + fetch_timeout + Duration::from_millis(100),
            "stop took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_in_flight_poll_delivered_after_stop() {
        let source = Arc::new(
            MockSource::new(vec![pod("frontend", 5.0), pod("cart", 6.0)])
                .with_delay(Duration::from_millis(100)),
        );
        let handle = sampler(source, 500, 300).start();

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        let joined = handle.join(Duration::from_secs(2)).await;

        assert_eq!(joined.status, ShutdownStatus::Clean);
        assert_eq!(joined.samples.len(), 2);
        assert_eq!(joined.stats.unwrap().ticks, 1);
    }

    #[tokio::test]
    async fn test_join_timeout_reports_degraded_completion() {
        let source = Arc::new(
            MockSource::new(vec![pod("frontend", 5.0)]).with_delay(Duration::from_millis(200)),
        );
        let handle = sampler(source, 500, 400).start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        let joined = handle.join(Duration::from_millis(30)).await;

        assert_eq!(joined.status, ShutdownStatus::TimedOut);
        assert!(joined.stats.is_none());
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_collect_while_drains_during_wait() {
        let source = Arc::new(MockSource::new(vec![pod("frontend", 5.0)]));
        let mut handle = sampler(source, 10, 5).start();

        let mut buffer = Vec::new();
        let value = handle
            .collect_while(
                async {
                    tokio::time::sleep(Duration::from_millis(80)).await;
                    42
                },
                &mut buffer,
            )
            .await;

        assert_eq!(value, 42);
        assert!(buffer.len() >= 2);

        let joined = handle.join(Duration::from_secs(2)).await;
        let total = buffer.len() + joined.samples.len();
        assert_eq!(total as u64, joined.stats.unwrap().samples);
    }
}
