//! Core data models for the load test harness

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Per-pod resource entry as returned by the cluster metrics endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodResource {
    #[serde(deserialize_with = "string_or_number")]
    pub node_id: String,
    pub node_name: String,
    pub pod_name: String,
    pub usage_cpu: f64,
    pub usage_memory: f64,
}

/// Resource sample captured by the sampler on a successful tick
///
/// Field order matches the exported column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub node_name: String,
    pub pod_name: String,
    pub usage_cpu: f64,
    pub usage_memory: f64,
}

impl Sample {
    /// Stamp a pod resource entry with a capture timestamp
    pub fn from_resource(timestamp: DateTime<Utc>, resource: PodResource) -> Self {
        Self {
            timestamp,
            node_id: resource.node_id,
            node_name: resource.node_name,
            pod_name: resource.pod_name,
            usage_cpu: resource.usage_cpu,
            usage_memory: resource.usage_memory,
        }
    }
}

/// Target request rate and the matching inter-request delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateState {
    /// Requests per minute
    pub rate: f64,
    /// Delay before the next request
    pub wait_time: Duration,
}

/// How the traffic-generation process finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DriverOutcome {
    /// Process exited with a code
    Exited { code: i32 },
    /// Process was terminated by a signal
    Signaled,
    /// Process outlived the configured driver timeout and was killed
    TimedOut,
    /// Run was interrupted and the process was killed
    Interrupted,
    /// Exit status could not be observed
    Unknown,
}

impl DriverOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DriverOutcome::Exited { code: 0 })
    }
}

/// Whether the sampler joined within its bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStatus {
    Clean,
    TimedOut,
}

/// Counters reported by the sampler loop when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub successes: u64,
    pub failures: u64,
    pub samples: u64,
}

/// Outcome of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub samples: Vec<Sample>,
    pub driver_outcome: DriverOutcome,
    pub shutdown: ShutdownStatus,
    /// None when the sampler did not join in time
    pub sampler_stats: Option<SamplerStats>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// True when the driver failed or the sampler did not shut down cleanly
    pub fn is_degraded(&self) -> bool {
        !self.driver_outcome.is_success() || self.shutdown != ShutdownStatus::Clean
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}
