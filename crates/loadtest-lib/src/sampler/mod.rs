//! Resource sampling from the cluster control plane
//!
//! This module provides a background loop that periodically fetches per-pod
//! resource usage and hands each successful poll to the orchestrator as one
//! batch. Failed polls are logged and skipped; they never end the loop.

mod r#loop;
mod source;

#[cfg(test)]
mod tests;

pub use r#loop::{
    ResourceSampler, ResourceSamplerBuilder, SamplerConfig, SamplerHandle, SamplerJoin,
    SamplerState, StopListener, StopSignal,
};
pub use source::{resources_url, HttpResourceSource};

use crate::models::PodResource;
use std::time::Duration;
use thiserror::Error;

pub use async_trait::async_trait;

/// Transient failure of a single sampler tick
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("request to metrics endpoint failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metrics endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode resource list: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("fetch did not complete within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Source(String),
}

/// Invalid sampler configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerConfigError {
    #[error("sampling interval must be greater than zero")]
    ZeroInterval,

    #[error("fetch timeout must be greater than zero")]
    ZeroFetchTimeout,

    #[error("fetch timeout {fetch_timeout:?} must be shorter than the sampling interval {interval:?}")]
    FetchTimeoutTooLong {
        fetch_timeout: Duration,
        interval: Duration,
    },

    #[error("channel capacity must be greater than zero")]
    ZeroCapacity,

    #[error("a resource source is required")]
    MissingSource,
}

/// Trait for resource metric sources
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Fetch the current per-pod resource usage
    async fn fetch(&self) -> Result<Vec<PodResource>, SampleError>;

    /// Human readable description used in logs
    fn describe(&self) -> String {
        "resource source".to_string()
    }
}
