//! Library for diurnal load testing of microservice clusters
//!
//! This crate provides the core functionality for:
//! - Diurnal request-rate and user-count shaping
//! - Weighted selection of shop operations
//! - Background sampling of per-pod resource usage
//! - Orchestration of a traffic driver alongside the sampler
//! - CSV export of collected samples
//! - Rescaling of exported samples onto a simulated day
//! - Health checks and observability

pub mod convert;
pub mod export;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod sampler;
pub mod shaping;

pub use convert::{convert_to_simulated_day, write_simulated_rows, SimulatedRow};
pub use export::{CsvExporter, ExportError, RunExporter};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse, RunPhase,
};
pub use models::*;
pub use observability::{HarnessMetrics, StructuredLogger};
pub use orchestrator::{
    CompletedRun, DriverCommand, Orchestrator, OrchestratorConfig, OrchestratorError,
};
pub use sampler::{HttpResourceSource, ResourceSource, SampleError, SamplerConfig};
pub use shaping::{
    EndpointSelector, EndpointWeightTable, Operation, RateShaper, ShapeConfig, UserShape, UserTick,
};
