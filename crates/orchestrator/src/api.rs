//! Status API for a running load test
//!
//! `/healthz` and `/readyz` follow the run phase and component health,
//! `/run` describes the run being driven, `/metrics` exposes the harness
//! metrics in Prometheus text format.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use loadtest_lib::{ComponentStatus, HarnessMetrics, HealthRegistry, ReadinessResponse, RunPhase};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Static description of the run served by `/run`
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub target_host: String,
    pub run_time_secs: u64,
    pub csv_out: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub run: RunInfo,
    pub health_registry: HealthRegistry,
    pub metrics: HarnessMetrics,
}

impl AppState {
    pub fn new(run: RunInfo, health_registry: HealthRegistry, metrics: HarnessMetrics) -> Self {
        Self {
            run,
            health_registry,
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReadiness {
    run_id: String,
    phase: RunPhase,
    #[serde(flatten)]
    readiness: ReadinessResponse,
}

#[derive(Debug, Serialize)]
struct RunStatus {
    #[serde(flatten)]
    run: RunInfo,
    phase: RunPhase,
    status: ComponentStatus,
}

/// 200 while the run is healthy or degraded, 503 once a component failed
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = RunReadiness {
        run_id: state.run.run_id.clone(),
        phase: state.health_registry.phase().await,
        readiness,
    };
    (status_code, Json(body))
}

async fn run_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let body = RunStatus {
        run: state.run.clone(),
        phase: health.phase,
        status: health.status,
    };
    Json(body)
}

/// Prometheus text exposition of the process registry
async fn metrics() -> impl IntoResponse {
    let mut buffer = Vec::new();

    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/run", get(run_status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the status API until the process exits
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!(addr = %addr, run_id = %state.run.run_id, "Starting status API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
