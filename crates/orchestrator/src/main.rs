//! Load Orchestrator - diurnal load test runner
//!
//! Samples per-pod resource usage from the cluster metrics API while a
//! traffic driver runs, then writes the collected samples to CSV.

use anyhow::{Context, Result};
use load_orchestrator::{api, config::RunConfig};
use loadtest_lib::{
    health::components, CsvExporter, HarnessMetrics, HealthRegistry, HttpResourceSource,
    Orchestrator,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting load-orchestrator");

    let config = RunConfig::load()?;
    info!(
        api_base = %config.api_base,
        cluster_id = %config.cluster_id,
        target_host = %config.target_host,
        run_time_secs = config.run_time_secs,
        "Orchestrator configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::EXPORTER).await;
    let metrics = HarnessMetrics::new();

    let source = HttpResourceSource::new(&config.api_base, &config.cluster_id, config.fetch_timeout())
        .context("failed to build metrics source")?;
    let orchestrator = Orchestrator::new(
        Arc::new(source),
        config.driver_command(),
        config.orchestrator_config(),
    )?
    .with_health(health_registry.clone());

    let run = api::RunInfo {
        run_id: orchestrator.run_id().to_string(),
        target_host: config.target_host.clone(),
        run_time_secs: config.run_time_secs,
        csv_out: config.csv_out.display().to_string(),
    };
    let app_state = Arc::new(api::AppState::new(run, health_registry, metrics));
    let api_handle = tokio::spawn(api::serve(config.status_port, app_state));

    let exporter = CsvExporter::new(&config.csv_out);

    // Ctrl-C stops the driver early; collected samples are still exported
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
        warn!(run_id = %orchestrator.run_id(), "Interrupt received, finishing run early");
    };
    let completed = orchestrator
        .run_and_export_until(&exporter, interrupt)
        .await?;
    api_handle.abort();

    if let Some(e) = completed.export_error {
        return Err(e).with_context(|| {
            format!(
                "collected {} samples but could not write {}",
                completed.result.samples.len(),
                config.csv_out.display()
            )
        });
    }

    info!(
        run_id = %orchestrator.run_id(),
        samples = completed.result.samples.len(),
        degraded = completed.result.is_degraded(),
        csv_out = %config.csv_out.display(),
        "Usage data saved"
    );

    Ok(())
}
