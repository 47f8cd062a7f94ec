//! Building monitor daemon
//!
//! Runs the monitoring loop over a simulated building and serves status,
//! anomaly and alert queries over HTTP until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use building_monitor::{api, config::AgentConfig, simulation};
use monitor_lib::MonitoringLoop;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting building-monitor");

    let config = AgentConfig::load()?;
    let monitoring_config = config
        .monitoring_config()
        .context("invalid monitoring configuration")?;
    info!(
        node_name = %config.node_name,
        building = %config.building_name,
        "Monitor configured"
    );

    let registry = simulation::demo_registry(
        config.demo_zones,
        config.simulation_seed,
        config.failure_probability,
    )?;

    let monitor = Arc::new(
        MonitoringLoop::builder()
            .config(monitoring_config)
            .registry(Arc::new(registry))
            .building_name(config.building_name.clone())
            .node_name(config.node_name.clone())
            .build()?,
    );
    monitor.start();

    // Start the API server; it drains when the shutdown sender fires
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app_state = Arc::new(api::AppState::new(Arc::clone(&monitor)));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = shutdown_rx.await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    monitor.stop().await;

    if let Some(path) = &config.export_on_shutdown {
        if let Err(e) = monitor.export(path, None).await {
            error!(path = %path.display(), error = %e, "Failed to export monitoring data");
        }
    }

    let _ = shutdown_tx.send(());
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
    }

    Ok(())
}
