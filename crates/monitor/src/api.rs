//! HTTP API for monitoring queries, health checks and Prometheus metrics

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use monitor_lib::MonitoringLoop;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<MonitoringLoop>,
}

impl AppState {
    pub fn new(monitor: Arc<MonitoringLoop>) -> Self {
        Self { monitor }
    }
}

/// `?hours=N` window selector
#[derive(Debug, Default, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

impl HoursQuery {
    fn or(&self, default: i64) -> i64 {
        self.hours.unwrap_or(default)
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Liveness: always 200 while the process serves requests
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "running": state.monitor.is_running(),
    }))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics");
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.status())
}

async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.monitor.dashboard().await)
}

async fn anomaly_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    Json(state.monitor.anomaly_summary(query.or(24)).await)
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    Json(state.monitor.recent_alerts(query.or(24)))
}

async fn readings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    Json(state.monitor.recent_readings(query.or(1)).await)
}

async fn sensor_stats(
    State(state): State<Arc<AppState>>,
    Path(sensor_id): Path<String>,
    Query(query): Query<HoursQuery>,
) -> Response {
    match state.monitor.sensor_statistics(&sensor_id, query.or(24)).await {
        Some(stats) => Json(stats).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("sensor '{}' not found", sensor_id),
        ),
    }
}

async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    Json(state.monitor.export_snapshot(query.hours).await)
}

/// Run one sampling and detection pass immediately
async fn step(State(state): State<Arc<AppState>>) -> Response {
    match state.monitor.simulate_step().await {
        Ok(anomalies) => {
            info!(anomalies = anomalies.len(), "Manual step complete");
            Json(state.monitor.status()).into_response()
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "Manual step failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route("/api/v1/dashboard", get(dashboard))
        .route("/api/v1/anomalies/summary", get(anomaly_summary))
        .route("/api/v1/alerts", get(alerts))
        .route("/api/v1/readings", get(readings))
        .route("/api/v1/sensors/:sensor_id/stats", get(sensor_stats))
        .route("/api/v1/export", get(export))
        .route("/api/v1/step", post(step))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
