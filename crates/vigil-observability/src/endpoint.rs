//! Monitoring endpoints: health and Prometheus metrics over HTTP.

use crate::ObservabilityManager;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use vigil_healthcheck::HealthStatus;

/// Builds the monitoring router: `GET {health_path}` and `GET /metrics`.
pub fn monitoring_router(manager: Arc<ObservabilityManager>) -> Router {
    let health_path = manager.config().health_path.clone();
    Router::new()
        .route(&health_path, get(health))
        .route("/metrics", get(metrics))
        .with_state(manager)
}

/// Binds the monitoring endpoints on the configured dashboard port.
///
/// Returns the join handle of the serving task, or `None` when no port is
/// configured.
pub async fn serve_monitoring(
    manager: Arc<ObservabilityManager>,
) -> std::io::Result<Option<tokio::task::JoinHandle<()>>> {
    let Some(port) = manager.config().dashboard_port() else {
        return Ok(None);
    };
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    let router = monitoring_router(manager);

    tracing::info!(port, "monitoring endpoints listening");
    let handle = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(%error, "monitoring endpoint server exited");
        }
    });
    Ok(Some(handle))
}

async fn health(State(manager): State<Arc<ObservabilityManager>>) -> impl IntoResponse {
    let report = manager.health_report().await;
    let code = if report.overall.status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

async fn metrics(State(manager): State<Arc<ObservabilityManager>>) -> impl IntoResponse {
    if !manager.config().prometheus_enabled {
        return (StatusCode::NOT_FOUND, String::new()).into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        manager.render_prometheus(),
    )
        .into_response()
}
