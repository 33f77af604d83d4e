//! Health and metrics endpoints served over real sockets.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use vigil_bulkhead::Bulkhead;
use vigil_healthcheck::{HealthChecker, ProbeResult};
use vigil_observability::{
    monitoring_router, MetricKey, ObservabilityConfig, ObservabilityManager,
    ReliabilityComponent,
};

async fn http_get(addr: std::net::SocketAddr, path: &str) -> (u16, String) {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, response)
}

#[tokio::test]
async fn health_endpoint_serves_200_then_503() {
    let health = Arc::new(HealthChecker::builder().build());
    let manager = Arc::new(ObservabilityManager::new(
        ObservabilityConfig::builder().prometheus(true).build(),
        Arc::clone(&health),
    ));

    health.register("db", || async { ProbeResult::healthy() });
    health.run_once().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = monitoring_router(Arc::clone(&manager));
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let (status, body) = http_get(addr, "/health").await;
    assert_eq!(status, 200);
    assert!(body.contains("\"status\":\"healthy\""));

    health.register("db", || async {
        ProbeResult::unhealthy().detail("error", "connection refused")
    });
    health.run_once().await;

    let (status, body) = http_get(addr, "/health").await;
    assert_eq!(status, 503);
    assert!(body.contains("\"status\":\"unhealthy\""));
    assert!(body.contains("connection refused"));

    server.abort();
}

#[tokio::test]
async fn metrics_endpoint_exposes_the_text_format() {
    let health = Arc::new(HealthChecker::builder().build());
    let manager = Arc::new(ObservabilityManager::new(
        ObservabilityConfig::builder().prometheus(true).build(),
        health,
    ));
    manager.increment_counter(
        MetricKey::new("vigil_requests_total").label("worker", "3"),
        42,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = monitoring_router(Arc::clone(&manager));
    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let (status, body) = http_get(addr, "/metrics").await;
    assert_eq!(status, 200);
    assert!(body.contains("vigil_requests_total{worker=\"3\"} 42"));

    server.abort();
}

#[tokio::test]
async fn registered_bulkhead_rolls_into_overall_health() {
    let health = Arc::new(HealthChecker::builder().build());
    let manager = Arc::new(ObservabilityManager::new(
        ObservabilityConfig::default(),
        Arc::clone(&health),
    ));

    let bulkhead = Arc::new(Bulkhead::builder().build());
    manager.register_reliability_component(
        "bulkhead",
        ReliabilityComponent::Bulkhead(Arc::clone(&bulkhead)),
    );

    health.run_once().await;
    assert_eq!(
        manager.health_report().await.overall.status,
        vigil_healthcheck::HealthStatus::Healthy
    );

    // Isolate a compartment; the rollup degrades.
    let _ = bulkhead
        .execute("edge", || async { Err::<(), _>("boom") })
        .await;
    health.run_once().await;
    assert_eq!(
        manager.health_report().await.overall.status,
        vigil_healthcheck::HealthStatus::Degraded
    );
}
