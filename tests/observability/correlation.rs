//! Correlation across traces, metrics and reliability components.

use std::collections::BTreeMap;
use std::sync::Arc;
use vigil_healthcheck::HealthChecker;
use vigil_observability::{ObservabilityConfig, ObservabilityManager, SpanStatus};
use vigil_reliability::ReliabilityOrchestrator;

fn manager() -> Arc<ObservabilityManager> {
    Arc::new(ObservabilityManager::new(
        ObservabilityConfig::default(),
        Arc::new(HealthChecker::builder().build()),
    ))
}

#[tokio::test]
async fn correlation_ids_are_unique_per_operation() {
    let manager = manager();

    for _ in 0..5 {
        let _: Result<(), &str> = manager
            .trace_operation("op", BTreeMap::new(), |_| async { Ok(()) })
            .await;
    }

    let spans = manager.finished_spans();
    assert_eq!(spans.len(), 5);
    let mut ids: Vec<_> = spans.iter().map(|s| s.correlation_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn spans_record_the_reliability_components_they_cross() {
    let manager = manager();

    let orchestrator = Arc::new(
        ReliabilityOrchestrator::builder()
            .listener(manager.observe("orchestrator"))
            .build(),
    );

    let result: Result<(), &str> = manager
        .trace_operation(
            "checkout",
            BTreeMap::from([("tenant".to_string(), "acme".to_string())]),
            |_| {
                let orchestrator = Arc::clone(&orchestrator);
                async move {
                    orchestrator
                        .execute("payments", || async { Ok::<_, &str>(()) })
                        .await
                        .ok();
                    Ok(())
                }
            },
        )
        .await;
    result.unwrap();

    let spans = manager.finished_spans();
    let span = &spans[0];
    assert_eq!(span.operation, "checkout");
    assert_eq!(span.status, SpanStatus::Ok);
    assert_eq!(span.attributes["tenant"], "acme");
    assert!(span
        .components
        .contains(&"orchestrator".to_string()));
}

#[tokio::test]
async fn error_operations_record_error_status() {
    let manager = manager();

    let result: Result<(), &str> = manager
        .trace_operation("failing", BTreeMap::new(), |_| async { Err("boom") })
        .await;
    assert!(result.is_err());

    let spans = manager.finished_spans();
    assert_eq!(spans[0].status, SpanStatus::Error);
}
