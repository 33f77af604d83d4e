//! Composed behavior of the protected-call path.

use std::sync::Arc;
use std::time::Duration;
use vigil_bulkhead::Bulkhead;
use vigil_reliability::{ReliabilityError, ReliabilityOrchestrator};

#[tokio::test]
async fn healthy_context_serves_and_counts() {
    let orchestrator = ReliabilityOrchestrator::builder().build();

    for n in 0..10u32 {
        let value = orchestrator
            .execute("api", move || async move { Ok::<_, &str>(n * 2) })
            .await
            .unwrap();
        assert_eq!(value, n * 2);
    }

    let stats = orchestrator.context_stats("api").await.unwrap();
    assert!(stats.healthy);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.uptime_percent, 100.0);
}

#[tokio::test]
async fn rejections_are_variants_not_inner_faults() {
    let orchestrator = ReliabilityOrchestrator::builder()
        .healing_initial_backoff(Duration::from_secs(60))
        .build();

    let fault = orchestrator
        .execute("svc", || async { Err::<(), _>("boom") })
        .await
        .unwrap_err();
    assert!(!fault.is_rejection());
    assert_eq!(fault.into_inner(), Some("boom"));

    // The failed context rejects with a typed variant.
    let rejection = orchestrator
        .execute("svc", || async { Ok::<(), &str>(()) })
        .await
        .unwrap_err();
    assert!(rejection.is_rejection());
    assert!(matches!(
        rejection,
        ReliabilityError::ContextUnhealthy { .. }
    ));
}

#[tokio::test]
async fn shared_bulkhead_is_visible_through_the_orchestrator() {
    let bulkhead = Arc::new(Bulkhead::builder().build());
    let orchestrator = ReliabilityOrchestrator::builder()
        .bulkhead(Arc::clone(&bulkhead))
        .build();

    orchestrator
        .execute("checkout", || async { Ok::<_, &str>(()) })
        .await
        .unwrap();

    let stats = bulkhead.stats("checkout").await.unwrap();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.max_concurrent, 100);
}

#[tokio::test]
async fn per_call_deadline_cancels_and_counts() {
    let orchestrator = ReliabilityOrchestrator::builder()
        .healing_initial_backoff(Duration::from_secs(60))
        .build();

    let result = orchestrator
        .execute_with_deadline("slow", Duration::from_millis(20), || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, &str>(())
        })
        .await;
    assert!(matches!(result, Err(ReliabilityError::Timeout { .. })));

    let stats = orchestrator.context_stats("slow").await.unwrap();
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn uptime_gauge_degrades_with_failures_but_stays_bounded() {
    let orchestrator = ReliabilityOrchestrator::builder()
        .recent_failure_window(Duration::ZERO)
        .healing_initial_backoff(Duration::from_secs(60))
        .build();

    let _ = orchestrator
        .execute("svc", || async { Err::<(), _>("boom") })
        .await;

    let uptime = orchestrator.uptime_percent();
    assert!((0.0..=100.0).contains(&uptime));
}
