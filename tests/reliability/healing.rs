//! Self-healing recovery and escalation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{EventListener, FnListener};
use vigil_reliability::{ReliabilityEvent, ReliabilityOrchestrator};

fn counting_listener(
    attempts: Arc<AtomicUsize>,
    recovered: Arc<AtomicUsize>,
    escalated: Arc<AtomicUsize>,
) -> impl EventListener<ReliabilityEvent> {
    FnListener::new(move |event: &ReliabilityEvent| match event {
        ReliabilityEvent::RecoveryAttempt { .. } => {
            attempts.fetch_add(1, Ordering::SeqCst);
        }
        ReliabilityEvent::RecoverySucceeded { .. } => {
            recovered.fetch_add(1, Ordering::SeqCst);
        }
        ReliabilityEvent::RecoveryEscalated { .. } => {
            escalated.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    })
}

#[tokio::test]
async fn failure_triggers_recovery_and_the_gate_reopens() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let recovered = Arc::new(AtomicUsize::new(0));
    let escalated = Arc::new(AtomicUsize::new(0));

    let orchestrator = ReliabilityOrchestrator::builder()
        .healing_initial_backoff(Duration::from_millis(20))
        .listener(counting_listener(
            Arc::clone(&attempts),
            Arc::clone(&recovered),
            Arc::clone(&escalated),
        ))
        .build();

    let _ = orchestrator
        .execute("svc", || async { Err::<(), _>("boom") })
        .await;
    assert!(!orchestrator.is_healthy("svc").await);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(recovered.load(Ordering::SeqCst) >= 1);
    assert_eq!(escalated.load(Ordering::SeqCst), 0);
    assert!(orchestrator.is_healthy("svc").await);

    orchestrator
        .execute("svc", || async { Ok::<_, &str>(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn exhausted_recovery_escalates_to_permanent_degradation() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let recovered = Arc::new(AtomicUsize::new(0));
    let escalated = Arc::new(AtomicUsize::new(0));

    let orchestrator = Arc::new(
        ReliabilityOrchestrator::builder()
            .healing_initial_backoff(Duration::from_millis(5))
            .healing_max_backoff(Duration::from_millis(10))
            .healing_max_attempts(3)
            .listener(counting_listener(
                Arc::clone(&attempts),
                Arc::clone(&recovered),
                Arc::clone(&escalated),
            ))
            .build(),
    );

    // Probes that always fail keep every recovery attempt failing.
    orchestrator
        .register_probe(
            "doomed",
            Arc::new(|| Box::pin(async { Err::<(), ()>(()) })),
        )
        .await;

    let _ = orchestrator
        .execute("doomed", || async { Err::<(), _>("boom") })
        .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(recovered.load(Ordering::SeqCst), 0);
    assert_eq!(escalated.load(Ordering::SeqCst), 1);

    let stats = orchestrator.context_stats("doomed").await.unwrap();
    assert!(!stats.healthy);
    assert!(stats.degraded);

    // Operator recovery is the only way back.
    orchestrator.recover_context("doomed").await;
    assert!(orchestrator.is_healthy("doomed").await);
}
