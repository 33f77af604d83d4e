//! Failure-rate auto-isolation and recovery.

use vigil_bulkhead::{Bulkhead, BulkheadError};

#[tokio::test]
async fn majority_failures_isolate_and_recovery_reopens() {
    let bulkhead = Bulkhead::builder().build();

    // Four successes keep the rate down, then failures push it past 50 %.
    for _ in 0..4 {
        bulkhead
            .execute("flaky", || async { Ok::<_, &str>(()) })
            .await
            .unwrap();
    }
    let mut outcomes = Vec::new();
    for _ in 0..6 {
        outcomes.push(
            bulkhead
                .execute("flaky", || async { Err::<(), _>("boom") })
                .await,
        );
    }

    // The isolation threshold was crossed mid-burst; the tail of the calls
    // got the isolation rejection instead of reaching the operation.
    assert!(bulkhead.stats("flaky").await.unwrap().isolated);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(BulkheadError::CompartmentIsolated { .. }))));

    let rejected = bulkhead
        .execute("flaky", || async { Ok::<_, &str>(()) })
        .await;
    assert!(matches!(
        rejected,
        Err(BulkheadError::CompartmentIsolated { .. })
    ));
    assert!(!bulkhead.is_compartment_healthy("flaky").await);

    // Recovery clears the flag and the counters; calls flow again.
    bulkhead.recover_compartment("flaky").await;
    let stats = bulkhead.stats("flaky").await.unwrap();
    assert!(!stats.isolated);
    assert_eq!(stats.requests, 0);
    assert_eq!(stats.failures, 0);

    bulkhead
        .execute("flaky", || async { Ok::<_, &str>(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn counters_respect_the_accounting_invariant() {
    let bulkhead = Bulkhead::builder().build();

    for n in 0..20 {
        if n % 3 == 2 {
            let _ = bulkhead
                .execute("mixed", || async { Err::<(), _>("boom") })
                .await;
        } else {
            let _ = bulkhead
                .execute("mixed", || async { Ok::<_, &str>(()) })
                .await;
        }
    }

    let stats = bulkhead.stats("mixed").await.unwrap();
    assert!(stats.successes + stats.failures <= stats.requests);
}
