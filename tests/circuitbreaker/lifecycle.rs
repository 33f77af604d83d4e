//! Full recovery cycle through open and half-open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vigil_circuitbreaker::{CircuitBreaker, CircuitBreakerError, CircuitState};

#[tokio::test]
async fn opens_rejects_then_recovers_through_half_open() {
    let breaker = CircuitBreaker::builder().name("downstream").build();
    let invocations = Arc::new(AtomicUsize::new(0));

    // Calls 1-5 fail; the fifth opens the circuit.
    for _ in 0..5 {
        let invocations = Arc::clone(&invocations);
        let result = breaker
            .execute(move || async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::Inner("boom"))));
    }
    assert_eq!(breaker.state().await, CircuitState::Open);
    assert_eq!(invocations.load(Ordering::SeqCst), 5);

    // Call 6 is rejected without invoking the operation.
    let invocations_clone = Arc::clone(&invocations);
    let rejected = breaker
        .execute(move || async move {
            invocations_clone.fetch_add(1, Ordering::SeqCst);
            Ok::<(), &str>(())
        })
        .await;
    assert!(matches!(rejected, Err(CircuitBreakerError::CircuitOpen)));
    assert_eq!(invocations.load(Ordering::SeqCst), 5);

    // Past the recovery delay the next call probes in half-open.
    tokio::time::sleep(Duration::from_millis(15)).await;

    for _ in 0..3 {
        let invocations = Arc::clone(&invocations);
        breaker
            .execute(move || async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<(), &str>(())
            })
            .await
            .unwrap();
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);
    assert_eq!(invocations.load(Ordering::SeqCst), 8);

    // closed -> open, open -> half_open, half_open -> closed
    assert_eq!(breaker.stats().await.state_changes, 3);
}

#[tokio::test]
async fn half_open_failure_goes_straight_back_to_open() {
    let breaker = CircuitBreaker::builder().name("downstream").build();

    for _ in 0..5 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }
    tokio::time::sleep(Duration::from_millis(15)).await;

    let result = breaker.execute(|| async { Err::<(), _>("still down") }).await;
    assert!(matches!(result, Err(CircuitBreakerError::Inner(_))));
    assert_eq!(breaker.state().await, CircuitState::Open);
}
