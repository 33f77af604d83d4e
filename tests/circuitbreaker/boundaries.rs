//! Exact threshold boundaries.

use std::time::Duration;
use vigil_circuitbreaker::{CircuitBreaker, CircuitState};

#[tokio::test]
async fn four_failures_keep_the_circuit_closed() {
    let breaker = CircuitBreaker::builder().name("boundary").build();

    for _ in 0..4 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);

    // A success resets the consecutive count; four more still do not trip it.
    breaker
        .execute(|| async { Ok::<(), &str>(()) })
        .await
        .unwrap();
    for _ in 0..4 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);

    let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    assert_eq!(breaker.state().await, CircuitState::Open);
}

#[tokio::test]
async fn recovery_delay_is_respected() {
    let breaker = CircuitBreaker::builder()
        .name("boundary")
        .recovery_delay(Duration::from_millis(50))
        .build();

    for _ in 0..5 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }

    // Before the delay the circuit still fast-fails.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let early = breaker.execute(|| async { Ok::<(), &str>(()) }).await;
    assert!(early.is_err());
    assert_eq!(breaker.state().await, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(60)).await;
    breaker
        .execute(|| async { Ok::<(), &str>(()) })
        .await
        .unwrap();
    assert_eq!(breaker.state().await, CircuitState::HalfOpen);
}

#[tokio::test]
async fn reset_restores_a_fresh_circuit() {
    let breaker = CircuitBreaker::builder().name("boundary").build();

    for _ in 0..5 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    breaker.reset().await;
    breaker.reset().await;

    let stats = breaker.stats().await;
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.calls, 0);
    assert_eq!(stats.failures, 0);

    // The thresholds behave as on a new circuit.
    for _ in 0..4 {
        let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
    }
    assert_eq!(breaker.state().await, CircuitState::Closed);
}
