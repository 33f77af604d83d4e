//! Property tests for the circuit breaker.
//!
//! Invariants tested:
//! - Only the four legal state transitions ever occur
//! - The circuit opens at exactly the consecutive-failure threshold
//! - Rejected calls never invoke the operation

use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Runtime;
use vigil_circuitbreaker::{CircuitBreaker, CircuitState};

fn allowed(from: CircuitState, to: CircuitState) -> bool {
    matches!(
        (from, to),
        (CircuitState::Closed, CircuitState::Open)
            | (CircuitState::Open, CircuitState::HalfOpen)
            | (CircuitState::HalfOpen, CircuitState::Closed)
            | (CircuitState::HalfOpen, CircuitState::Open)
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: random success/failure sequences only drive the circuit
    /// through the legal transition graph.
    #[test]
    fn transition_graph_is_closed(outcomes in proptest::collection::vec(any::<bool>(), 1..120)) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let transitions = Arc::new(Mutex::new(Vec::new()));
            let transitions_clone = Arc::clone(&transitions);

            let breaker = CircuitBreaker::builder()
                .name("prop")
                .recovery_delay(Duration::from_millis(1))
                .on_state_transition(move |from, to| {
                    transitions_clone.lock().unwrap().push((from, to));
                })
                .build();

            for ok in outcomes {
                let _ = breaker
                    .execute(move || async move {
                        if ok { Ok::<(), &str>(()) } else { Err("boom") }
                    })
                    .await;
                // Give open circuits a chance to half-open occasionally.
                tokio::time::sleep(Duration::from_micros(300)).await;
            }

            for (from, to) in transitions.lock().unwrap().iter() {
                prop_assert!(allowed(*from, *to), "illegal transition {from:?} -> {to:?}");
            }
            Ok(())
        })?;
    }

    /// Property: with a generous recovery delay, exactly `threshold`
    /// consecutive failures open the circuit, never fewer.
    #[test]
    fn opens_at_exactly_the_threshold(threshold in 1u32..12) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let breaker = CircuitBreaker::builder()
                .name("prop")
                .failure_threshold(threshold)
                .recovery_delay(Duration::from_secs(3600))
                .build();

            for n in 0..threshold {
                prop_assert_eq!(breaker.state().await, CircuitState::Closed, "failure {}", n);
                let _ = breaker.execute(|| async { Err::<(), _>("boom") }).await;
            }
            prop_assert_eq!(breaker.state().await, CircuitState::Open);
            Ok(())
        })?;
    }

    /// Property: once open (with a long recovery delay), no further call
    /// reaches the operation.
    #[test]
    fn open_circuit_never_invokes(extra_calls in 1usize..40) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let breaker = CircuitBreaker::builder()
                .name("prop")
                .recovery_delay(Duration::from_secs(3600))
                .build();
            let invocations = Arc::new(AtomicUsize::new(0));

            for _ in 0..5 {
                let invocations = Arc::clone(&invocations);
                let _ = breaker
                    .execute(move || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>("boom")
                    })
                    .await;
            }

            for _ in 0..extra_calls {
                let invocations = Arc::clone(&invocations);
                let _ = breaker
                    .execute(move || async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        Ok::<(), &str>(())
                    })
                    .await;
            }

            prop_assert_eq!(invocations.load(Ordering::SeqCst), 5);
            Ok(())
        })?;
    }
}
