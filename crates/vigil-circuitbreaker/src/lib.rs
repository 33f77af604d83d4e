//! Fast-fail circuit breaker guarding one protected call scope.
//!
//! The circuit tracks consecutive failures:
//! - **Closed**: calls flow; the circuit opens at 5 consecutive failures
//! - **Open**: calls are rejected until the recovery delay (10 ms) elapses
//! - **Half-open**: probe calls flow; 3 consecutive successes close the
//!   circuit, any failure reopens it
//!
//! ```rust
//! use vigil_circuitbreaker::{CircuitBreaker, CircuitBreakerError};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::builder().name("payments").build();
//!
//! let result: Result<u32, CircuitBreakerError<&str>> = breaker
//!     .execute(|| async { Ok::<_, &str>(42) })
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```
//!
//! A rejected call increments the failure counter but never invokes the
//! operation; the caller gets [`CircuitBreakerError::CircuitOpen`].
//! Operator controls (`force_open`, `force_closed`, `reset`) and a
//! [`CircuitStats`] snapshot round out the surface. For tower stacks the
//! same circuit is available as a [`CircuitBreakerLayer`].

use std::future::Future;
use std::sync::atomic::AtomicU8;
use std::sync::Arc;
use tokio::sync::Mutex;

#[cfg(feature = "metrics")]
use metrics::{describe_counter, describe_gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

pub use circuit::{CircuitState, CircuitStats};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use layer::{CircuitBreakerLayer, CircuitBreakerService};

mod circuit;
mod config;
mod error;
mod events;
mod layer;

use circuit::Circuit;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

/// A three-state failure detector guarding a protected call site.
///
/// Cheap to share: clone the surrounding `Arc` rather than the breaker.
pub struct CircuitBreaker {
    circuit: Mutex<Circuit>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<CircuitBreakerConfig>,
}

impl CircuitBreaker {
    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "circuitbreaker_calls_total",
                "Calls through the circuit breaker by outcome"
            );
            describe_counter!(
                "circuitbreaker_transitions_total",
                "Circuit state transitions"
            );
            describe_gauge!("circuitbreaker_state", "Current circuit state (0/1/2)");
        });

        let state_atomic = Arc::new(AtomicU8::new(CircuitState::Closed as u8));
        Self {
            circuit: Mutex::new(Circuit::new(Arc::clone(&state_atomic))),
            state_atomic,
            config: Arc::new(config),
        }
    }

    /// Returns a builder with the default thresholds.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Scope name this circuit guards.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Runs `op` under the circuit.
    ///
    /// Returns the operation's result, re-raising its fault as
    /// [`CircuitBreakerError::Inner`], or [`CircuitBreakerError::CircuitOpen`]
    /// when the call is rejected. A rejection counts as a failure without
    /// invoking `op`.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permitted = {
            let mut circuit = self.circuit.lock().await;
            circuit.try_acquire(&self.config)
        };

        if !permitted {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        let result = op().await;

        let mut circuit = self.circuit.lock().await;
        match &result {
            Ok(_) => circuit.record_success(&self.config),
            Err(_) => circuit.record_failure(&self.config),
        }

        result.map_err(CircuitBreakerError::Inner)
    }

    /// Forces the circuit open. A fresh recovery window starts now.
    pub async fn force_open(&self) {
        self.circuit.lock().await.force_open(&self.config);
    }

    /// Forces the circuit closed.
    pub async fn force_closed(&self) {
        self.circuit.lock().await.force_closed(&self.config);
    }

    /// Closes the circuit and zeroes every counter. Idempotent.
    pub async fn reset(&self) {
        self.circuit.lock().await.reset(&self.config);
    }

    /// Current state.
    pub async fn state(&self) -> CircuitState {
        self.circuit.lock().await.state()
    }

    /// Current state without async context, from an atomic mirror.
    ///
    /// Safe to call from metrics collection or health probes.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(std::sync::atomic::Ordering::Acquire))
    }

    /// Counter snapshot including state and computed failure rate.
    pub async fn stats(&self) -> CircuitStats {
        self.circuit.lock().await.stats()
    }
}
