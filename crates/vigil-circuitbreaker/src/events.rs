//! Events emitted by the circuit breaker.

use crate::circuit::CircuitState;
use std::time::Instant;
use vigil_core::CoreEvent;

/// Events observable via [`EventListeners`](vigil_core::EventListeners).
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        circuit: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
    },
    /// A call was permitted through.
    CallPermitted {
        circuit: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected without invoking the operation.
    CallRejected { circuit: String, timestamp: Instant },
    /// The wrapped operation succeeded.
    SuccessRecorded {
        circuit: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// The wrapped operation failed.
    FailureRecorded {
        circuit: String,
        timestamp: Instant,
        state: CircuitState,
    },
}

impl CoreEvent for CircuitBreakerEvent {
    fn event_kind(&self) -> &'static str {
        match self {
            CircuitBreakerEvent::StateTransition { .. } => "state_transition",
            CircuitBreakerEvent::CallPermitted { .. } => "call_permitted",
            CircuitBreakerEvent::CallRejected { .. } => "call_rejected",
            CircuitBreakerEvent::SuccessRecorded { .. } => "success_recorded",
            CircuitBreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CircuitBreakerEvent::StateTransition { timestamp, .. }
            | CircuitBreakerEvent::CallPermitted { timestamp, .. }
            | CircuitBreakerEvent::CallRejected { timestamp, .. }
            | CircuitBreakerEvent::SuccessRecorded { timestamp, .. }
            | CircuitBreakerEvent::FailureRecorded { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            CircuitBreakerEvent::StateTransition { circuit, .. }
            | CircuitBreakerEvent::CallPermitted { circuit, .. }
            | CircuitBreakerEvent::CallRejected { circuit, .. }
            | CircuitBreakerEvent::SuccessRecorded { circuit, .. }
            | CircuitBreakerEvent::FailureRecorded { circuit, .. } => circuit,
        }
    }
}
