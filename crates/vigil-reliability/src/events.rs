//! Events emitted by the orchestrator and the self-healing coordinator.

use std::time::{Duration, Instant};
use vigil_core::CoreEvent;

/// Events observable via [`EventListeners`](vigil_core::EventListeners).
#[derive(Debug, Clone)]
pub enum ReliabilityEvent {
    /// A context was lazily created on first use.
    ContextCreated { context: String, timestamp: Instant },
    /// A call was rejected by the health gate.
    CallRejected { context: String, timestamp: Instant },
    /// The context was marked degraded.
    ContextDegraded { context: String, timestamp: Instant },
    /// The context crossed its failure limit and was isolated.
    ContextIsolated {
        context: String,
        timestamp: Instant,
        failures: u64,
    },
    /// A recovery attempt is about to run after its back-off.
    RecoveryAttempt {
        context: String,
        timestamp: Instant,
        attempt: u32,
        backoff: Duration,
    },
    /// Recovery probed successfully; the context is healthy again.
    RecoverySucceeded {
        context: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// Recovery gave up; the context is permanently degraded.
    RecoveryEscalated {
        context: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl CoreEvent for ReliabilityEvent {
    fn event_kind(&self) -> &'static str {
        match self {
            ReliabilityEvent::ContextCreated { .. } => "context_created",
            ReliabilityEvent::CallRejected { .. } => "call_rejected",
            ReliabilityEvent::ContextDegraded { .. } => "context_degraded",
            ReliabilityEvent::ContextIsolated { .. } => "context_isolated",
            ReliabilityEvent::RecoveryAttempt { .. } => "recovery_attempt",
            ReliabilityEvent::RecoverySucceeded { .. } => "recovery_succeeded",
            ReliabilityEvent::RecoveryEscalated { .. } => "recovery_escalated",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ReliabilityEvent::ContextCreated { timestamp, .. }
            | ReliabilityEvent::CallRejected { timestamp, .. }
            | ReliabilityEvent::ContextDegraded { timestamp, .. }
            | ReliabilityEvent::ContextIsolated { timestamp, .. }
            | ReliabilityEvent::RecoveryAttempt { timestamp, .. }
            | ReliabilityEvent::RecoverySucceeded { timestamp, .. }
            | ReliabilityEvent::RecoveryEscalated { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            ReliabilityEvent::ContextCreated { context, .. }
            | ReliabilityEvent::CallRejected { context, .. }
            | ReliabilityEvent::ContextDegraded { context, .. }
            | ReliabilityEvent::ContextIsolated { context, .. }
            | ReliabilityEvent::RecoveryAttempt { context, .. }
            | ReliabilityEvent::RecoverySucceeded { context, .. }
            | ReliabilityEvent::RecoveryEscalated { context, .. } => context,
        }
    }
}
