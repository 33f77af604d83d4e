//! Events emitted by the bulkhead.

use std::time::{Duration, Instant};
use vigil_core::CoreEvent;

/// Why a call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Isolated,
    AtCapacity,
}

/// Events observable via [`EventListeners`](vigil_core::EventListeners).
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A compartment was lazily created on first use.
    CompartmentCreated {
        compartment: String,
        timestamp: Instant,
        max_concurrent: usize,
    },
    /// A call acquired a slot.
    CallPermitted {
        compartment: String,
        timestamp: Instant,
        active: usize,
    },
    /// A call was rejected before running.
    CallRejected {
        compartment: String,
        timestamp: Instant,
        reason: RejectReason,
    },
    /// A permitted call finished successfully.
    CallFinished {
        compartment: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// A permitted call failed (including deadline expiry).
    CallFailed {
        compartment: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// The compartment crossed the isolation threshold.
    CompartmentIsolated {
        compartment: String,
        timestamp: Instant,
        failure_rate: f64,
    },
    /// The compartment was recovered and its counters reset.
    CompartmentRecovered {
        compartment: String,
        timestamp: Instant,
    },
}

impl CoreEvent for BulkheadEvent {
    fn event_kind(&self) -> &'static str {
        match self {
            BulkheadEvent::CompartmentCreated { .. } => "compartment_created",
            BulkheadEvent::CallPermitted { .. } => "call_permitted",
            BulkheadEvent::CallRejected { .. } => "call_rejected",
            BulkheadEvent::CallFinished { .. } => "call_finished",
            BulkheadEvent::CallFailed { .. } => "call_failed",
            BulkheadEvent::CompartmentIsolated { .. } => "compartment_isolated",
            BulkheadEvent::CompartmentRecovered { .. } => "compartment_recovered",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            BulkheadEvent::CompartmentCreated { timestamp, .. }
            | BulkheadEvent::CallPermitted { timestamp, .. }
            | BulkheadEvent::CallRejected { timestamp, .. }
            | BulkheadEvent::CallFinished { timestamp, .. }
            | BulkheadEvent::CallFailed { timestamp, .. }
            | BulkheadEvent::CompartmentIsolated { timestamp, .. }
            | BulkheadEvent::CompartmentRecovered { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            BulkheadEvent::CompartmentCreated { compartment, .. }
            | BulkheadEvent::CallPermitted { compartment, .. }
            | BulkheadEvent::CallRejected { compartment, .. }
            | BulkheadEvent::CallFinished { compartment, .. }
            | BulkheadEvent::CallFailed { compartment, .. }
            | BulkheadEvent::CompartmentIsolated { compartment, .. }
            | BulkheadEvent::CompartmentRecovered { compartment, .. } => compartment,
        }
    }
}
