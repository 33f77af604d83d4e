//! Error types for the reliability orchestrator.

use std::time::Duration;
use thiserror::Error;
use vigil_bulkhead::BulkheadError;
use vigil_circuitbreaker::CircuitBreakerError;

/// Errors surfaced by [`ReliabilityOrchestrator::execute`](crate::ReliabilityOrchestrator::execute).
///
/// Rejections are ordinary variants of this sum type; only the wrapped
/// operation's own fault travels in [`ReliabilityError::Inner`].
#[derive(Debug, Error)]
pub enum ReliabilityError<E> {
    /// The context is unhealthy; self-healing runs internally.
    #[error("context {context:?} is unhealthy")]
    ContextUnhealthy { context: String },

    /// Fast-fail from the circuit breaker; retryable after its recovery delay.
    #[error("circuit is open; call not permitted")]
    CircuitOpen,

    /// Bulkhead rejection: the compartment is isolated.
    #[error("compartment {compartment:?} is isolated")]
    CompartmentIsolated { compartment: String },

    /// Bulkhead rejection: the compartment is at capacity.
    #[error("compartment {compartment:?} at capacity ({max_concurrent} concurrent)")]
    CompartmentAtCapacity {
        compartment: String,
        max_concurrent: usize,
    },

    /// Deadline exceeded; the operation may have partially completed.
    #[error("operation timed out after {after:?}")]
    Timeout { after: Duration },

    /// The operation itself failed; passed through verbatim after counting.
    #[error("inner operation error: {0}")]
    Inner(E),
}

impl<E> ReliabilityError<E> {
    /// True when the call never reached the operation.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            ReliabilityError::Inner(_) | ReliabilityError::Timeout { .. }
        )
    }

    /// Returns the operation's own error, if this is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            ReliabilityError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> From<BulkheadError<CircuitBreakerError<E>>> for ReliabilityError<E> {
    fn from(err: BulkheadError<CircuitBreakerError<E>>) -> Self {
        match err {
            BulkheadError::CompartmentIsolated { compartment } => {
                ReliabilityError::CompartmentIsolated { compartment }
            }
            BulkheadError::CompartmentAtCapacity {
                compartment,
                max_concurrent,
            } => ReliabilityError::CompartmentAtCapacity {
                compartment,
                max_concurrent,
            },
            BulkheadError::Timeout { after, .. } => ReliabilityError::Timeout { after },
            BulkheadError::Inner(CircuitBreakerError::CircuitOpen) => ReliabilityError::CircuitOpen,
            BulkheadError::Inner(CircuitBreakerError::Inner(e)) => ReliabilityError::Inner(e),
        }
    }
}
