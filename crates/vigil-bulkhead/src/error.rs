//! Error types for the bulkhead.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`Bulkhead::execute`](crate::Bulkhead::execute).
#[derive(Debug, Error)]
pub enum BulkheadError<E> {
    /// The compartment is isolated; the caller may retry another compartment
    /// or degrade.
    #[error("compartment {compartment:?} is isolated")]
    CompartmentIsolated { compartment: String },

    /// The compartment is at its concurrency cap.
    #[error("compartment {compartment:?} at capacity ({max_concurrent} concurrent)")]
    CompartmentAtCapacity {
        compartment: String,
        max_concurrent: usize,
    },

    /// The operation exceeded the compartment's deadline. The op may have
    /// partially completed.
    #[error("operation in compartment {compartment:?} timed out after {after:?}")]
    Timeout {
        compartment: String,
        after: Duration,
    },

    /// The operation itself failed; passed through verbatim after counting.
    #[error("inner operation error: {0}")]
    Inner(E),
}

impl<E> BulkheadError<E> {
    /// True when the bulkhead rejected the call without running the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BulkheadError::CompartmentIsolated { .. } | BulkheadError::CompartmentAtCapacity { .. }
        )
    }

    /// Returns the operation's own error, if this is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BulkheadError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
