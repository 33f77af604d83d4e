use thiserror::Error;

/// Errors surfaced by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
#[derive(Debug, Error)]
pub enum CircuitBreakerError<E> {
    /// Fast-fail: the circuit is open and the operation was not invoked.
    /// Retryable once the recovery delay has elapsed.
    #[error("circuit is open; call not permitted")]
    CircuitOpen,

    /// The operation itself failed; passed through verbatim after counting.
    #[error("inner operation error: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected without invoking the operation.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen)
    }

    /// Returns the operation's own error, if this is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitBreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}
