//! Error types for the event loop.

use thiserror::Error;

/// Errors surfaced by the event loop backends.
#[derive(Debug, Error)]
pub enum EventLoopError {
    /// The requested backend is missing or failed to start.
    #[error("event loop backend {backend:?} unavailable: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// An fd registration failed.
    #[error("io registration failed: {0}")]
    Io(#[from] std::io::Error),
}
