//! Process-unique correlation ids with ambient propagation.
//!
//! A [`CorrelationId`] is attached to every span, metric and health probe
//! emitted during one logical operation. Within a task the active id is
//! carried in a tokio task-local so components can pick it up without
//! threading it through every call signature.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

/// Identifier correlating spans, metrics and health probes of one operation.
///
/// Unique within the process; the textual form includes the pid so ids from
/// different workers never collide in an aggregated sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:016x}", std::process::id(), self.0)
    }
}

tokio::task_local! {
    static CURRENT: CorrelationId;
}

/// Runs `fut` with `id` as the ambient correlation id.
pub async fn with_correlation<F>(id: CorrelationId, fut: F) -> F::Output
where
    F: std::future::Future,
{
    CURRENT.scope(id, fut).await
}

/// Returns the ambient correlation id, if one is in scope.
pub fn current_correlation() -> Option<CorrelationId> {
    CURRENT.try_with(|id| *id).ok()
}
