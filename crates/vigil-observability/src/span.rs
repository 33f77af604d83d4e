//! Trace spans with ambient parent tracking.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::SystemTime;
use vigil_core::CorrelationId;

/// Outcome recorded on a finished span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// One finished operation span.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TraceSpan {
    pub correlation_id: CorrelationId,
    pub operation: String,
    pub parent: Option<CorrelationId>,
    #[serde(skip)]
    pub started_at: SystemTime,
    #[serde(skip)]
    pub ended_at: SystemTime,
    pub status: SpanStatus,
    pub attributes: BTreeMap<String, String>,
    /// Names of the reliability components the operation crossed.
    pub components: Vec<String>,
}

/// Frame for an in-flight span on the task-local stack.
pub(crate) struct SpanFrame {
    pub correlation_id: CorrelationId,
    pub components: Vec<String>,
}

tokio::task_local! {
    pub(crate) static SPAN_STACK: RefCell<Vec<SpanFrame>>;
}

/// Correlation id of the innermost in-flight span, if any.
pub(crate) fn current_span_id() -> Option<CorrelationId> {
    SPAN_STACK
        .try_with(|stack| stack.borrow().last().map(|frame| frame.correlation_id))
        .ok()
        .flatten()
}

/// Records that the current operation crossed a reliability component.
pub(crate) fn note_component(name: &str) {
    let _ = SPAN_STACK.try_with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            if !frame.components.iter().any(|n| n == name) {
                frame.components.push(name.to_string());
            }
        }
    });
}

/// Runs `fut` inside a span-stack scope, reusing the ambient one if present.
pub(crate) async fn with_span_stack<F: std::future::Future>(fut: F) -> F::Output {
    if SPAN_STACK.try_with(|_| ()).is_ok() {
        fut.await
    } else {
        SPAN_STACK.scope(RefCell::new(Vec::new()), fut).await
    }
}
