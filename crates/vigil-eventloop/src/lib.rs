//! Hybrid event loop abstraction.
//!
//! Two interchangeable backends implement the same [`LoopBackend`] contract
//! (timers, FIFO defers, fd readiness watches, cancellation):
//!
//! - [`PollBackend`] ("primary"): a portable single-task scheduler driving a
//!   timer heap and scanning fd readiness with `poll(2)` on a coarse tick.
//! - [`TokioBackend`] ("accelerated"): rides the tokio timer wheel and
//!   edge-notified [`AsyncFd`](tokio::io::unix::AsyncFd) readiness, so an idle
//!   loop takes zero wakeups.
//!
//! [`HybridEventLoop`] holds both and routes every registration to exactly
//! one, switching on observed connection count (threshold 1024, hysteresis
//! 128) or a high-performance-mode hint.
//!
//! Callbacks execute on the single task driving [`LoopBackend::run`];
//! reentrancy is forbidden. Within a backend, defers run in FIFO order before
//! the next IO poll and timers fire in non-decreasing deadline order with
//! ties broken by registration order.

use futures::future::BoxFuture;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use error::EventLoopError;
pub use hybrid::{HybridConfig, HybridConfigBuilder, HybridEventLoop, HybridMetrics};
pub use poll_backend::PollBackend;
pub use tokio_backend::TokioBackend;

mod error;
mod hybrid;
mod poll_backend;
mod sched;
mod tokio_backend;

/// Callback invoked by the loop. Runs on the loop's single task.
pub type Callback = Box<dyn FnMut() + Send + 'static>;

/// Opaque registration id, unique per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which backend a registration or the hybrid loop is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Primary,
    Accelerated,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Primary => "primary",
            BackendKind::Accelerated => "accelerated",
        }
    }
}

/// Contract shared by both backends.
///
/// `cancel` is idempotent and safe on expired or already-fired ids.
pub trait LoopBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Schedules `cb` once after `after`.
    fn delay(&self, after: Duration, cb: Callback) -> TaskId;

    /// Schedules `cb` every `every` until cancelled.
    fn repeat(&self, every: Duration, cb: Callback) -> TaskId;

    /// Schedules `cb` to run before the next IO poll, FIFO.
    fn defer(&self, cb: Callback) -> TaskId;

    /// Watches `fd` for readability; `cb` fires on each readiness.
    fn on_readable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError>;

    /// Watches `fd` for writability; `cb` fires on each readiness.
    fn on_writable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError>;

    /// Cancels a registration. Returns false when the id was already gone.
    fn cancel(&self, id: TaskId) -> bool;

    /// Drives the loop until [`stop`](Self::stop).
    fn run(&self) -> BoxFuture<'_, Result<(), EventLoopError>>;

    /// Requests the loop to stop after the current iteration.
    fn stop(&self);
}

/// Which readiness a watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoInterest {
    Read,
    Write,
}
