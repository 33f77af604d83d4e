//! Worker records owned by the supervisor.

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

/// Worker state as seen from the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerProcState {
    /// Spawned, not yet reported ready.
    Starting,
    /// Serving traffic and heartbeating.
    Ready,
    /// Told to drain; exit is expected.
    Draining,
    /// Reaped. Terminal; the slot is refilled with a fresh record.
    Dead,
}

impl WorkerProcState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerProcState::Starting => "starting",
            WorkerProcState::Ready => "ready",
            WorkerProcState::Draining => "draining",
            WorkerProcState::Dead => "dead",
        }
    }
}

/// One record per child process.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub slot: u32,
    pub pid: u32,
    pub spawned_at: Instant,
    pub state: WorkerProcState,
    pub last_heartbeat: Instant,
    pub generation: u64,
    pub listen_fds: Vec<RawFd>,
    pub restarts: u32,
}

/// Per-worker line in [`SupervisorStats`].
#[derive(Debug, Clone)]
pub struct WorkerStat {
    pub pid: u32,
    pub state: WorkerProcState,
    pub generation: u64,
    pub uptime: Duration,
    pub restarts: u32,
}

/// Observable fleet statistics.
#[derive(Debug, Clone)]
pub struct SupervisorStats {
    /// Configured fleet size.
    pub worker_count: usize,
    /// Workers currently alive (not dead).
    pub running: usize,
    pub workers: Vec<WorkerStat>,
    pub memory_usage: u64,
    pub deployment_strategy: &'static str,
    pub zero_downtime_enabled: bool,
}

impl SupervisorStats {
    /// Workers currently in the ready state.
    pub fn ready_count(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state == WorkerProcState::Ready)
            .count()
    }
}
