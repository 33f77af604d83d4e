//! Worker ⇄ supervisor protocol: environment handles and heartbeat lines.
//!
//! The supervisor passes pre-bound listening sockets as raw fd numbers in
//! [`ENV_LISTEN_FDS`] and identifies the worker instance via
//! [`ENV_GENERATION`] / [`ENV_SLOT`]. The worker reports its lifecycle over
//! its stdout pipe as newline-delimited lines.

use std::str::FromStr;

/// Comma-separated raw fd numbers of inherited listening sockets.
pub const ENV_LISTEN_FDS: &str = "WORKER_LISTEN_FDS";
/// Deployment generation the worker belongs to.
pub const ENV_GENERATION: &str = "WORKER_GENERATION";
/// Slot index within the fleet.
pub const ENV_SLOT: &str = "WORKER_SLOT";

/// One status line written by a worker on its stdout pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLine {
    /// The worker finished startup and accepts connections.
    Ready,
    /// Periodic liveness signal.
    Heartbeat,
    /// The worker stopped accepting and is finishing in-flight work.
    Draining,
}

impl WorkerLine {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerLine::Ready => "ready",
            WorkerLine::Heartbeat => "heartbeat",
            WorkerLine::Draining => "draining",
        }
    }
}

impl FromStr for WorkerLine {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ready" => Ok(WorkerLine::Ready),
            "heartbeat" => Ok(WorkerLine::Heartbeat),
            "draining" => Ok(WorkerLine::Draining),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip() {
        for line in [WorkerLine::Ready, WorkerLine::Heartbeat, WorkerLine::Draining] {
            assert_eq!(line.as_str().parse::<WorkerLine>().unwrap(), line);
        }
        assert!("resdy".parse::<WorkerLine>().is_err());
    }
}
