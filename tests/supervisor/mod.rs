//! Supervisor tests.
//!
//! Test organization:
//! - lifecycle.rs: crash-loop abort and health escalation
//! - deploy.rs: zero-downtime deployment strategies

mod deploy;
mod lifecycle;

use std::time::{Duration, Instant};
use vigil_supervisor::{SupervisorHandle, WorkerCommand};

/// Worker stub speaking the heartbeat protocol and draining on TERM.
pub fn serving_worker() -> WorkerCommand {
    WorkerCommand::new("/bin/sh").arg("-c").arg(
        r#"trap "exit 0" TERM; echo ready; while true; do echo heartbeat; sleep 0.1; done"#,
    )
}

/// Polls until `pred` holds on the stats, panicking past the deadline.
pub async fn wait_for(handle: &SupervisorHandle, deadline: Duration, pred: impl Fn(&vigil_supervisor::SupervisorStats) -> bool, what: &str) {
    let until = Instant::now() + deadline;
    loop {
        if pred(&handle.stats()) {
            return;
        }
        assert!(Instant::now() < until, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
