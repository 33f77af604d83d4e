//! Events emitted by the supervisor.

use std::time::Instant;
use vigil_core::{CoreEvent, DeploymentStrategy};

/// Fleet lifecycle events observable via
/// [`EventListeners`](vigil_core::EventListeners).
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    WorkerSpawned {
        timestamp: Instant,
        slot: u32,
        pid: u32,
        generation: u64,
    },
    WorkerReady {
        timestamp: Instant,
        slot: u32,
        pid: u32,
    },
    WorkerExited {
        timestamp: Instant,
        slot: u32,
        pid: u32,
        code: Option<i32>,
    },
    WorkerRestarted {
        timestamp: Instant,
        slot: u32,
        restarts: u32,
    },
    HeartbeatLost {
        timestamp: Instant,
        slot: u32,
        pid: u32,
    },
    CrashLoop {
        timestamp: Instant,
        restarts_in_window: u32,
    },
    DeploymentStarted {
        timestamp: Instant,
        strategy: DeploymentStrategy,
        generation: u64,
    },
    DeploymentFinished {
        timestamp: Instant,
        generation: u64,
    },
    FleetStopped {
        timestamp: Instant,
    },
}

impl CoreEvent for SupervisorEvent {
    fn event_kind(&self) -> &'static str {
        match self {
            SupervisorEvent::WorkerSpawned { .. } => "worker_spawned",
            SupervisorEvent::WorkerReady { .. } => "worker_ready",
            SupervisorEvent::WorkerExited { .. } => "worker_exited",
            SupervisorEvent::WorkerRestarted { .. } => "worker_restarted",
            SupervisorEvent::HeartbeatLost { .. } => "heartbeat_lost",
            SupervisorEvent::CrashLoop { .. } => "crash_loop",
            SupervisorEvent::DeploymentStarted { .. } => "deployment_started",
            SupervisorEvent::DeploymentFinished { .. } => "deployment_finished",
            SupervisorEvent::FleetStopped { .. } => "fleet_stopped",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SupervisorEvent::WorkerSpawned { timestamp, .. }
            | SupervisorEvent::WorkerReady { timestamp, .. }
            | SupervisorEvent::WorkerExited { timestamp, .. }
            | SupervisorEvent::WorkerRestarted { timestamp, .. }
            | SupervisorEvent::HeartbeatLost { timestamp, .. }
            | SupervisorEvent::CrashLoop { timestamp, .. }
            | SupervisorEvent::DeploymentStarted { timestamp, .. }
            | SupervisorEvent::DeploymentFinished { timestamp, .. }
            | SupervisorEvent::FleetStopped { timestamp } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        "supervisor"
    }
}
