//! Error and outcome types for the supervisor.

use thiserror::Error;
use vigil_core::ConfigError;

/// Errors surfaced while building or running the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker in slot {slot}: {source}")]
    SpawnFailed {
        slot: u32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Terminal outcome of a supervisor run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Clean shutdown: every worker drained in time.
    Clean,
    /// The fleet crash-looped and was aborted.
    CrashLoopAbort,
    /// Workers outlived the grace deadline and were force-killed.
    GraceExceeded,
}

impl SupervisorOutcome {
    /// Process exit code for this outcome. Startup failures (an `Err` from
    /// [`Supervisor::run`](crate::Supervisor::run)) map to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::Clean => 0,
            SupervisorOutcome::CrashLoopAbort => 2,
            SupervisorOutcome::GraceExceeded => 124,
        }
    }
}
