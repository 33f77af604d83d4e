//! Configuration for the supervisor.

use crate::events::SupervisorEvent;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use vigil_core::{CoreConfig, DeploymentStrategy, EventListeners, FnListener};

/// Command used to start a worker child.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl WorkerCommand {
    /// Re-executes the current binary; the usual production setup, where the
    /// binary checks its environment and enters the worker role.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: Vec::new(),
            envs: Vec::new(),
        })
    }

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

/// Configuration for a [`Supervisor`](crate::Supervisor).
#[derive(Clone)]
pub struct SupervisorConfig {
    pub(crate) worker_count: usize,
    pub(crate) strategy: DeploymentStrategy,
    pub(crate) restart_backoff: Duration,
    pub(crate) restart_backoff_cap: Duration,
    pub(crate) crash_loop_limit: u32,
    pub(crate) crash_loop_window: Duration,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) liveness_factor: u32,
    pub(crate) shutdown_grace: Duration,
    pub(crate) fast_shutdown_grace: Duration,
    pub(crate) ready_timeout: Duration,
    pub(crate) worker_command: WorkerCommand,
    pub(crate) bind_addrs: Vec<SocketAddr>,
    pub(crate) event_listeners: EventListeners<SupervisorEvent>,
}

impl SupervisorConfig {
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::new()
    }
}

/// Builder for [`Supervisor`](crate::Supervisor).
pub struct SupervisorConfigBuilder {
    worker_count: usize,
    strategy: DeploymentStrategy,
    restart_backoff: Duration,
    restart_backoff_cap: Duration,
    crash_loop_limit: u32,
    crash_loop_window: Duration,
    heartbeat_interval: Duration,
    liveness_factor: u32,
    shutdown_grace: Duration,
    fast_shutdown_grace: Duration,
    ready_timeout: Duration,
    worker_command: Option<WorkerCommand>,
    bind_addrs: Vec<SocketAddr>,
    event_listeners: EventListeners<SupervisorEvent>,
}

impl SupervisorConfigBuilder {
    pub fn new() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            strategy: DeploymentStrategy::Rolling,
            restart_backoff: Duration::from_millis(100),
            restart_backoff_cap: Duration::from_secs(10),
            crash_loop_limit: 5,
            crash_loop_window: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(1),
            liveness_factor: 3,
            shutdown_grace: Duration::from_secs(10),
            fast_shutdown_grace: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(10),
            worker_command: None,
            bind_addrs: Vec::new(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Seeds the fleet settings from the process configuration.
    pub fn from_core(config: &CoreConfig) -> Self {
        let mut builder = Self::new();
        builder.worker_count = config.worker_count;
        builder.strategy = config.deployment_strategy;
        builder.restart_backoff = config.worker_restart_backoff;
        builder.heartbeat_interval = config.worker_heartbeat_interval;
        builder.shutdown_grace = config.worker_drain_grace;
        builder
    }

    /// Fleet size. Default: CPU count
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n.max(1);
        self
    }

    /// Zero-downtime deployment strategy. Default: rolling
    pub fn strategy(mut self, strategy: DeploymentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// First restart back-off; doubles per restart of a slot. Default: 100 ms
    pub fn restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff = backoff;
        self
    }

    /// Restart back-off cap. Default: 10 s
    pub fn restart_backoff_cap(mut self, cap: Duration) -> Self {
        self.restart_backoff_cap = cap;
        self
    }

    /// Restarts within the window that abort the fleet. Default: 5
    pub fn crash_loop_limit(mut self, n: u32) -> Self {
        self.crash_loop_limit = n;
        self
    }

    /// Crash-loop detection window. Default: 60 s
    pub fn crash_loop_window(mut self, window: Duration) -> Self {
        self.crash_loop_window = window;
        self
    }

    /// Expected worker heartbeat cadence. A worker silent for
    /// `liveness_factor ×` this is replaced. Default: 1 s
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Grace for TERM-initiated shutdown. Default: 10 s
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Deadline for a freshly spawned worker to report ready during deploys.
    /// Default: 10 s
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Command the supervisor spawns per worker. Default: the current
    /// executable.
    pub fn worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    /// Address to pre-bind and share with every worker. Repeatable.
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addrs.push(addr);
        self
    }

    /// Registers a callback for worker restarts.
    pub fn on_worker_restarted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &SupervisorEvent| {
                if let SupervisorEvent::WorkerRestarted { slot, restarts, .. } = event {
                    f(*slot, *restarts);
                }
            }));
        self
    }

    /// Registers a callback for crash-loop aborts.
    pub fn on_crash_loop<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &SupervisorEvent| {
                if let SupervisorEvent::CrashLoop {
                    restarts_in_window, ..
                } = event
                {
                    f(*restarts_in_window);
                }
            }));
        self
    }

    /// Adds a raw event listener receiving every supervisor event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: vigil_core::EventListener<SupervisorEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> std::io::Result<crate::Supervisor> {
        let worker_command = match self.worker_command {
            Some(command) => command,
            None => WorkerCommand::current_exe()?,
        };

        crate::Supervisor::new(SupervisorConfig {
            worker_count: self.worker_count,
            strategy: self.strategy,
            restart_backoff: self.restart_backoff,
            restart_backoff_cap: self.restart_backoff_cap,
            crash_loop_limit: self.crash_loop_limit,
            crash_loop_window: self.crash_loop_window,
            heartbeat_interval: self.heartbeat_interval,
            liveness_factor: self.liveness_factor,
            shutdown_grace: self.shutdown_grace,
            fast_shutdown_grace: self.fast_shutdown_grace,
            ready_timeout: self.ready_timeout,
            worker_command,
            bind_addrs: self.bind_addrs,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for SupervisorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
