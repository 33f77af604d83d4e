//! Configuration for the worker runtime.

use std::time::Duration;
use vigil_core::{protocol, CoreConfig};

/// Configuration for a [`Worker`](crate::Worker).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Cadence of heartbeat lines on the supervisor pipe.
    pub(crate) heartbeat_interval: Duration,
    /// How long in-flight operations may run after a graceful drain begins.
    pub(crate) drain_grace: Duration,
    /// Grace used for INT (fast) drains.
    pub(crate) fast_drain_grace: Duration,
    /// Orchestrator context connection dispatch runs under.
    pub(crate) context: String,
    /// Deployment generation, from the supervisor.
    pub(crate) generation: u64,
    /// Slot index within the fleet, from the supervisor.
    pub(crate) slot: u32,
    /// Connection-count threshold for the hybrid loop.
    pub(crate) connection_threshold: usize,
    pub(crate) high_performance_mode: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            drain_grace: Duration::from_secs(10),
            fast_drain_grace: Duration::from_secs(2),
            context: "router".to_string(),
            generation: 0,
            slot: 0,
            connection_threshold: 1024,
            high_performance_mode: false,
        }
    }
}

impl WorkerConfig {
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Derives the worker settings from the process configuration plus the
    /// identity handed down by the supervisor in the environment.
    pub fn from_core(config: &CoreConfig) -> Self {
        let generation = std::env::var(protocol::ENV_GENERATION)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let slot = std::env::var(protocol::ENV_SLOT)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        Self {
            heartbeat_interval: config.worker_heartbeat_interval,
            drain_grace: config.worker_drain_grace,
            fast_drain_grace: Duration::from_secs(2).min(config.worker_drain_grace),
            context: "router".to_string(),
            generation,
            slot,
            connection_threshold: config.connection_threshold,
            high_performance_mode: config.high_performance_mode,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// Builder for [`WorkerConfig`].
#[derive(Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Heartbeat cadence. Default: 1 s
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Graceful-drain grace deadline. Default: 10 s
    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.config.drain_grace = grace;
        self
    }

    /// Grace for INT (fast) drains. Default: 2 s
    pub fn fast_drain_grace(mut self, grace: Duration) -> Self {
        self.config.fast_drain_grace = grace;
        self
    }

    /// Orchestrator context for connection dispatch. Default: `router`
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.config.context = context.into();
        self
    }

    /// Deployment generation. Default: 0
    pub fn generation(mut self, generation: u64) -> Self {
        self.config.generation = generation;
        self
    }

    /// Fleet slot. Default: 0
    pub fn slot(mut self, slot: u32) -> Self {
        self.config.slot = slot;
        self
    }

    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
