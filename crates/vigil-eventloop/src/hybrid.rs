//! Hybrid loop: owns both backends and routes registrations by load.

use crate::{
    BackendKind, Callback, EventLoopError, LoopBackend, PollBackend, TaskId, TokioBackend,
};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_core::CoreConfig;

/// Selection policy for the hybrid loop.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Connection count at which registrations route to the accelerated
    /// backend.
    pub(crate) threshold: usize,
    /// The loop only falls back to primary below `threshold - hysteresis`.
    pub(crate) hysteresis: usize,
    /// Re-route dynamically on every threshold crossing. When off, the
    /// backend is fixed at construction.
    pub(crate) auto_switch: bool,
    /// Pin the accelerated backend regardless of load.
    pub(crate) high_performance_mode: bool,
}

/// Metrics snapshot surfaced by [`HybridEventLoop::metrics`].
#[derive(Debug, Clone)]
pub struct HybridMetrics {
    pub connection_count: usize,
    pub backend_in_use: BackendKind,
    pub switches: u64,
    pub memory_usage: u64,
}

struct HybridState {
    connections: usize,
    active: BackendKind,
    switches: u64,
    owners: HashMap<TaskId, BackendKind>,
}

/// Holds both backends; every registration goes to exactly one of them.
pub struct HybridEventLoop {
    primary: Arc<PollBackend>,
    accelerated: Option<Arc<TokioBackend>>,
    config: HybridConfig,
    state: Mutex<HybridState>,
}

impl std::fmt::Debug for HybridEventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridEventLoop").finish_non_exhaustive()
    }
}

impl HybridEventLoop {
    /// Returns a builder with the default policy.
    pub fn builder() -> HybridConfigBuilder {
        HybridConfigBuilder::new()
    }

    fn backend(&self, kind: BackendKind) -> &dyn LoopBackend {
        match kind {
            BackendKind::Primary => self.primary.as_ref(),
            BackendKind::Accelerated => self
                .accelerated
                .as_deref()
                .map(|b| b as &dyn LoopBackend)
                .unwrap_or(self.primary.as_ref()),
        }
    }

    fn route(&self) -> (BackendKind, &dyn LoopBackend) {
        let kind = self.state.lock().expect("hybrid state poisoned").active;
        (kind, self.backend(kind))
    }

    fn record_owner(&self, id: TaskId, kind: BackendKind) -> TaskId {
        self.state
            .lock()
            .expect("hybrid state poisoned")
            .owners
            .insert(id, kind);
        id
    }

    pub fn delay(&self, after: Duration, cb: Callback) -> TaskId {
        let (kind, backend) = self.route();
        self.record_owner(backend.delay(after, cb), kind)
    }

    pub fn repeat(&self, every: Duration, cb: Callback) -> TaskId {
        let (kind, backend) = self.route();
        self.record_owner(backend.repeat(every, cb), kind)
    }

    pub fn defer(&self, cb: Callback) -> TaskId {
        let (kind, backend) = self.route();
        self.record_owner(backend.defer(cb), kind)
    }

    pub fn on_readable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError> {
        let (kind, backend) = self.route();
        Ok(self.record_owner(backend.on_readable(fd, cb)?, kind))
    }

    pub fn on_writable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError> {
        let (kind, backend) = self.route();
        Ok(self.record_owner(backend.on_writable(fd, cb)?, kind))
    }

    /// Cancels a registration on whichever backend owns it. Idempotent.
    pub fn cancel(&self, id: TaskId) -> bool {
        let owner = self
            .state
            .lock()
            .expect("hybrid state poisoned")
            .owners
            .remove(&id);
        match owner {
            Some(kind) => self.backend(kind).cancel(id),
            None => false,
        }
    }

    /// Records `n` newly accepted connections.
    pub fn add_connections(&self, n: usize) {
        let mut state = self.state.lock().expect("hybrid state poisoned");
        state.connections = state.connections.saturating_add(n);
        self.reselect(&mut state);
    }

    /// Records `n` closed connections.
    pub fn remove_connections(&self, n: usize) {
        let mut state = self.state.lock().expect("hybrid state poisoned");
        state.connections = state.connections.saturating_sub(n);
        self.reselect(&mut state);
    }

    fn reselect(&self, state: &mut HybridState) {
        if !self.config.auto_switch || self.accelerated.is_none() {
            return;
        }

        let want_accelerated =
            self.config.high_performance_mode || state.connections >= self.config.threshold;
        let release_accelerated = !self.config.high_performance_mode
            && state.connections < self.config.threshold.saturating_sub(self.config.hysteresis);

        let target = match state.active {
            BackendKind::Primary if want_accelerated => BackendKind::Accelerated,
            BackendKind::Accelerated if release_accelerated => BackendKind::Primary,
            current => current,
        };

        if target != state.active {
            #[cfg(feature = "tracing")]
            tracing::info!(
                from = state.active.as_str(),
                to = target.as_str(),
                connections = state.connections,
                "event loop backend switch"
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("eventloop_backend_switches_total").increment(1);

            state.active = target;
            state.switches += 1;
        }
    }

    /// Current counters and backend selection.
    pub fn metrics(&self) -> HybridMetrics {
        let state = self.state.lock().expect("hybrid state poisoned");
        #[cfg(feature = "metrics")]
        metrics::gauge!("eventloop_connections").set(state.connections as f64);
        HybridMetrics {
            connection_count: state.connections,
            backend_in_use: state.active,
            switches: state.switches,
            memory_usage: vigil_core::memory::resident_bytes(),
        }
    }

    /// Drives both backends until [`stop`](Self::stop).
    pub async fn run(&self) -> Result<(), EventLoopError> {
        match &self.accelerated {
            Some(accelerated) => {
                let (primary, accelerated) = tokio::join!(self.primary.run(), accelerated.run());
                primary?;
                accelerated
            }
            None => self.primary.run().await,
        }
    }

    /// Stops both backends.
    pub fn stop(&self) {
        self.primary.stop();
        if let Some(accelerated) = &self.accelerated {
            accelerated.stop();
        }
    }
}

/// Builder for [`HybridEventLoop`].
pub struct HybridConfigBuilder {
    threshold: usize,
    hysteresis: usize,
    auto_switch: bool,
    high_performance_mode: bool,
    accelerated_enabled: bool,
}

impl HybridConfigBuilder {
    pub fn new() -> Self {
        Self {
            threshold: 1024,
            hysteresis: 128,
            auto_switch: true,
            high_performance_mode: false,
            accelerated_enabled: true,
        }
    }

    /// Seeds the policy from the process configuration.
    pub fn from_core(config: &CoreConfig) -> Self {
        Self::new()
            .threshold(config.connection_threshold)
            .high_performance_mode(config.high_performance_mode)
    }

    /// Connection count that routes to the accelerated backend. Default: 1024
    pub fn threshold(mut self, n: usize) -> Self {
        self.threshold = n;
        self
    }

    /// Switch-back hysteresis. Default: 128
    pub fn hysteresis(mut self, n: usize) -> Self {
        self.hysteresis = n;
        self
    }

    /// Dynamic re-routing on threshold crossings. Default: true
    pub fn auto_switch(mut self, on: bool) -> Self {
        self.auto_switch = on;
        self
    }

    /// Pin the accelerated backend regardless of load. Default: false
    pub fn high_performance_mode(mut self, on: bool) -> Self {
        self.high_performance_mode = on;
        self
    }

    /// Drops the accelerated backend entirely (primary-only deployments).
    pub fn without_accelerated(mut self) -> Self {
        self.accelerated_enabled = false;
        self
    }

    pub fn build(self) -> Result<HybridEventLoop, EventLoopError> {
        if self.high_performance_mode && !self.accelerated_enabled {
            return Err(EventLoopError::BackendUnavailable {
                backend: "accelerated",
                reason: "high performance mode requires the accelerated backend".to_string(),
            });
        }

        let accelerated = self.accelerated_enabled.then(|| Arc::new(TokioBackend::new()));
        let active = if self.high_performance_mode && accelerated.is_some() {
            BackendKind::Accelerated
        } else {
            BackendKind::Primary
        };

        Ok(HybridEventLoop {
            primary: Arc::new(PollBackend::new()),
            accelerated,
            config: HybridConfig {
                threshold: self.threshold,
                hysteresis: self.hysteresis,
                auto_switch: self.auto_switch,
                high_performance_mode: self.high_performance_mode,
            },
            state: Mutex::new(HybridState {
                connections: 0,
                active,
                switches: 0,
                owners: HashMap::new(),
            }),
        })
    }
}

impl Default for HybridConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
