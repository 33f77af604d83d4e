//! Configuration for the orchestrator and the self-healing coordinator.

use crate::events::ReliabilityEvent;
use std::sync::Arc;
use std::time::Duration;
use vigil_bulkhead::Bulkhead;
use vigil_core::{EventListeners, FnListener};

/// Back-off policy for the self-healing coordinator.
#[derive(Debug, Clone)]
pub struct SelfHealingConfig {
    /// First attempt runs after this delay.
    pub(crate) initial_backoff: Duration,
    /// Back-off doubles up to this cap.
    pub(crate) max_backoff: Duration,
    /// Attempts before the context is escalated to permanently degraded.
    pub(crate) max_attempts: u32,
}

impl Default for SelfHealingConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            max_attempts: 10,
        }
    }
}

/// Configuration for a [`ReliabilityOrchestrator`](crate::ReliabilityOrchestrator).
#[derive(Clone)]
pub struct ReliabilityConfig {
    /// Gate: a context with more cumulative failures than this is unhealthy.
    pub(crate) unhealthy_failure_limit: u64,
    /// A context with more failures than this is isolated outright.
    pub(crate) isolate_failure_limit: u64,
    /// Gate: a failure younger than this makes the context unhealthy.
    pub(crate) recent_failure_window: Duration,
    /// Estimated downtime charged per failure by the uptime gauge.
    pub(crate) failure_weight: Duration,
    /// Per-context circuit thresholds.
    pub(crate) circuit_failure_threshold: u32,
    pub(crate) circuit_success_threshold: u32,
    pub(crate) circuit_recovery_delay: Duration,
    pub(crate) healing: SelfHealingConfig,
    pub(crate) event_listeners: EventListeners<ReliabilityEvent>,
}

impl ReliabilityConfig {
    pub fn builder() -> ReliabilityConfigBuilder {
        ReliabilityConfigBuilder::new()
    }
}

/// Builder for [`ReliabilityOrchestrator`](crate::ReliabilityOrchestrator).
pub struct ReliabilityConfigBuilder {
    bulkhead: Option<Arc<Bulkhead>>,
    unhealthy_failure_limit: u64,
    isolate_failure_limit: u64,
    recent_failure_window: Duration,
    failure_weight: Duration,
    circuit_failure_threshold: u32,
    circuit_success_threshold: u32,
    circuit_recovery_delay: Duration,
    healing: SelfHealingConfig,
    event_listeners: EventListeners<ReliabilityEvent>,
}

impl ReliabilityConfigBuilder {
    pub fn new() -> Self {
        Self {
            bulkhead: None,
            unhealthy_failure_limit: 10,
            isolate_failure_limit: 5,
            recent_failure_window: Duration::from_secs(1),
            failure_weight: Duration::from_millis(10),
            circuit_failure_threshold: 5,
            circuit_success_threshold: 3,
            circuit_recovery_delay: Duration::from_millis(10),
            healing: SelfHealingConfig::default(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Shares an existing bulkhead instead of building a private one.
    pub fn bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self
    }

    /// Cumulative failures past which the health gate rejects. Default: 10
    pub fn unhealthy_failure_limit(mut self, n: u64) -> Self {
        self.unhealthy_failure_limit = n;
        self
    }

    /// Failures past which the context is isolated outright. Default: 5
    pub fn isolate_failure_limit(mut self, n: u64) -> Self {
        self.isolate_failure_limit = n;
        self
    }

    /// Window during which a failure keeps the gate closed. Default: 1 s
    pub fn recent_failure_window(mut self, window: Duration) -> Self {
        self.recent_failure_window = window;
        self
    }

    /// Recovery delay for each context's circuit. Default: 10 ms
    pub fn circuit_recovery_delay(mut self, delay: Duration) -> Self {
        self.circuit_recovery_delay = delay;
        self
    }

    /// Consecutive failures before a context's circuit opens. Default: 5
    pub fn circuit_failure_threshold(mut self, n: u32) -> Self {
        self.circuit_failure_threshold = n;
        self
    }

    /// First self-healing attempt delay. Default: 100 ms
    pub fn healing_initial_backoff(mut self, backoff: Duration) -> Self {
        self.healing.initial_backoff = backoff;
        self
    }

    /// Self-healing back-off cap. Default: 10 s
    pub fn healing_max_backoff(mut self, cap: Duration) -> Self {
        self.healing.max_backoff = cap;
        self
    }

    /// Self-healing attempts before escalation. Default: 10
    pub fn healing_max_attempts(mut self, n: u32) -> Self {
        self.healing.max_attempts = n;
        self
    }

    /// Registers a callback for context isolation.
    pub fn on_context_isolated<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ReliabilityEvent| {
                if let ReliabilityEvent::ContextIsolated {
                    context, failures, ..
                } = event
                {
                    f(context, *failures);
                }
            }));
        self
    }

    /// Registers a callback for successful recovery.
    pub fn on_recovery<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, u32) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &ReliabilityEvent| {
                if let ReliabilityEvent::RecoverySucceeded {
                    context, attempts, ..
                } = event
                {
                    f(context, *attempts);
                }
            }));
        self
    }

    /// Adds a raw event listener receiving every reliability event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: vigil_core::EventListener<ReliabilityEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> crate::ReliabilityOrchestrator {
        let bulkhead = self
            .bulkhead
            .unwrap_or_else(|| Arc::new(Bulkhead::builder().build()));

        crate::ReliabilityOrchestrator::new(
            ReliabilityConfig {
                unhealthy_failure_limit: self.unhealthy_failure_limit,
                isolate_failure_limit: self.isolate_failure_limit,
                recent_failure_window: self.recent_failure_window,
                failure_weight: self.failure_weight,
                circuit_failure_threshold: self.circuit_failure_threshold,
                circuit_success_threshold: self.circuit_success_threshold,
                circuit_recovery_delay: self.circuit_recovery_delay,
                healing: self.healing,
                event_listeners: self.event_listeners,
            },
            bulkhead,
        )
    }
}

impl Default for ReliabilityConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
