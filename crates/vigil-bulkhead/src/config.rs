//! Configuration for the bulkhead.

use crate::events::BulkheadEvent;
use std::collections::HashMap;
use std::time::Duration;
use vigil_core::{EventListeners, FnListener};

/// Limits applied to a single compartment.
#[derive(Debug, Clone, Copy)]
pub struct CompartmentLimits {
    pub max_concurrent: usize,
    pub op_timeout: Option<Duration>,
}

impl Default for CompartmentLimits {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            op_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Configuration for a [`Bulkhead`](crate::Bulkhead) registry.
#[derive(Clone)]
pub struct BulkheadConfig {
    pub(crate) defaults: CompartmentLimits,
    pub(crate) overrides: HashMap<String, CompartmentLimits>,
    /// Failure rate (percent) past which a compartment auto-isolates.
    pub(crate) isolation_threshold: f64,
    /// Failure rate (percent) past which a compartment reports unhealthy.
    pub(crate) unhealthy_rate: f64,
    /// A compartment is unhealthy while a failure is younger than this.
    pub(crate) failure_cooldown: Duration,
    pub(crate) event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfig {
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    pub(crate) fn limits_for(&self, name: &str) -> CompartmentLimits {
        self.overrides.get(name).copied().unwrap_or(self.defaults)
    }
}

/// Builder for [`BulkheadConfig`].
pub struct BulkheadConfigBuilder {
    defaults: CompartmentLimits,
    overrides: HashMap<String, CompartmentLimits>,
    isolation_threshold: f64,
    unhealthy_rate: f64,
    failure_cooldown: Duration,
    event_listeners: EventListeners<BulkheadEvent>,
}

impl BulkheadConfigBuilder {
    pub fn new() -> Self {
        Self {
            defaults: CompartmentLimits::default(),
            overrides: HashMap::new(),
            isolation_threshold: 50.0,
            unhealthy_rate: 25.0,
            failure_cooldown: Duration::from_secs(5),
            event_listeners: EventListeners::new(),
        }
    }

    /// Concurrency cap applied to compartments without an override.
    ///
    /// Default: 100
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.defaults.max_concurrent = max;
        self
    }

    /// Deadline applied to each operation. `None` disables the deadline.
    ///
    /// Default: 30 s
    pub fn op_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.defaults.op_timeout = timeout;
        self
    }

    /// Overrides limits for one named compartment.
    pub fn compartment(mut self, name: impl Into<String>, limits: CompartmentLimits) -> Self {
        self.overrides.insert(name.into(), limits);
        self
    }

    /// Failure rate (percent) past which a compartment auto-isolates.
    ///
    /// Default: 50.0
    pub fn isolation_threshold(mut self, percent: f64) -> Self {
        self.isolation_threshold = percent;
        self
    }

    /// Failure rate (percent) past which a compartment reports unhealthy.
    ///
    /// Default: 25.0
    pub fn unhealthy_rate(mut self, percent: f64) -> Self {
        self.unhealthy_rate = percent;
        self
    }

    /// How long after a failure a compartment keeps reporting unhealthy.
    ///
    /// Default: 5 s
    pub fn failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    /// Registers a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::RejectReason) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BulkheadEvent| {
                if let BulkheadEvent::CallRejected { reason, .. } = event {
                    f(*reason);
                }
            }));
        self
    }

    /// Registers a callback for compartment isolation.
    pub fn on_isolated<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, f64) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &BulkheadEvent| {
                if let BulkheadEvent::CompartmentIsolated {
                    compartment,
                    failure_rate,
                    ..
                } = event
                {
                    f(compartment, *failure_rate);
                }
            }));
        self
    }

    /// Adds a raw event listener receiving every bulkhead event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: vigil_core::EventListener<BulkheadEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> crate::Bulkhead {
        crate::Bulkhead::new(BulkheadConfig {
            defaults: self.defaults,
            overrides: self.overrides,
            isolation_threshold: self.isolation_threshold,
            unhealthy_rate: self.unhealthy_rate,
            failure_cooldown: self.failure_cooldown,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
