use crate::events::CircuitBreakerEvent;
use std::time::Duration;
use vigil_core::{EventListeners, FnListener};

/// Configuration for one circuit.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit open.
    pub(crate) failure_threshold: u32,
    /// Consecutive successes that close a half-open circuit.
    pub(crate) success_threshold: u32,
    /// Time an open circuit waits before permitting a probe call.
    pub(crate) recovery_delay: Duration,
    pub(crate) name: String,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_delay: Duration::from_millis(10),
            name: "test".to_string(),
            event_listeners: EventListeners::new(),
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_delay: Duration,
    name: String,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_delay: Duration::from_millis(10),
            name: "<unnamed>".to_string(),
            event_listeners: EventListeners::new(),
        }
    }

    /// Consecutive failures before the circuit opens.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Consecutive successes before a half-open circuit closes.
    ///
    /// Default: 3
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Time an open circuit waits before routing a probe call to half-open.
    ///
    /// Default: 10 ms. Aggressively short for most downstream services; raise
    /// it per deployment when the protected dependency needs longer to settle.
    pub fn recovery_delay(mut self, delay: Duration) -> Self {
        self.recovery_delay = delay;
        self
    }

    /// Human-readable scope name used in events, logs and metrics labels.
    ///
    /// Default: `<unnamed>`
    pub fn name<N: Into<String>>(mut self, n: N) -> Self {
        self.name = n.into();
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(crate::CircuitState, crate::CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Adds a raw event listener receiving every circuit event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: vigil_core::EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Builds the circuit breaker.
    pub fn build(self) -> crate::CircuitBreaker {
        crate::CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_delay: self.recovery_delay,
            name: self.name,
            event_listeners: self.event_listeners,
        })
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
