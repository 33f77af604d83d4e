use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Calls are permitted; consecutive failures are tracked.
    Closed = 0,
    /// Calls are rejected until the recovery delay elapses.
    Open = 1,
    /// Probe calls are permitted; any failure reopens the circuit.
    HalfOpen = 2,
}

impl CircuitState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time snapshot of the circuit's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub calls: u64,
    pub failures: u64,
    pub successes: u64,
    pub state_changes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// failures / calls, 0.0 when no calls were made yet.
    pub failure_rate: f64,
}

pub(crate) struct Circuit {
    state: CircuitState,
    state_atomic: Arc<AtomicU8>,
    last_failure: Option<Instant>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    calls: u64,
    failures: u64,
    successes: u64,
    state_changes: u64,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: CircuitState::Closed,
            state_atomic,
            last_failure: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
            calls: 0,
            failures: 0,
            successes: 0,
            state_changes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn stats(&self) -> CircuitStats {
        CircuitStats {
            state: self.state,
            calls: self.calls,
            failures: self.failures,
            successes: self.successes,
            state_changes: self.state_changes,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            failure_rate: if self.calls > 0 {
                self.failures as f64 / self.calls as f64
            } else {
                0.0
            },
        }
    }

    /// Decides whether a call may proceed.
    ///
    /// A rejection counts against the failure counter even though the
    /// operation is never invoked.
    pub fn try_acquire(&mut self, config: &CircuitBreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                self.calls += 1;
                config
                    .event_listeners
                    .emit(&CircuitBreakerEvent::CallPermitted {
                        circuit: config.name.clone(),
                        timestamp: Instant::now(),
                        state: self.state,
                    });
                true
            }
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|at| at.elapsed() >= config.recovery_delay)
                    .unwrap_or(true);
                if elapsed {
                    self.transition_to(CircuitState::HalfOpen, config);
                    self.calls += 1;
                    config
                        .event_listeners
                        .emit(&CircuitBreakerEvent::CallPermitted {
                            circuit: config.name.clone(),
                            timestamp: Instant::now(),
                            state: self.state,
                        });
                    true
                } else {
                    self.calls += 1;
                    self.failures += 1;
                    config
                        .event_listeners
                        .emit(&CircuitBreakerEvent::CallRejected {
                            circuit: config.name.clone(),
                            timestamp: Instant::now(),
                        });
                    #[cfg(feature = "metrics")]
                    counter!("circuitbreaker_calls_total", "circuit" => config.name.clone(), "outcome" => "rejected")
                        .increment(1);
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self, config: &CircuitBreakerConfig) {
        self.successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::SuccessRecorded {
                circuit: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuit" => config.name.clone(), "outcome" => "success")
            .increment(1);

        if self.state == CircuitState::HalfOpen
            && self.consecutive_successes >= config.success_threshold
        {
            self.transition_to(CircuitState::Closed, config);
        }
    }

    pub fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_failure = Some(Instant::now());

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::FailureRecorded {
                circuit: config.name.clone(),
                timestamp: Instant::now(),
                state: self.state,
            });

        #[cfg(feature = "metrics")]
        counter!("circuitbreaker_calls_total", "circuit" => config.name.clone(), "outcome" => "failure")
            .increment(1);

        match self.state {
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, config),
            CircuitState::Closed if self.consecutive_failures >= config.failure_threshold => {
                self.transition_to(CircuitState::Open, config)
            }
            _ => {}
        }
    }

    pub fn force_open(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Open, config);
    }

    pub fn force_closed(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
    }

    /// Returns the circuit to closed and zeroes every counter. Idempotent.
    pub fn reset(&mut self, config: &CircuitBreakerConfig) {
        self.transition_to(CircuitState::Closed, config);
        self.calls = 0;
        self.failures = 0;
        self.successes = 0;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.last_failure = None;
    }

    fn transition_to(&mut self, state: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == state {
            return;
        }
        let from_state = self.state;

        config
            .event_listeners
            .emit(&CircuitBreakerEvent::StateTransition {
                circuit: config.name.clone(),
                timestamp: Instant::now(),
                from_state,
                to_state: state,
            });

        #[cfg(feature = "tracing")]
        tracing::info!(
            circuit = %config.name,
            from = from_state.as_str(),
            to = state.as_str(),
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            counter!(
                "circuitbreaker_transitions_total",
                "circuit" => config.name.clone(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            gauge!("circuitbreaker_state", "circuit" => config.name.clone()).set(state as u8 as f64);
        }

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.state_changes += 1;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;

        // An operator forcing the circuit open starts a fresh recovery window.
        if state == CircuitState::Open && self.last_failure.is_none() {
            self.last_failure = Some(Instant::now());
        }
    }
}
