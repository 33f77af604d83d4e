//! Reliability orchestration: one entry point for protected calls.
//!
//! [`ReliabilityOrchestrator::execute`] runs an operation under a named
//! context. Each context lazily gets a circuit breaker and a bulkhead
//! compartment; a health gate in front of both rejects calls for contexts
//! that have recently failed, and every failure feeds the self-healing
//! coordinator, which probes the context back to health with exponential
//! back-off.
//!
//! ```rust
//! use vigil_reliability::{ReliabilityOrchestrator, ReliabilityError};
//!
//! # async fn example() {
//! let orchestrator = ReliabilityOrchestrator::builder().build();
//!
//! let value = orchestrator
//!     .execute("billing", || async { Ok::<_, std::io::Error>(7) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 7);
//! # }
//! ```
//!
//! Rejections come back as [`ReliabilityError`] variants; the operation's own
//! fault passes through verbatim as [`ReliabilityError::Inner`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use vigil_bulkhead::Bulkhead;
use vigil_circuitbreaker::CircuitBreaker;

pub use config::{ReliabilityConfig, ReliabilityConfigBuilder, SelfHealingConfig};
pub use context::{ContextStats, RecoveryProbe};
pub use error::ReliabilityError;
pub use events::ReliabilityEvent;
pub use layer::{ReliabilityLayer, ReliabilityService};

mod config;
mod context;
mod error;
mod events;
mod healing;
mod layer;

use context::{ContextHandle, ContextState};
use healing::SelfHealing;

/// Combines circuit breaker, bulkhead and self-healing under one
/// `execute(context, op)` entry point.
pub struct ReliabilityOrchestrator {
    config: ReliabilityConfig,
    bulkhead: Arc<Bulkhead>,
    contexts: Mutex<HashMap<String, Arc<ContextHandle>>>,
    healing: SelfHealing,
    started_at: Instant,
    total_failures: AtomicU64,
}

impl ReliabilityOrchestrator {
    pub(crate) fn new(config: ReliabilityConfig, bulkhead: Arc<Bulkhead>) -> Self {
        let healing = SelfHealing::new(config.healing.clone());
        Self {
            config,
            bulkhead,
            contexts: Mutex::new(HashMap::new()),
            healing,
            started_at: Instant::now(),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Returns a builder with the default gates and back-off.
    pub fn builder() -> ReliabilityConfigBuilder {
        ReliabilityConfigBuilder::new()
    }

    /// The bulkhead backing this orchestrator's compartments.
    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }

    async fn context_handle(&self, name: &str) -> Arc<ContextHandle> {
        let mut contexts = self.contexts.lock().await;
        if let Some(handle) = contexts.get(name) {
            return Arc::clone(handle);
        }

        let breaker = CircuitBreaker::builder()
            .name(name)
            .failure_threshold(self.config.circuit_failure_threshold)
            .success_threshold(self.config.circuit_success_threshold)
            .recovery_delay(self.config.circuit_recovery_delay)
            .build();

        let handle = Arc::new(ContextHandle {
            name: name.to_string(),
            breaker: Arc::new(breaker),
            state: Mutex::new(ContextState::new()),
            probe: std::sync::Mutex::new(None),
        });
        contexts.insert(name.to_string(), Arc::clone(&handle));

        self.config
            .event_listeners
            .emit(&events::ReliabilityEvent::ContextCreated {
                context: name.to_string(),
                timestamp: Instant::now(),
            });

        handle
    }

    /// Runs `op` under `context`, creating the context on first use.
    ///
    /// The health gate rejects with [`ReliabilityError::ContextUnhealthy`]
    /// when the context is flagged unhealthy, failed within the last second,
    /// exceeded its cumulative failure limit, or its compartment is unhealthy.
    /// Otherwise the call flows through the bulkhead and the circuit breaker.
    pub async fn execute<F, Fut, T, E>(
        &self,
        context: &str,
        op: F,
    ) -> Result<T, ReliabilityError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let handle = self.context_handle(context).await;

        if !self.gate_allows(&handle).await {
            {
                let mut state = handle.state.lock().await;
                state.degraded = true;
            }
            self.config
                .event_listeners
                .emit(&events::ReliabilityEvent::ContextDegraded {
                    context: handle.name.clone(),
                    timestamp: Instant::now(),
                });
            self.config
                .event_listeners
                .emit(&events::ReliabilityEvent::CallRejected {
                    context: handle.name.clone(),
                    timestamp: Instant::now(),
                });
            return Err(ReliabilityError::ContextUnhealthy {
                context: handle.name.clone(),
            });
        }

        let breaker = Arc::clone(&handle.breaker);
        let result = self
            .bulkhead
            .execute(context, || async move { breaker.execute(op).await })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.note_failure(&handle).await;
                Err(err.into())
            }
        }
    }

    /// [`execute`](Self::execute) with a per-call deadline.
    ///
    /// Expiry counts as a failure and requests a best-effort cancellation of
    /// the in-flight operation by dropping it.
    pub async fn execute_with_deadline<F, Fut, T, E>(
        &self,
        context: &str,
        deadline: Duration,
        op: F,
    ) -> Result<T, ReliabilityError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(deadline, self.execute(context, op)).await {
            Ok(result) => result,
            Err(_) => {
                let handle = self.context_handle(context).await;
                self.note_failure(&handle).await;
                Err(ReliabilityError::Timeout { after: deadline })
            }
        }
    }

    /// Health gate used by [`execute`](Self::execute).
    pub async fn is_healthy(&self, context: &str) -> bool {
        let handle = self.context_handle(context).await;
        self.gate_allows(&handle).await
    }

    async fn gate_allows(&self, handle: &Arc<ContextHandle>) -> bool {
        {
            let state = handle.state.lock().await;
            if !state.healthy {
                return false;
            }
            if state.failures > self.config.unhealthy_failure_limit {
                return false;
            }
            if let Some(at) = state.last_failure {
                if at.elapsed() < self.config.recent_failure_window {
                    return false;
                }
            }
        }
        self.bulkhead.is_compartment_healthy(&handle.name).await
    }

    async fn note_failure(&self, handle: &Arc<ContextHandle>) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let isolated = {
            let mut state = handle.state.lock().await;
            state.failures += 1;
            state.last_failure = Some(Instant::now());
            if state.failures > self.config.isolate_failure_limit && state.healthy {
                state.healthy = false;
                true
            } else {
                false
            }
        };

        if isolated {
            let failures = handle.state.lock().await.failures;
            #[cfg(feature = "tracing")]
            tracing::warn!(context = %handle.name, failures, "context isolated");
            self.config
                .event_listeners
                .emit(&events::ReliabilityEvent::ContextIsolated {
                    context: handle.name.clone(),
                    timestamp: Instant::now(),
                    failures,
                });
        }

        self.healing.ensure_recovery(
            Arc::clone(handle),
            Arc::clone(&self.bulkhead),
            self.config.event_listeners.clone(),
        );
    }

    /// Registers the probe self-healing sends through the protected path for
    /// `context`. Without one, a trivial always-succeeding probe is used.
    pub async fn register_probe(&self, context: &str, probe: RecoveryProbe) {
        let handle = self.context_handle(context).await;
        *handle.probe.lock().expect("probe lock poisoned") = Some(probe);
    }

    /// Operator affordance: cancel healing, clear the context and recover its
    /// compartment immediately.
    pub async fn recover_context(&self, context: &str) {
        self.healing.cancel(context);
        let handle = self.context_handle(context).await;
        handle.state.lock().await.mark_recovered();
        self.bulkhead.recover_compartment(context).await;
        handle.breaker.reset().await;
    }

    /// Snapshot of one context, if it exists.
    pub async fn context_stats(&self, context: &str) -> Option<ContextStats> {
        let handle = {
            let contexts = self.contexts.lock().await;
            contexts.get(context).map(Arc::clone)
        }?;

        let state = handle.state.lock().await;
        Some(ContextStats {
            name: handle.name.clone(),
            healthy: state.healthy,
            degraded: state.degraded,
            failures: state.failures,
            uptime_percent: state.uptime_percent(self.config.failure_weight),
            age: state.created_at.elapsed(),
        })
    }

    /// Snapshot of every context created so far.
    pub async fn stats_all(&self) -> Vec<ContextStats> {
        let handles: Vec<Arc<ContextHandle>> = {
            let contexts = self.contexts.lock().await;
            contexts.values().map(Arc::clone).collect()
        };

        let mut all = Vec::with_capacity(handles.len());
        for handle in handles {
            let state = handle.state.lock().await;
            all.push(ContextStats {
                name: handle.name.clone(),
                healthy: state.healthy,
                degraded: state.degraded,
                failures: state.failures,
                uptime_percent: state.uptime_percent(self.config.failure_weight),
                age: state.created_at.elapsed(),
            });
        }
        all
    }

    /// Coarse process-wide availability gauge.
    ///
    /// Charges a fixed weight (default 10 ms) of estimated downtime per
    /// recorded failure against wall-clock since construction. A gauge for
    /// dashboards, not a measured SLO.
    pub fn uptime_percent(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 100.0;
        }
        let failures = self.total_failures.load(Ordering::Relaxed) as f64;
        let estimated_failure_time = self.config.failure_weight.as_secs_f64() * failures;
        ((1.0 - estimated_failure_time / elapsed) * 100.0).clamp(0.0, 100.0)
    }
}
