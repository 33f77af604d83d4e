//! Observability fabric: traces, metrics and health under one manager.
//!
//! The manager is the registry object the reliability components and the
//! worker runtime both depend on; neither holds a pointer back into the
//! other. Components emit events; observability subscribes with listeners
//! created by [`ObservabilityManager::observe`], correlates them with the
//! ambient operation via task-local span frames, and rolls health up through
//! a [`HealthChecker`].
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use vigil_healthcheck::HealthChecker;
//! use vigil_observability::{ObservabilityConfig, ObservabilityManager};
//!
//! # async fn example() {
//! let health = Arc::new(HealthChecker::builder().build());
//! let manager = Arc::new(ObservabilityManager::new(
//!     ObservabilityConfig::default(),
//!     health,
//! ));
//!
//! let result: Result<u32, std::io::Error> = manager
//!     .trace_operation("lookup", BTreeMap::new(), |correlation| async move {
//!         let _ = correlation;
//!         Ok(42)
//!     })
//!     .await;
//! assert_eq!(result.unwrap(), 42);
//! # }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use vigil_bulkhead::Bulkhead;
use vigil_circuitbreaker::{CircuitBreaker, CircuitState};
use vigil_core::{current_correlation, with_correlation, CoreEvent, CorrelationId, FnListener};
use vigil_eventloop::HybridEventLoop;
use vigil_healthcheck::{HealthChecker, HealthReport, HealthStatus, ProbeResult};
use vigil_reliability::ReliabilityOrchestrator;

pub use config::{ObservabilityConfig, ObservabilityConfigBuilder};
pub use endpoint::{monitoring_router, serve_monitoring};
pub use metrics::{MetricKey, MetricValue};
pub use span::{SpanStatus, TraceSpan};

mod config;
mod endpoint;
mod metrics;
mod span;

use metrics::MetricsRegistry;
use span::SpanFrame;

/// Push target for metric snapshots.
///
/// The wire format and endpoint are the collaborator's concern; vigil hands
/// over the snapshot on the configured cadence with the worker id label
/// already applied by the caller.
pub trait MetricsExporter: Send + Sync {
    fn export(&self, snapshot: &[(MetricKey, MetricValue)]);
}

/// A reliability component handed to
/// [`ObservabilityManager::register_reliability_component`].
pub enum ReliabilityComponent {
    CircuitBreaker(Arc<CircuitBreaker>),
    Bulkhead(Arc<Bulkhead>),
    Orchestrator(Arc<ReliabilityOrchestrator>),
    EventLoop(Arc<HybridEventLoop>),
}

/// Cross-cuts tracing, metrics and health for one process.
pub struct ObservabilityManager {
    config: ObservabilityConfig,
    health: Arc<HealthChecker>,
    metrics: MetricsRegistry,
    spans: Mutex<VecDeque<TraceSpan>>,
    sample_seq: AtomicU64,
}

impl ObservabilityManager {
    pub fn new(config: ObservabilityConfig, health: Arc<HealthChecker>) -> Self {
        Self {
            config,
            health,
            metrics: MetricsRegistry::new(),
            spans: Mutex::new(VecDeque::new()),
            sample_seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ObservabilityConfig {
        &self.config
    }

    /// The health checker this manager delegates to.
    pub fn health_checker(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    /// Runs `f` as a traced operation.
    ///
    /// Allocates a correlation id, scopes it for the duration of `f`, records
    /// a span (subject to sampling) with status, timing, attributes and the
    /// reliability components the operation crossed. Spans nest: an operation
    /// started inside another records it as parent.
    pub async fn trace_operation<F, Fut, T, E>(
        &self,
        operation: &str,
        attributes: BTreeMap<String, String>,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(CorrelationId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let correlation_id = CorrelationId::next();
        let parent = span::current_span_id();
        let started_at = SystemTime::now();

        let (result, components) = span::with_span_stack(with_correlation(correlation_id, async {
            let _ = span::SPAN_STACK.try_with(|stack| {
                stack.borrow_mut().push(SpanFrame {
                    correlation_id,
                    components: Vec::new(),
                })
            });

            let result = f(correlation_id).await;

            let components = span::SPAN_STACK
                .try_with(|stack| stack.borrow_mut().pop().map(|frame| frame.components))
                .ok()
                .flatten()
                .unwrap_or_default();
            (result, components)
        }))
        .await;

        let status = if result.is_ok() {
            SpanStatus::Ok
        } else {
            SpanStatus::Error
        };

        tracing::debug!(
            correlation = %correlation_id,
            operation,
            status = ?status,
            "operation finished"
        );

        if self.sample() {
            let mut spans = self.spans.lock().expect("span buffer poisoned");
            if spans.len() >= self.config.span_capacity {
                spans.pop_front();
            }
            spans.push_back(TraceSpan {
                correlation_id,
                operation: operation.to_string(),
                parent,
                started_at,
                ended_at: SystemTime::now(),
                status,
                attributes,
                components,
            });
        }

        result
    }

    fn sample(&self) -> bool {
        let ratio = self.config.sampling_ratio;
        if ratio >= 1.0 {
            return true;
        }
        if ratio <= 0.0 {
            return false;
        }
        let seq = self.sample_seq.fetch_add(1, Ordering::Relaxed);
        ((seq % 10_000) as f64) < ratio * 10_000.0
    }

    /// Finished spans, oldest first, bounded by the configured capacity.
    pub fn finished_spans(&self) -> Vec<TraceSpan> {
        self.spans
            .lock()
            .expect("span buffer poisoned")
            .iter()
            .cloned()
            .collect()
    }

    fn correlation(&self) -> Option<CorrelationId> {
        if self.config.correlation_enabled {
            span::current_span_id().or_else(current_correlation)
        } else {
            None
        }
    }

    /// Increments a counter, tagging it with the active correlation id.
    pub fn increment_counter(&self, key: MetricKey, by: u64) {
        self.metrics.increment(key, by, self.correlation());
    }

    /// Sets a gauge.
    pub fn set_gauge(&self, key: MetricKey, value: f64) {
        self.metrics.set_gauge(key, value, self.correlation());
    }

    /// Records a histogram sample.
    pub fn record_histogram(&self, key: MetricKey, sample: f64) {
        self.metrics.record(key, sample, self.correlation());
    }

    /// Pull-based export: every stored metric.
    pub fn metrics_snapshot(&self) -> Vec<(MetricKey, MetricValue)> {
        self.metrics.snapshot()
    }

    /// Prometheus text exposition of the stored metrics.
    pub fn render_prometheus(&self) -> String {
        self.metrics.render()
    }

    /// Starts pushing snapshots to `exporter` every `interval`.
    ///
    /// Abort the returned handle to stop pushing.
    pub fn start_push(
        self: &Arc<Self>,
        exporter: Arc<dyn MetricsExporter>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                exporter.export(&manager.metrics_snapshot());
            }
        })
    }

    /// Composed health report from the health checker.
    pub async fn health_report(&self) -> HealthReport {
        self.health.report().await
    }

    /// Builds a listener that correlates a component's events with the
    /// active span and counts them. Pass it to the component's builder.
    pub fn observe<E>(self: &Arc<Self>, component: &str) -> FnListener<E, impl Fn(&E) + Send + Sync>
    where
        E: CoreEvent + 'static,
    {
        let manager = Arc::clone(self);
        let component = component.to_string();
        FnListener::new(move |event: &E| {
            span::note_component(&component);
            manager.metrics.increment(
                MetricKey::new("vigil_component_events_total")
                    .label("component", component.clone())
                    .label("kind", event.event_kind()),
                1,
                manager.correlation(),
            );
        })
    }

    /// Registers a built component: its state feeds the health rollup under
    /// `name`.
    pub fn register_reliability_component(&self, name: &str, component: ReliabilityComponent) {
        match component {
            ReliabilityComponent::CircuitBreaker(breaker) => {
                self.health.register(name, move || {
                    let breaker = Arc::clone(&breaker);
                    async move {
                        let state = breaker.state_sync();
                        let status = match state {
                            CircuitState::Closed => HealthStatus::Healthy,
                            CircuitState::HalfOpen | CircuitState::Open => HealthStatus::Degraded,
                        };
                        ProbeResult::new(status).detail("circuit_state", state.as_str())
                    }
                });
            }
            ReliabilityComponent::Bulkhead(bulkhead) => {
                self.health.register(name, move || {
                    let bulkhead = Arc::clone(&bulkhead);
                    async move {
                        let stats = bulkhead.stats_all().await;
                        let isolated = stats.iter().filter(|c| c.isolated).count();
                        let status = if isolated > 0 {
                            HealthStatus::Degraded
                        } else {
                            HealthStatus::Healthy
                        };
                        ProbeResult::new(status)
                            .detail("compartments", stats.len().to_string())
                            .detail("isolated", isolated.to_string())
                    }
                });
            }
            ReliabilityComponent::Orchestrator(orchestrator) => {
                self.health.register(name, move || {
                    let orchestrator = Arc::clone(&orchestrator);
                    async move {
                        let contexts = orchestrator.stats_all().await;
                        let degraded = contexts.iter().filter(|c| c.degraded).count();
                        let status = if contexts.iter().any(|c| !c.healthy) {
                            HealthStatus::Unhealthy
                        } else if degraded > 0 {
                            HealthStatus::Degraded
                        } else {
                            HealthStatus::Healthy
                        };
                        ProbeResult::new(status)
                            .detail("contexts", contexts.len().to_string())
                            .detail(
                                "uptime_percent",
                                format!("{:.3}", orchestrator.uptime_percent()),
                            )
                    }
                });
            }
            ReliabilityComponent::EventLoop(event_loop) => {
                self.health.register(name, move || {
                    let event_loop = Arc::clone(&event_loop);
                    async move {
                        let metrics = event_loop.metrics();
                        ProbeResult::healthy()
                            .detail("backend", metrics.backend_in_use.as_str())
                            .detail("connections", metrics.connection_count.to_string())
                    }
                });
            }
        }
    }
}
