//! Per-context state tracked by the orchestrator.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use vigil_circuitbreaker::CircuitBreaker;

/// Probe run by the self-healing coordinator through the protected path.
pub type RecoveryProbe = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ()>> + Send + Sync>;

/// Public snapshot of one context.
#[derive(Debug, Clone)]
pub struct ContextStats {
    pub name: String,
    pub healthy: bool,
    pub degraded: bool,
    pub failures: u64,
    /// Coarse availability gauge, not a measured SLO: estimates failure time
    /// as a fixed weight per failure against wall-clock since creation.
    pub uptime_percent: f64,
    pub age: Duration,
}

pub(crate) struct ContextState {
    pub healthy: bool,
    pub degraded: bool,
    pub failures: u64,
    pub last_failure: Option<Instant>,
    pub created_at: Instant,
}

impl ContextState {
    pub fn new() -> Self {
        Self {
            healthy: true,
            degraded: false,
            failures: 0,
            last_failure: None,
            created_at: Instant::now(),
        }
    }

    pub fn mark_recovered(&mut self) {
        self.healthy = true;
        self.degraded = false;
        self.failures = 0;
        self.last_failure = None;
    }

    pub fn uptime_percent(&self, failure_weight: Duration) -> f64 {
        let elapsed = self.created_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 100.0;
        }
        let estimated_failure_time = failure_weight.as_secs_f64() * self.failures as f64;
        ((1.0 - estimated_failure_time / elapsed) * 100.0).clamp(0.0, 100.0)
    }
}

pub(crate) struct ContextHandle {
    pub name: String,
    pub breaker: Arc<CircuitBreaker>,
    pub state: Mutex<ContextState>,
    pub probe: std::sync::Mutex<Option<RecoveryProbe>>,
}

impl ContextHandle {
    pub fn probe(&self) -> Option<RecoveryProbe> {
        self.probe.lock().expect("probe lock poisoned").clone()
    }
}
