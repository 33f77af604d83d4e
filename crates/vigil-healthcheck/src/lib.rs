//! Periodic health probes and aggregated rollup.
//!
//! A [`HealthChecker`] holds a registry of named async probes, runs them every
//! check interval, stores the latest result per component, and rolls the
//! results up into one overall status: healthy iff every component is
//! healthy, unhealthy if any component is unhealthy, degraded otherwise.
//!
//! ```rust
//! use vigil_healthcheck::{HealthChecker, HealthStatus, ProbeResult};
//!
//! # async fn example() {
//! let checker = HealthChecker::builder().build();
//! checker.register("db", || async { ProbeResult::healthy() });
//! checker.register("cache", || async {
//!     ProbeResult::new(HealthStatus::Degraded).detail("hit_rate", "0.42")
//! });
//!
//! checker.run_once().await;
//! assert_eq!(checker.report().await.overall.status, HealthStatus::Degraded);
//! # }
//! ```

mod config;
mod registry;

pub use config::{HealthCheckConfig, HealthCheckConfigBuilder};
pub use registry::HealthChecker;

use std::collections::BTreeMap;
use std::time::SystemTime;

/// Status of a probed component or the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Rollup of two statuses: the worse of the pair wins.
    pub fn combine(self, other: HealthStatus) -> HealthStatus {
        use HealthStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

/// Outcome of a single probe invocation.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub detail: BTreeMap<String, String>,
}

impl ProbeResult {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            detail: BTreeMap::new(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy)
    }

    pub fn unhealthy() -> Self {
        Self::new(HealthStatus::Unhealthy)
    }

    /// Attaches a key/value detail to the result.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}

/// Latest stored result for one component.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(with = "unix_millis")]
    pub checked_at: SystemTime,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
}

/// Overall status with its computation time.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OverallHealth {
    pub status: HealthStatus,
    #[serde(with = "unix_millis")]
    pub timestamp: SystemTime,
}

/// Composed report served by the health endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthReport {
    pub overall: OverallHealth,
    pub components: BTreeMap<String, ComponentHealth>,
}

mod unix_millis {
    use serde::Serializer;
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        serializer.serialize_u64(millis)
    }
}
