//! Typed configuration for the vigil core.
//!
//! The configuration is a fixed set of recognized keys; a supplied key/value
//! map containing anything else is rejected at load time. [`CoreConfig::from_env`]
//! reads only the recognized names from the process environment, so unrelated
//! environment variables never interfere.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Zero-downtime deployment strategy for the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    BlueGreen,
    Rolling,
    SocketHandoff,
}

impl DeploymentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStrategy::BlueGreen => "blue_green",
            DeploymentStrategy::Rolling => "rolling",
            DeploymentStrategy::SocketHandoff => "socket_handoff",
        }
    }
}

impl std::str::FromStr for DeploymentStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blue_green" => Ok(DeploymentStrategy::BlueGreen),
            "rolling" => Ok(DeploymentStrategy::Rolling),
            "socket_handoff" => Ok(DeploymentStrategy::SocketHandoff),
            other => Err(format!(
                "expected blue_green, rolling or socket_handoff, got {other:?}"
            )),
        }
    }
}

/// Raised once at startup when configuration cannot be loaded. Aborts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A key outside the recognized set was supplied.
    #[error("unrecognized configuration key {key:?}")]
    UnknownKey { key: String },

    /// A recognized key carried a value that does not parse.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Every key the core recognizes.
pub const RECOGNIZED_KEYS: &[&str] = &[
    "WORKER_COUNT",
    "DEPLOYMENT_STRATEGY",
    "WORKER_RESTART_BACKOFF_MS",
    "WORKER_HEARTBEAT_INTERVAL_MS",
    "WORKER_DRAIN_GRACE_SECS",
    "HEALTH_CHECK_INTERVAL",
    "HEALTH_THRESHOLD",
    "HEALTH_ENDPOINT_PATH",
    "TRACING_SAMPLING_RATIO",
    "TRACING_BACKEND",
    "TRACING_ENDPOINT",
    "MONITORING_DASHBOARD_PORT",
    "MONITORING_ENABLED",
    "MONITORING_PROMETHEUS",
    "HEALTH_MONITORING_ENABLED",
    "OBSERVABILITY_CORRELATION",
    "HIGH_PERFORMANCE_MODE",
    "CONNECTION_THRESHOLD",
];

/// Typed view of the core's configuration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CoreConfig {
    pub worker_count: usize,
    pub deployment_strategy: DeploymentStrategy,
    #[serde(skip)]
    pub worker_restart_backoff: Duration,
    #[serde(skip)]
    pub worker_heartbeat_interval: Duration,
    #[serde(skip)]
    pub worker_drain_grace: Duration,
    #[serde(skip)]
    pub health_check_interval: Duration,
    pub health_threshold: f64,
    pub health_endpoint_path: String,
    pub tracing_sampling_ratio: f64,
    pub tracing_backend: Option<String>,
    pub tracing_endpoint: Option<String>,
    pub monitoring_dashboard_port: Option<u16>,
    pub monitoring_enabled: bool,
    pub monitoring_prometheus: bool,
    pub health_monitoring_enabled: bool,
    pub observability_correlation: bool,
    pub high_performance_mode: bool,
    pub connection_threshold: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            deployment_strategy: DeploymentStrategy::Rolling,
            worker_restart_backoff: Duration::from_millis(100),
            worker_heartbeat_interval: Duration::from_secs(1),
            worker_drain_grace: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            health_threshold: 99.999,
            health_endpoint_path: "/health".to_string(),
            tracing_sampling_ratio: 1.0,
            tracing_backend: None,
            tracing_endpoint: None,
            monitoring_dashboard_port: None,
            monitoring_enabled: true,
            monitoring_prometheus: false,
            health_monitoring_enabled: true,
            observability_correlation: true,
            high_performance_mode: false,
            connection_threshold: 1024,
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    ///
    /// Only [`RECOGNIZED_KEYS`] are read; everything else in the environment
    /// is ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut map = HashMap::new();
        for key in RECOGNIZED_KEYS {
            if let Ok(value) = std::env::var(key) {
                map.insert((*key).to_string(), value);
            }
        }
        Self::from_map(&map)
    }

    /// Loads configuration from an explicit key/value map.
    ///
    /// Unknown keys are rejected so misspellings fail loudly at startup
    /// instead of silently falling back to defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in map.keys() {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                return Err(ConfigError::UnknownKey { key: key.clone() });
            }
        }

        let mut config = Self::default();

        if let Some(v) = map.get("WORKER_COUNT") {
            config.worker_count = parse(v, "WORKER_COUNT")?;
            if config.worker_count == 0 {
                return Err(invalid("WORKER_COUNT", v, "must be at least 1"));
            }
        }
        if let Some(v) = map.get("DEPLOYMENT_STRATEGY") {
            config.deployment_strategy = v
                .parse()
                .map_err(|reason: String| invalid("DEPLOYMENT_STRATEGY", v, &reason))?;
        }
        if let Some(v) = map.get("WORKER_RESTART_BACKOFF_MS") {
            config.worker_restart_backoff =
                Duration::from_millis(parse(v, "WORKER_RESTART_BACKOFF_MS")?);
        }
        if let Some(v) = map.get("WORKER_HEARTBEAT_INTERVAL_MS") {
            config.worker_heartbeat_interval =
                Duration::from_millis(parse(v, "WORKER_HEARTBEAT_INTERVAL_MS")?);
        }
        if let Some(v) = map.get("WORKER_DRAIN_GRACE_SECS") {
            config.worker_drain_grace = Duration::from_secs(parse(v, "WORKER_DRAIN_GRACE_SECS")?);
        }
        if let Some(v) = map.get("HEALTH_CHECK_INTERVAL") {
            config.health_check_interval = Duration::from_secs(parse(v, "HEALTH_CHECK_INTERVAL")?);
        }
        if let Some(v) = map.get("HEALTH_THRESHOLD") {
            config.health_threshold = parse(v, "HEALTH_THRESHOLD")?;
            if !(0.0..=100.0).contains(&config.health_threshold) {
                return Err(invalid("HEALTH_THRESHOLD", v, "must be a percentage"));
            }
        }
        if let Some(v) = map.get("HEALTH_ENDPOINT_PATH") {
            if !v.starts_with('/') {
                return Err(invalid("HEALTH_ENDPOINT_PATH", v, "must start with '/'"));
            }
            config.health_endpoint_path = v.clone();
        }
        if let Some(v) = map.get("TRACING_SAMPLING_RATIO") {
            config.tracing_sampling_ratio = parse(v, "TRACING_SAMPLING_RATIO")?;
            if !(0.0..=1.0).contains(&config.tracing_sampling_ratio) {
                return Err(invalid("TRACING_SAMPLING_RATIO", v, "must be within 0.0..=1.0"));
            }
        }
        if let Some(v) = map.get("TRACING_BACKEND") {
            config.tracing_backend = Some(v.clone());
        }
        if let Some(v) = map.get("TRACING_ENDPOINT") {
            config.tracing_endpoint = Some(v.clone());
        }
        if let Some(v) = map.get("MONITORING_DASHBOARD_PORT") {
            config.monitoring_dashboard_port = Some(parse(v, "MONITORING_DASHBOARD_PORT")?);
        }
        if let Some(v) = map.get("MONITORING_ENABLED") {
            config.monitoring_enabled = parse_bool(v, "MONITORING_ENABLED")?;
        }
        if let Some(v) = map.get("MONITORING_PROMETHEUS") {
            config.monitoring_prometheus = parse_bool(v, "MONITORING_PROMETHEUS")?;
        }
        if let Some(v) = map.get("HEALTH_MONITORING_ENABLED") {
            config.health_monitoring_enabled = parse_bool(v, "HEALTH_MONITORING_ENABLED")?;
        }
        if let Some(v) = map.get("OBSERVABILITY_CORRELATION") {
            config.observability_correlation = parse_bool(v, "OBSERVABILITY_CORRELATION")?;
        }
        if let Some(v) = map.get("HIGH_PERFORMANCE_MODE") {
            config.high_performance_mode = parse_bool(v, "HIGH_PERFORMANCE_MODE")?;
        }
        if let Some(v) = map.get("CONNECTION_THRESHOLD") {
            config.connection_threshold = parse(v, "CONNECTION_THRESHOLD")?;
        }

        Ok(config)
    }
}

fn parse<T>(value: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(value: &str, key: &'static str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
