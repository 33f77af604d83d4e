//! Configuration for the observability manager.

use vigil_core::CoreConfig;

/// Configuration for an [`ObservabilityManager`](crate::ObservabilityManager).
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Fraction of operations whose spans are retained (0.0..=1.0).
    pub(crate) sampling_ratio: f64,
    /// Attach correlation ids to metrics and health probes.
    pub(crate) correlation_enabled: bool,
    /// Serve the Prometheus text exposition on `/metrics`.
    pub(crate) prometheus_enabled: bool,
    /// Path the health endpoint is served on.
    pub(crate) health_path: String,
    /// Port for the monitoring endpoints, if any.
    pub(crate) dashboard_port: Option<u16>,
    /// Finished spans retained for inspection.
    pub(crate) span_capacity: usize,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            sampling_ratio: 1.0,
            correlation_enabled: true,
            prometheus_enabled: false,
            health_path: "/health".to_string(),
            dashboard_port: None,
            span_capacity: 1024,
        }
    }
}

impl ObservabilityConfig {
    pub fn builder() -> ObservabilityConfigBuilder {
        ObservabilityConfigBuilder::default()
    }

    /// Derives the observability settings from the process configuration.
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            sampling_ratio: config.tracing_sampling_ratio,
            correlation_enabled: config.observability_correlation,
            prometheus_enabled: config.monitoring_prometheus,
            health_path: config.health_endpoint_path.clone(),
            dashboard_port: config.monitoring_dashboard_port,
            span_capacity: 1024,
        }
    }

    pub fn dashboard_port(&self) -> Option<u16> {
        self.dashboard_port
    }
}

/// Builder for [`ObservabilityConfig`].
#[derive(Default)]
pub struct ObservabilityConfigBuilder {
    config: ObservabilityConfig,
}

impl ObservabilityConfigBuilder {
    /// Span sampling ratio. Default: 1.0 (keep everything)
    pub fn sampling_ratio(mut self, ratio: f64) -> Self {
        self.config.sampling_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Attach correlation ids to metrics and health probes. Default: true
    pub fn correlation(mut self, on: bool) -> Self {
        self.config.correlation_enabled = on;
        self
    }

    /// Serve `/metrics` in Prometheus text format. Default: false
    pub fn prometheus(mut self, on: bool) -> Self {
        self.config.prometheus_enabled = on;
        self
    }

    /// Health endpoint path. Default: `/health`
    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_path = path.into();
        self
    }

    /// Monitoring endpoint port. Default: none (endpoints not served)
    pub fn dashboard_port(mut self, port: u16) -> Self {
        self.config.dashboard_port = Some(port);
        self
    }

    pub fn build(self) -> ObservabilityConfig {
        self.config
    }
}
