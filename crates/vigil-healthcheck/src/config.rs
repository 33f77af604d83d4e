//! Configuration for the health checker.

use std::time::Duration;

/// Configuration for a [`HealthChecker`](crate::HealthChecker).
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// How often all probes run.
    pub(crate) check_interval: Duration,
    /// Deadline for each probe; expiry reports the component unhealthy.
    pub(crate) probe_timeout: Duration,
    /// Availability target (percent) over the rolling window.
    pub(crate) availability_target: f64,
    /// Rolling window the availability target applies to.
    pub(crate) availability_window: Duration,
}

impl HealthCheckConfig {
    pub fn builder() -> HealthCheckConfigBuilder {
        HealthCheckConfigBuilder::new()
    }
}

/// Builder for [`HealthCheckConfig`].
pub struct HealthCheckConfigBuilder {
    check_interval: Duration,
    probe_timeout: Duration,
    availability_target: f64,
    availability_window: Duration,
}

impl HealthCheckConfigBuilder {
    pub fn new() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            availability_target: 99.999,
            availability_window: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// How often all probes run.
    ///
    /// Default: 30 s
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Deadline for a single probe.
    ///
    /// Default: 5 s
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Availability target in percent over the rolling window.
    ///
    /// Default: 99.999
    pub fn availability_target(mut self, percent: f64) -> Self {
        self.availability_target = percent;
        self
    }

    /// Rolling window for the availability target.
    ///
    /// Default: 24 h
    pub fn availability_window(mut self, window: Duration) -> Self {
        self.availability_window = window;
        self
    }

    pub fn build(self) -> crate::HealthChecker {
        crate::HealthChecker::new(HealthCheckConfig {
            check_interval: self.check_interval,
            probe_timeout: self.probe_timeout,
            availability_target: self.availability_target,
            availability_window: self.availability_window,
        })
    }
}

impl Default for HealthCheckConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
