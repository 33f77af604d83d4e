//! Probe registry and periodic runner.

use crate::{ComponentHealth, HealthCheckConfig, HealthReport, HealthStatus, OverallHealth, ProbeResult};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

type BoxedProbe = Arc<dyn Fn() -> BoxFuture<'static, ProbeResult> + Send + Sync>;

#[derive(Default)]
struct Availability {
    since: Option<Instant>,
    unhealthy_time: std::time::Duration,
    last_eval: Option<(Instant, HealthStatus)>,
}

/// Registry of named probes with a periodic background runner.
pub struct HealthChecker {
    config: HealthCheckConfig,
    probes: Arc<Mutex<BTreeMap<String, BoxedProbe>>>,
    results: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    availability: Arc<Mutex<Availability>>,
    runner: RwLock<Option<JoinHandle<()>>>,
}

impl HealthChecker {
    pub(crate) fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            probes: Arc::new(Mutex::new(BTreeMap::new())),
            results: Arc::new(RwLock::new(BTreeMap::new())),
            availability: Arc::new(Mutex::new(Availability::default())),
            runner: RwLock::new(None),
        }
    }

    /// Returns a builder with the default cadence.
    pub fn builder() -> crate::HealthCheckConfigBuilder {
        crate::HealthCheckConfigBuilder::new()
    }

    /// Registers (or replaces) the probe for `name`.
    pub fn register<F, Fut>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ProbeResult> + Send + 'static,
    {
        let probe: BoxedProbe = Arc::new(move || Box::pin(probe()));
        self.probes
            .lock()
            .expect("probe registry poisoned")
            .insert(name.into(), probe);
    }

    /// Removes the probe for `name`, keeping its last stored result out of
    /// future reports.
    pub async fn deregister(&self, name: &str) {
        self.probes
            .lock()
            .expect("probe registry poisoned")
            .remove(name);
        self.results.write().await.remove(name);
    }

    /// Runs every registered probe once and stores the results.
    pub async fn run_once(&self) {
        let probes: Vec<(String, BoxedProbe)> = {
            let probes = self.probes.lock().expect("probe registry poisoned");
            probes
                .iter()
                .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
                .collect()
        };

        let mut set = tokio::task::JoinSet::new();
        let timeout = self.config.probe_timeout;
        for (name, probe) in probes {
            set.spawn(async move {
                let result = match tokio::time::timeout(timeout, probe()).await {
                    Ok(result) => result,
                    Err(_) => ProbeResult::unhealthy().detail("error", "probe timed out"),
                };
                (name, result)
            });
        }

        let mut results = self.results.write().await;
        while let Some(joined) = set.join_next().await {
            let Ok((name, result)) = joined else { continue };

            #[cfg(feature = "tracing")]
            if let Some(previous) = results.get(&name) {
                if previous.status != result.status {
                    tracing::info!(
                        component = %name,
                        from = previous.status.as_str(),
                        to = result.status.as_str(),
                        "health status changed"
                    );
                }
            }

            results.insert(
                name,
                ComponentHealth {
                    status: result.status,
                    checked_at: SystemTime::now(),
                    detail: result.detail,
                },
            );
        }
        drop(results);

        self.account_availability().await;
    }

    /// Starts the periodic runner. Replaces a previously started one.
    pub async fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let interval = self.config.check_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                this.run_once().await;
            }
        });

        let mut runner = self.runner.write().await;
        if let Some(previous) = runner.replace(task) {
            previous.abort();
        }
    }

    /// Stops the periodic runner.
    pub async fn stop(&self) {
        if let Some(task) = self.runner.write().await.take() {
            task.abort();
        }
    }

    /// Composes the report: overall rollup plus the latest per-component
    /// results. Probes registered but not yet run report degraded with a
    /// `pending` detail.
    pub async fn report(&self) -> HealthReport {
        let results = self.results.read().await;
        let mut components = results.clone();

        {
            let probes = self.probes.lock().expect("probe registry poisoned");
            for name in probes.keys() {
                components.entry(name.clone()).or_insert_with(|| ComponentHealth {
                    status: HealthStatus::Degraded,
                    checked_at: SystemTime::now(),
                    detail: BTreeMap::from([("state".to_string(), "pending".to_string())]),
                });
            }
        }

        let status = components
            .values()
            .map(|c| c.status)
            .fold(HealthStatus::Healthy, HealthStatus::combine);

        HealthReport {
            overall: OverallHealth {
                status,
                timestamp: SystemTime::now(),
            },
            components,
        }
    }

    /// Overall status alone.
    pub async fn overall(&self) -> HealthStatus {
        self.report().await.overall.status
    }

    /// Observed availability (percent) since the checker began evaluating,
    /// bounded by the configured rolling window.
    pub async fn availability(&self) -> f64 {
        let availability = self.availability.lock().expect("availability poisoned");
        let Some(since) = availability.since else {
            return 100.0;
        };
        let elapsed = since.elapsed().min(self.config.availability_window);
        if elapsed.is_zero() {
            return 100.0;
        }
        let unhealthy = availability.unhealthy_time.min(elapsed);
        (1.0 - unhealthy.as_secs_f64() / elapsed.as_secs_f64()) * 100.0
    }

    /// Whether observed availability meets the configured target.
    pub async fn meets_availability_target(&self) -> bool {
        self.availability().await >= self.config.availability_target
    }

    async fn account_availability(&self) {
        let status = {
            let results = self.results.read().await;
            results
                .values()
                .map(|c| c.status)
                .fold(HealthStatus::Healthy, HealthStatus::combine)
        };

        let mut availability = self.availability.lock().expect("availability poisoned");
        let now = Instant::now();
        if availability.since.is_none() {
            availability.since = Some(now);
        }
        if let Some((at, previous)) = availability.last_eval {
            if previous != HealthStatus::Healthy {
                availability.unhealthy_time += now.duration_since(at);
            }
        }
        availability.last_eval = Some((now, status));
    }
}
