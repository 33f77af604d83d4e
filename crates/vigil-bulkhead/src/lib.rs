//! Bulkhead isolation: named concurrency compartments.
//!
//! Each compartment caps concurrent operations, tracks request outcomes, and
//! isolates itself when its failure rate crosses a threshold. Compartments are
//! created lazily on first use with defaults of 100 concurrent operations and
//! a 30 s deadline.
//!
//! ```rust
//! use vigil_bulkhead::Bulkhead;
//!
//! # async fn example() {
//! let bulkhead = Bulkhead::builder().build();
//!
//! let value = bulkhead
//!     .execute("db", || async { Ok::<_, std::io::Error>(42) })
//!     .await
//!     .unwrap();
//! assert_eq!(value, 42);
//! # }
//! ```
//!
//! Check ordering per call: isolation flag first, then capacity, then the
//! operation runs under the compartment's deadline. Slots are released in all
//! paths, including panics, because they ride on semaphore permits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
#[cfg(feature = "metrics")]
use std::sync::Once;

pub use compartment::CompartmentStats;
pub use config::{BulkheadConfig, BulkheadConfigBuilder, CompartmentLimits};
pub use error::BulkheadError;
pub use events::{BulkheadEvent, RejectReason};

mod compartment;
mod config;
mod error;
mod events;

use compartment::CompartmentState;

#[cfg(feature = "metrics")]
static METRICS_INIT: Once = Once::new();

struct Slot {
    name: String,
    max_concurrent: usize,
    op_timeout: Option<std::time::Duration>,
    semaphore: Arc<Semaphore>,
    state: Mutex<CompartmentState>,
}

impl Slot {
    fn active(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }
}

/// Registry of named concurrency compartments.
pub struct Bulkhead {
    config: BulkheadConfig,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl Bulkhead {
    pub(crate) fn new(config: BulkheadConfig) -> Self {
        #[cfg(feature = "metrics")]
        METRICS_INIT.call_once(|| {
            describe_counter!(
                "bulkhead_calls_total",
                "Calls through the bulkhead by outcome"
            );
            describe_counter!(
                "bulkhead_isolations_total",
                "Compartments auto-isolated on failure rate"
            );
            describe_gauge!("bulkhead_active_calls", "Active calls per compartment");
        });

        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a builder with the default limits.
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }

    async fn slot(&self, name: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(name) {
            return Arc::clone(slot);
        }

        let limits = self.config.limits_for(name);
        let slot = Arc::new(Slot {
            name: name.to_string(),
            max_concurrent: limits.max_concurrent,
            op_timeout: limits.op_timeout,
            semaphore: Arc::new(Semaphore::new(limits.max_concurrent)),
            state: Mutex::new(CompartmentState::new()),
        });
        slots.insert(name.to_string(), Arc::clone(&slot));

        self.config
            .event_listeners
            .emit(&BulkheadEvent::CompartmentCreated {
                compartment: name.to_string(),
                timestamp: Instant::now(),
                max_concurrent: limits.max_concurrent,
            });

        slot
    }

    /// Runs `op` under compartment `name`, creating it if absent.
    ///
    /// Rejections ([`BulkheadError::CompartmentIsolated`],
    /// [`BulkheadError::CompartmentAtCapacity`]) are returned without running
    /// the operation. A deadline expiry counts as a failure and surfaces as
    /// [`BulkheadError::Timeout`].
    pub async fn execute<F, Fut, T, E>(&self, name: &str, op: F) -> Result<T, BulkheadError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(name).await;

        {
            let state = slot.state.lock().await;
            if state.isolated {
                self.reject(&slot, RejectReason::Isolated);
                return Err(BulkheadError::CompartmentIsolated {
                    compartment: slot.name.clone(),
                });
            }
        }

        let permit = match Arc::clone(&slot.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.reject(&slot, RejectReason::AtCapacity);
                return Err(BulkheadError::CompartmentAtCapacity {
                    compartment: slot.name.clone(),
                    max_concurrent: slot.max_concurrent,
                });
            }
        };

        {
            let mut state = slot.state.lock().await;
            state.requests += 1;
        }
        self.config
            .event_listeners
            .emit(&BulkheadEvent::CallPermitted {
                compartment: slot.name.clone(),
                timestamp: Instant::now(),
                active: slot.active(),
            });
        #[cfg(feature = "metrics")]
        gauge!("bulkhead_active_calls", "compartment" => slot.name.clone())
            .set(slot.active() as f64);

        let start = Instant::now();
        let outcome = match slot.op_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, op()).await {
                Ok(result) => Some(result),
                Err(_) => None,
            },
            None => Some(op().await),
        };
        let duration = start.elapsed();
        drop(permit);

        match outcome {
            Some(Ok(value)) => {
                let mut state = slot.state.lock().await;
                state.successes += 1;
                state.record_sample(duration);
                drop(state);

                self.config
                    .event_listeners
                    .emit(&BulkheadEvent::CallFinished {
                        compartment: slot.name.clone(),
                        timestamp: Instant::now(),
                        duration,
                    });
                #[cfg(feature = "metrics")]
                counter!("bulkhead_calls_total", "compartment" => slot.name.clone(), "outcome" => "success")
                    .increment(1);

                Ok(value)
            }
            Some(Err(error)) => {
                self.record_failure(&slot, duration).await;
                Err(BulkheadError::Inner(error))
            }
            None => {
                self.record_failure(&slot, duration).await;
                Err(BulkheadError::Timeout {
                    compartment: slot.name.clone(),
                    after: slot.op_timeout.unwrap_or_default(),
                })
            }
        }
    }

    async fn record_failure(&self, slot: &Slot, duration: std::time::Duration) {
        let (isolated_now, failure_rate) = {
            let mut state = slot.state.lock().await;
            state.failures += 1;
            state.last_failure = Some(Instant::now());
            state.record_sample(duration);

            let rate = state.failure_rate();
            if !state.isolated && rate > self.config.isolation_threshold {
                state.isolated = true;
                state.isolated_at = Some(Instant::now());
                (true, rate)
            } else {
                (false, rate)
            }
        };

        self.config.event_listeners.emit(&BulkheadEvent::CallFailed {
            compartment: slot.name.clone(),
            timestamp: Instant::now(),
            duration,
        });
        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_total", "compartment" => slot.name.clone(), "outcome" => "failure")
            .increment(1);

        if isolated_now {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                compartment = %slot.name,
                failure_rate,
                "compartment isolated"
            );
            #[cfg(feature = "metrics")]
            counter!("bulkhead_isolations_total", "compartment" => slot.name.clone()).increment(1);

            self.config
                .event_listeners
                .emit(&BulkheadEvent::CompartmentIsolated {
                    compartment: slot.name.clone(),
                    timestamp: Instant::now(),
                    failure_rate,
                });
        }
    }

    fn reject(&self, slot: &Slot, reason: RejectReason) {
        self.config
            .event_listeners
            .emit(&BulkheadEvent::CallRejected {
                compartment: slot.name.clone(),
                timestamp: Instant::now(),
                reason,
            });
        #[cfg(feature = "metrics")]
        counter!("bulkhead_calls_total", "compartment" => slot.name.clone(), "outcome" => "rejected")
            .increment(1);
    }

    /// Clears the isolation flag and resets the compartment's counters.
    ///
    /// No-op for a compartment that was never used.
    pub async fn recover_compartment(&self, name: &str) {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(name).map(Arc::clone)
        };
        let Some(slot) = slot else { return };

        slot.state.lock().await.recover();

        #[cfg(feature = "tracing")]
        tracing::info!(compartment = %name, "compartment recovered");

        self.config
            .event_listeners
            .emit(&BulkheadEvent::CompartmentRecovered {
                compartment: name.to_string(),
                timestamp: Instant::now(),
            });
    }

    /// Health query: false when isolated, the failure rate exceeds 25 %, or
    /// the most recent failure is younger than 5 s.
    pub async fn is_compartment_healthy(&self, name: &str) -> bool {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(name).map(Arc::clone)
        };
        let Some(slot) = slot else {
            // Never used: nothing speaks against it.
            return true;
        };

        let state = slot.state.lock().await;
        if state.isolated {
            return false;
        }
        if state.failure_rate() > self.config.unhealthy_rate {
            return false;
        }
        if let Some(at) = state.last_failure {
            if at.elapsed() < self.config.failure_cooldown {
                return false;
            }
        }
        true
    }

    /// Snapshot of one compartment.
    pub async fn stats(&self, name: &str) -> Option<CompartmentStats> {
        let slot = {
            let slots = self.slots.lock().await;
            slots.get(name).map(Arc::clone)
        };
        let slot = slot?;
        let state = slot.state.lock().await;
        Some(CompartmentStats {
            name: slot.name.clone(),
            max_concurrent: slot.max_concurrent,
            active: slot.active(),
            requests: state.requests,
            successes: state.successes,
            failures: state.failures,
            isolated: state.isolated,
            failure_rate: state.failure_rate(),
            mean_response: state.mean_response,
        })
    }

    /// Snapshot of every compartment created so far.
    pub async fn stats_all(&self) -> Vec<CompartmentStats> {
        let slots: Vec<Arc<Slot>> = {
            let slots = self.slots.lock().await;
            slots.values().map(Arc::clone).collect()
        };

        let mut all = Vec::with_capacity(slots.len());
        for slot in slots {
            let state = slot.state.lock().await;
            all.push(CompartmentStats {
                name: slot.name.clone(),
                max_concurrent: slot.max_concurrent,
                active: slot.active(),
                requests: state.requests,
                successes: state.successes,
                failures: state.failures,
                isolated: state.isolated,
                failure_rate: state.failure_rate(),
                mean_response: state.mean_response,
            });
        }
        all
    }
}
