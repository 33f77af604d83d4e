//! Self-healing coordinator.
//!
//! Failed contexts get a background recovery task: after an exponential
//! back-off it recovers the context's compartment, then sends a probe through
//! the regular bulkhead + circuit path. A successful probe marks the context
//! healthy; a failed one doubles the back-off. After the configured number of
//! attempts the coordinator gives up and the context stays degraded until an
//! operator intervenes.

use crate::config::SelfHealingConfig;
use crate::context::ContextHandle;
use crate::events::ReliabilityEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use vigil_bulkhead::Bulkhead;
use vigil_core::EventListeners;

pub(crate) struct SelfHealing {
    config: SelfHealingConfig,
    tasks: std::sync::Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SelfHealing {
    pub fn new(config: SelfHealingConfig) -> Self {
        Self {
            config,
            tasks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Ensures one recovery task runs for `handle`'s context.
    ///
    /// Called on every failure; only the first call while no task is running
    /// spawns one.
    pub fn ensure_recovery(
        &self,
        handle: Arc<ContextHandle>,
        bulkhead: Arc<Bulkhead>,
        listeners: EventListeners<ReliabilityEvent>,
    ) {
        let mut tasks = self.tasks.lock().expect("healing tasks poisoned");
        if let Some(task) = tasks.get(&handle.name) {
            if !task.is_finished() {
                return;
            }
        }

        let config = self.config.clone();
        let name = handle.name.clone();
        let task = tokio::spawn(run_recovery(handle, bulkhead, listeners, config));
        tasks.insert(name, task);
    }

    /// Cancels a pending recovery task, if any.
    pub fn cancel(&self, context: &str) {
        if let Some(task) = self
            .tasks
            .lock()
            .expect("healing tasks poisoned")
            .remove(context)
        {
            task.abort();
        }
    }
}

async fn run_recovery(
    handle: Arc<ContextHandle>,
    bulkhead: Arc<Bulkhead>,
    listeners: EventListeners<ReliabilityEvent>,
    config: SelfHealingConfig,
) {
    let mut backoff = config.initial_backoff;

    for attempt in 1..=config.max_attempts {
        listeners.emit(&ReliabilityEvent::RecoveryAttempt {
            context: handle.name.clone(),
            timestamp: Instant::now(),
            attempt,
            backoff,
        });

        tokio::time::sleep(backoff).await;

        bulkhead.recover_compartment(&handle.name).await;

        let probe = handle
            .probe()
            .unwrap_or_else(|| Arc::new(|| Box::pin(async { Ok(()) })));
        let probed = bulkhead
            .execute(&handle.name, || async {
                handle.breaker.execute(|| probe()).await
            })
            .await;

        if probed.is_ok() {
            handle.state.lock().await.mark_recovered();

            #[cfg(feature = "tracing")]
            tracing::info!(context = %handle.name, attempt, "context recovered");
            #[cfg(feature = "metrics")]
            metrics::counter!("reliability_recoveries_total", "context" => handle.name.clone())
                .increment(1);

            listeners.emit(&ReliabilityEvent::RecoverySucceeded {
                context: handle.name.clone(),
                timestamp: Instant::now(),
                attempts: attempt,
            });
            return;
        }

        backoff = (backoff * 2).min(config.max_backoff);
    }

    {
        let mut state = handle.state.lock().await;
        state.healthy = false;
        state.degraded = true;
    }

    #[cfg(feature = "tracing")]
    tracing::error!(
        context = %handle.name,
        attempts = config.max_attempts,
        "recovery exhausted; context permanently degraded"
    );
    #[cfg(feature = "metrics")]
    metrics::counter!("reliability_escalations_total", "context" => handle.name.clone())
        .increment(1);

    listeners.emit(&ReliabilityEvent::RecoveryEscalated {
        context: handle.name.clone(),
        timestamp: Instant::now(),
        attempts: config.max_attempts,
    });
}
