//! Worker-side runtime.
//!
//! A worker is one OS child process of the supervisor. It inherits its
//! listening sockets as numbered environment handles, builds a hybrid event
//! loop and a reliability orchestrator, and dispatches every accepted
//! connection through the application's `Router` (a `tower::Service`) under
//! orchestrator protection. Lifecycle is `starting → ready → draining →
//! dead`: heartbeat lines flow to the supervisor on stdout, TERM/INT begin a
//! drain, and in-flight work gets a grace deadline before the worker gives
//! up and reports it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tower::{Service, ServiceExt};
use vigil_core::protocol::WorkerLine;
use vigil_core::{with_correlation, ConfigError, CorrelationId};
use vigil_eventloop::{EventLoopError, HybridEventLoop};
use vigil_reliability::ReliabilityOrchestrator;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use sockets::inherit_listeners;

mod config;
mod heartbeat;
mod sockets;

use heartbeat::Heartbeat;

/// Boxed error the router may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One accepted connection handed to the router.
pub struct RouterRequest {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub correlation: CorrelationId,
}

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Ready,
    Draining,
    Dead,
}

/// How a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainKind {
    /// TERM: full grace deadline.
    Graceful,
    /// INT: shortened deadline.
    Fast,
}

/// Result of a completed worker run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Drained within the grace deadline.
    Clean,
    /// In-flight work outlived the deadline and was aborted.
    DrainTimeout,
}

impl WorkerOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerOutcome::Clean => 0,
            WorkerOutcome::DrainTimeout => 124,
        }
    }
}

/// Errors surfaced while building or running a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    EventLoop(#[from] EventLoopError),

    #[error("malformed listen fd {value:?} in environment")]
    BadListenFd { value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Control handle usable from outside the run loop (and from tests).
#[derive(Clone)]
pub struct WorkerHandle {
    drain_tx: watch::Sender<Option<DrainKind>>,
    state_rx: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// Requests a graceful drain, as TERM would.
    pub fn drain(&self) {
        let _ = self.drain_tx.send(Some(DrainKind::Graceful));
    }

    /// Requests a fast drain, as INT would.
    pub fn drain_fast(&self) {
        let _ = self.drain_tx.send(Some(DrainKind::Fast));
    }

    pub fn state(&self) -> WorkerState {
        *self.state_rx.borrow()
    }

    /// Waits until the worker reaches `target`.
    pub async fn wait_for(&mut self, target: WorkerState) {
        while *self.state_rx.borrow_and_update() != target {
            if self.state_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// The worker runtime.
pub struct Worker<R> {
    config: WorkerConfig,
    router: R,
    orchestrator: Arc<ReliabilityOrchestrator>,
    event_loop: Arc<HybridEventLoop>,
    state_tx: watch::Sender<WorkerState>,
    drain_tx: watch::Sender<Option<DrainKind>>,
    reload_hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl<R> Worker<R>
where
    R: Service<RouterRequest, Response = (), Error = BoxError> + Clone + Send + 'static,
    R::Future: Send,
{
    pub fn new(config: WorkerConfig, router: R) -> Result<Self, WorkerError> {
        let event_loop = HybridEventLoop::builder()
            .threshold(config.connection_threshold)
            .high_performance_mode(config.high_performance_mode)
            .build()?;

        Ok(Self {
            config,
            router,
            orchestrator: Arc::new(ReliabilityOrchestrator::builder().build()),
            event_loop: Arc::new(event_loop),
            state_tx: watch::channel(WorkerState::Starting).0,
            drain_tx: watch::channel(None).0,
            reload_hook: None,
        })
    }

    /// Shares an externally built orchestrator (e.g. one registered with
    /// observability).
    pub fn with_orchestrator(mut self, orchestrator: Arc<ReliabilityOrchestrator>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    /// Hook invoked on HUP and USR2.
    pub fn with_reload_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.reload_hook = Some(Arc::new(hook));
        self
    }

    /// The hybrid event loop this worker drives.
    pub fn event_loop(&self) -> &Arc<HybridEventLoop> {
        &self.event_loop
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            drain_tx: self.drain_tx.clone(),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Runs the worker over the given listeners until drained.
    ///
    /// Most callers pass [`inherit_listeners`]`()?`; tests bind their own.
    pub async fn run(self, listeners: Vec<TcpListener>) -> Result<WorkerOutcome, WorkerError> {
        let heartbeat = Heartbeat::start();

        let loop_driver = Arc::clone(&self.event_loop);
        let loop_task = tokio::spawn(async move { loop_driver.run().await });

        let heartbeat_tx = heartbeat.sender();
        let heartbeat_id = self.event_loop.repeat(
            self.config.heartbeat_interval,
            Box::new(move || {
                let _ = heartbeat_tx.send(WorkerLine::Heartbeat);
            }),
        );

        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut hup = signal(SignalKind::hangup())?;
        let mut usr2 = signal(SignalKind::user_defined2())?;

        let (conn_tx, mut conn_rx) = mpsc::channel::<(TcpStream, SocketAddr)>(64);
        let mut accept_tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let conn_tx = conn_tx.clone();
            accept_tasks.push(tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok(conn) => {
                            if conn_tx.send(conn).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                        }
                    }
                }
            }));
        }
        drop(conn_tx);

        self.state_tx.send_replace(WorkerState::Ready);
        heartbeat.send(WorkerLine::Ready);
        tracing::info!(
            generation = self.config.generation,
            slot = self.config.slot,
            "worker ready"
        );

        let mut inflight = JoinSet::new();
        let mut drain_rx = self.drain_tx.subscribe();

        let drain_kind = loop {
            tokio::select! {
                // A closed channel (no listeners at all) just disables the arm.
                Some((stream, peer)) = conn_rx.recv() => {
                    self.dispatch(stream, peer, &mut inflight);
                }
                Some(_) = inflight.join_next() => {}
                _ = term.recv() => break DrainKind::Graceful,
                _ = int.recv() => break DrainKind::Fast,
                _ = hup.recv() => self.reload(),
                _ = usr2.recv() => self.reload(),
                changed = drain_rx.changed() => {
                    if changed.is_err() {
                        break DrainKind::Graceful;
                    }
                    if let Some(kind) = *drain_rx.borrow() {
                        break kind;
                    }
                }
            }
        };

        // Drain: refuse new accepts, let in-flight work finish up to grace.
        self.state_tx.send_replace(WorkerState::Draining);
        heartbeat.send(WorkerLine::Draining);
        self.event_loop.cancel(heartbeat_id);
        for task in &accept_tasks {
            task.abort();
        }
        while conn_rx.try_recv().is_ok() {}
        drop(conn_rx);

        let grace = match drain_kind {
            DrainKind::Graceful => self.config.drain_grace,
            DrainKind::Fast => self.config.fast_drain_grace,
        };
        tracing::info!(?drain_kind, ?grace, "worker draining");

        let drained = tokio::time::timeout(grace, async {
            while inflight.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!("drain grace deadline exceeded; aborting in-flight work");
            inflight.abort_all();
        }

        self.event_loop.stop();
        let _ = loop_task.await;
        heartbeat.shutdown().await;
        self.state_tx.send_replace(WorkerState::Dead);

        Ok(if drained {
            WorkerOutcome::Clean
        } else {
            WorkerOutcome::DrainTimeout
        })
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, inflight: &mut JoinSet<()>) {
        self.event_loop.add_connections(1);

        let router = self.router.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let event_loop = Arc::clone(&self.event_loop);
        let context = self.config.context.clone();

        inflight.spawn(async move {
            let correlation = CorrelationId::next();
            let result = with_correlation(correlation, async {
                orchestrator
                    .execute(&context, || {
                        router.oneshot(RouterRequest {
                            stream,
                            peer,
                            correlation,
                        })
                    })
                    .await
            })
            .await;

            if let Err(error) = result {
                tracing::debug!(%error, %peer, "connection dispatch failed");
            }
            event_loop.remove_connections(1);
        });
    }

    fn reload(&self) {
        tracing::info!("reload requested");
        if let Some(hook) = &self.reload_hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tower::service_fn;

    fn echo_router(
    ) -> impl Service<RouterRequest, Response = (), Error = BoxError, Future: Send> + Clone + Send + 'static
    {
        service_fn(|mut req: RouterRequest| async move {
            use tokio::io::AsyncWriteExt;
            req.stream.write_all(b"hi").await?;
            Ok(())
        })
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig::builder()
            .heartbeat_interval(Duration::from_millis(50))
            .drain_grace(Duration::from_millis(500))
            .build()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serves_connections_then_drains_clean() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let worker = Worker::new(test_config(), echo_router()).unwrap();
        let mut handle = worker.handle();
        let run = tokio::spawn(worker.run(vec![listener]));

        handle.wait_for(WorkerState::Ready).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");

        handle.drain();
        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, WorkerOutcome::Clean);
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(handle.state(), WorkerState::Dead);

        // The listener is gone; nothing accepts here any more.
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_inflight_work_trips_the_grace_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let slow_router = service_fn(|_req: RouterRequest| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), BoxError>(())
        });

        let config = WorkerConfig::builder()
            .heartbeat_interval(Duration::from_millis(50))
            .drain_grace(Duration::from_millis(100))
            .build();
        let worker = Worker::new(config, slow_router).unwrap();
        let mut handle = worker.handle();
        let run = tokio::spawn(worker.run(vec![listener]));

        handle.wait_for(WorkerState::Ready).await;
        let _client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        handle.drain();
        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, WorkerOutcome::DrainTimeout);
        assert_eq!(outcome.exit_code(), 124);
    }
}
