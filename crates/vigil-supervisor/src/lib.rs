//! Process supervisor: spawn, monitor, scale and deploy a worker fleet.
//!
//! The supervisor pre-binds the listening sockets, forks N workers that
//! inherit them, and then sits in a single monitor loop: reaping child exits,
//! timestamping heartbeat lines from the worker pipes, replacing crashed or
//! silent workers with exponential back-off, and aborting the fleet when it
//! crash-loops. Deployments swap the fleet to a new generation without
//! dropping the shared sockets: `blue_green` brings a parallel fleet up
//! first, `rolling` replaces one worker at a time, and `socket_handoff`
//! passes the sockets to a new executable image.
//!
//! ```no_run
//! use vigil_supervisor::{Supervisor, WorkerCommand};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let supervisor = Supervisor::builder()
//!     .worker_count(4)
//!     .bind("0.0.0.0:8080".parse()?)
//!     .worker_command(WorkerCommand::current_exe()?)
//!     .build()?;
//!
//! let handle = supervisor.handle();
//! let outcome = supervisor.run().await?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use vigil_core::protocol::WorkerLine;
use vigil_core::DeploymentStrategy;

pub use config::{SupervisorConfig, SupervisorConfigBuilder, WorkerCommand};
pub use error::{SupervisorError, SupervisorOutcome};
pub use events::SupervisorEvent;
pub use record::{SupervisorStats, WorkerProcState, WorkerRecord, WorkerStat};

mod config;
mod error;
mod events;
mod record;
mod spawn;

type WorkerId = u64;

struct Shared {
    workers: BTreeMap<WorkerId, WorkerRecord>,
    generation: u64,
}

impl Shared {
    fn state_of(&self, id: WorkerId) -> Option<WorkerProcState> {
        self.workers.get(&id).map(|w| w.state)
    }
}

enum Control {
    Scale(usize),
    Deploy {
        strategy: DeploymentStrategy,
        image: Option<PathBuf>,
    },
    Respawn {
        slot: u32,
        restarts: u32,
    },
    Stop {
        fast: bool,
    },
}

enum Flow {
    Continue,
    Abort,
}

/// Control handle usable while [`Supervisor::run`] owns the monitor loop.
#[derive(Clone)]
pub struct SupervisorHandle {
    ctrl: mpsc::Sender<Control>,
    shared: Arc<RwLock<Shared>>,
    worker_count: usize,
    strategy: DeploymentStrategy,
}

impl SupervisorHandle {
    /// Observable fleet statistics.
    pub fn stats(&self) -> SupervisorStats {
        let shared = self.shared.read().expect("supervisor state poisoned");
        let workers: Vec<WorkerStat> = shared
            .workers
            .values()
            .map(|w| WorkerStat {
                pid: w.pid,
                state: w.state,
                generation: w.generation,
                uptime: w.spawned_at.elapsed(),
                restarts: w.restarts,
            })
            .collect();

        SupervisorStats {
            worker_count: self.worker_count,
            running: workers
                .iter()
                .filter(|w| w.state != WorkerProcState::Dead)
                .count(),
            workers,
            memory_usage: vigil_core::memory::resident_bytes(),
            deployment_strategy: self.strategy.as_str(),
            zero_downtime_enabled: true,
        }
    }

    /// Current deployment generation.
    pub fn generation(&self) -> u64 {
        self.shared
            .read()
            .expect("supervisor state poisoned")
            .generation
    }

    /// Resizes the fleet one worker at a time.
    pub async fn scale_workers(&self, target: usize) {
        let _ = self.ctrl.send(Control::Scale(target)).await;
    }

    /// Starts a deployment with the given strategy.
    pub async fn deploy(&self, strategy: DeploymentStrategy) {
        let _ = self
            .ctrl
            .send(Control::Deploy {
                strategy,
                image: None,
            })
            .await;
    }

    /// Socket-handoff deployment to a new executable image.
    pub async fn deploy_image(&self, image: PathBuf) {
        let _ = self
            .ctrl
            .send(Control::Deploy {
                strategy: DeploymentStrategy::SocketHandoff,
                image: Some(image),
            })
            .await;
    }

    /// Begins a graceful fleet shutdown, as TERM would.
    pub async fn shutdown(&self) {
        let _ = self.ctrl.send(Control::Stop { fast: false }).await;
    }
}

/// The parent process owning the worker fleet.
pub struct Supervisor {
    config: SupervisorConfig,
    listeners: Vec<std::net::TcpListener>,
    shared: Arc<RwLock<Shared>>,
    waits: JoinSet<(WorkerId, Option<i32>)>,
    msg_tx: mpsc::UnboundedSender<(WorkerId, String)>,
    msg_rx: mpsc::UnboundedReceiver<(WorkerId, String)>,
    ctrl_tx: mpsc::Sender<Control>,
    ctrl_rx: mpsc::Receiver<Control>,
    next_worker_id: WorkerId,
    restart_log: VecDeque<Instant>,
    deploying: bool,
}

impl Supervisor {
    /// Returns a builder with the default fleet policy.
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::new()
    }

    pub(crate) fn new(config: SupervisorConfig) -> std::io::Result<Self> {
        let listeners = spawn::bind_listeners(&config.bind_addrs)?;
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (ctrl_tx, ctrl_rx) = mpsc::channel(16);

        Ok(Self {
            config,
            listeners,
            shared: Arc::new(RwLock::new(Shared {
                workers: BTreeMap::new(),
                generation: 0,
            })),
            waits: JoinSet::new(),
            msg_tx,
            msg_rx,
            ctrl_tx,
            ctrl_rx,
            next_worker_id: 1,
            restart_log: VecDeque::new(),
            deploying: false,
        })
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            ctrl: self.ctrl_tx.clone(),
            shared: Arc::clone(&self.shared),
            worker_count: self.config.worker_count,
            strategy: self.config.strategy,
        }
    }

    fn listen_fds(&self) -> Vec<RawFd> {
        self.listeners.iter().map(|l| l.as_raw_fd()).collect()
    }

    fn shared_mut(&self) -> std::sync::RwLockWriteGuard<'_, Shared> {
        self.shared.write().expect("supervisor state poisoned")
    }

    fn shared_read(&self) -> std::sync::RwLockReadGuard<'_, Shared> {
        self.shared.read().expect("supervisor state poisoned")
    }

    fn emit(&self, event: SupervisorEvent) {
        self.config.event_listeners.emit(&event);
    }

    fn spawn_slot(
        &mut self,
        slot: u32,
        generation: u64,
        restarts: u32,
    ) -> Result<WorkerId, SupervisorError> {
        let listen_fds = self.listen_fds();
        let mut child = spawn::spawn_worker(&self.config, &listen_fds, slot, generation)
            .map_err(|source| SupervisorError::SpawnFailed { slot, source })?;
        let pid = child.id().unwrap_or_default();

        let id = self.next_worker_id;
        self.next_worker_id += 1;

        if let Some(stdout) = child.stdout.take() {
            let msg_tx = self.msg_tx.clone();
            tokio::spawn(async move {
                let mut lines = tokio::io::BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if msg_tx.send((id, line)).is_err() {
                        break;
                    }
                }
            });
        }

        self.waits.spawn(async move {
            let code = child.wait().await.ok().and_then(|status| status.code());
            (id, code)
        });

        let now = Instant::now();
        self.shared_mut().workers.insert(
            id,
            WorkerRecord {
                slot,
                pid,
                spawned_at: now,
                state: WorkerProcState::Starting,
                last_heartbeat: now,
                generation,
                listen_fds,
                restarts,
            },
        );

        tracing::info!(slot, pid, generation, "worker spawned");
        self.emit(SupervisorEvent::WorkerSpawned {
            timestamp: now,
            slot,
            pid,
            generation,
        });
        Ok(id)
    }

    fn handle_line(&mut self, id: WorkerId, line: &str) {
        let Ok(parsed) = line.parse::<WorkerLine>() else {
            return;
        };

        let mut shared = self.shared_mut();
        let Some(record) = shared.workers.get_mut(&id) else {
            return;
        };
        match parsed {
            WorkerLine::Ready => {
                record.state = WorkerProcState::Ready;
                record.last_heartbeat = Instant::now();
                let (slot, pid) = (record.slot, record.pid);
                drop(shared);
                tracing::debug!(slot, pid, "worker ready");
                self.emit(SupervisorEvent::WorkerReady {
                    timestamp: Instant::now(),
                    slot,
                    pid,
                });
            }
            WorkerLine::Heartbeat => {
                record.last_heartbeat = Instant::now();
            }
            WorkerLine::Draining => {
                record.state = WorkerProcState::Draining;
            }
        }
    }

    /// Handles one reaped child. Restarts unexpected exits with back-off and
    /// detects crash loops.
    fn note_exit(&mut self, id: WorkerId, code: Option<i32>) -> Flow {
        let record = {
            let mut shared = self.shared_mut();
            shared.workers.remove(&id)
        };
        let Some(record) = record else {
            return Flow::Continue;
        };

        tracing::info!(slot = record.slot, pid = record.pid, ?code, "worker exited");
        self.emit(SupervisorEvent::WorkerExited {
            timestamp: Instant::now(),
            slot: record.slot,
            pid: record.pid,
            code,
        });

        let expected = record.state == WorkerProcState::Draining || self.deploying;
        let clean = code == Some(0);
        if expected || clean {
            return Flow::Continue;
        }

        // Unexpected exit: crash-loop accounting, then a delayed respawn.
        let now = Instant::now();
        self.restart_log.push_back(now);
        let window = self.config.crash_loop_window;
        while let Some(first) = self.restart_log.front() {
            if now.duration_since(*first) > window {
                self.restart_log.pop_front();
            } else {
                break;
            }
        }
        if self.restart_log.len() as u32 >= self.config.crash_loop_limit {
            tracing::error!(
                restarts = self.restart_log.len(),
                window_secs = window.as_secs(),
                "crash loop detected; aborting fleet"
            );
            self.emit(SupervisorEvent::CrashLoop {
                timestamp: now,
                restarts_in_window: self.restart_log.len() as u32,
            });
            return Flow::Abort;
        }

        let restarts = record.restarts + 1;
        let backoff = restart_backoff(
            self.config.restart_backoff,
            self.config.restart_backoff_cap,
            record.restarts,
        );
        tracing::warn!(
            slot = record.slot,
            restarts,
            ?backoff,
            "worker exited unexpectedly; restart scheduled"
        );
        self.emit(SupervisorEvent::WorkerRestarted {
            timestamp: now,
            slot: record.slot,
            restarts,
        });

        let ctrl = self.ctrl_tx.clone();
        let slot = record.slot;
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let _ = ctrl.send(Control::Respawn { slot, restarts }).await;
        });

        Flow::Continue
    }

    /// Kills workers whose heartbeat went silent beyond the liveness window.
    fn check_liveness(&mut self) {
        let threshold = self.config.heartbeat_interval * self.config.liveness_factor;
        let silent: Vec<(u32, u32)> = self
            .shared_read()
            .workers
            .values()
            .filter(|w| {
                matches!(
                    w.state,
                    WorkerProcState::Starting | WorkerProcState::Ready
                ) && w.last_heartbeat.elapsed() > threshold
            })
            .map(|w| (w.slot, w.pid))
            .collect();

        for (slot, pid) in silent {
            tracing::warn!(slot, pid, "worker heartbeat lost; killing");
            self.emit(SupervisorEvent::HeartbeatLost {
                timestamp: Instant::now(),
                slot,
                pid,
            });
            spawn::send_kill(pid);
        }
    }

    fn scale_to(&mut self, target: usize) -> Result<(), SupervisorError> {
        let generation = self.shared_read().generation;
        loop {
            let (alive, highest): (usize, Option<(u32, u32)>) = {
                let shared = self.shared_read();
                let alive = shared
                    .workers
                    .values()
                    .filter(|w| w.state != WorkerProcState::Draining)
                    .count();
                let highest = shared
                    .workers
                    .values()
                    .filter(|w| w.state != WorkerProcState::Draining)
                    .max_by_key(|w| w.slot)
                    .map(|w| (w.slot, w.pid));
                (alive, highest)
            };

            if alive < target {
                let slot = self.free_slot();
                self.spawn_slot(slot, generation, 0)?;
            } else if alive > target {
                if let Some((slot, pid)) = highest {
                    let mut shared = self.shared_mut();
                    if let Some(record) =
                        shared.workers.values_mut().find(|w| w.slot == slot && w.pid == pid)
                    {
                        record.state = WorkerProcState::Draining;
                    }
                    drop(shared);
                    spawn::send_term(pid);
                }
            } else {
                return Ok(());
            }
        }
    }

    fn free_slot(&self) -> u32 {
        let shared = self.shared_read();
        let mut slot = 0;
        while shared
            .workers
            .values()
            .any(|w| w.slot == slot && w.state != WorkerProcState::Draining)
        {
            slot += 1;
        }
        slot
    }

    /// Drives exits and heartbeat lines until `pred` holds or `timeout`
    /// elapses.
    async fn drive_until<F>(&mut self, pred: F, timeout: Duration) -> bool
    where
        F: Fn(&Shared) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(&self.shared_read()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::select! {
                Some(joined) = self.waits.join_next() => {
                    if let Ok((id, code)) = joined {
                        let _ = self.note_exit(id, code);
                    }
                }
                Some((id, line)) = self.msg_rx.recv() => self.handle_line(id, &line),
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
            }
        }
    }

    async fn deploy(
        &mut self,
        strategy: DeploymentStrategy,
        image: Option<PathBuf>,
    ) -> Result<(), SupervisorError> {
        let new_generation = {
            let mut shared = self.shared_mut();
            shared.generation += 1;
            shared.generation
        };

        tracing::info!(strategy = strategy.as_str(), new_generation, "deployment started");
        self.emit(SupervisorEvent::DeploymentStarted {
            timestamp: Instant::now(),
            strategy,
            generation: new_generation,
        });

        if let Some(image) = image {
            // Socket handoff to a new executable image: subsequent spawns run
            // it, inheriting the same listening sockets.
            self.config.worker_command.program = image;
        }

        let old: Vec<(WorkerId, u32, u32)> = self
            .shared_read()
            .workers
            .iter()
            .filter(|(_, w)| w.generation < new_generation && w.state != WorkerProcState::Dead)
            .map(|(id, w)| (*id, w.slot, w.pid))
            .collect();

        self.deploying = true;
        let result = match strategy {
            DeploymentStrategy::Rolling => self.deploy_rolling(&old, new_generation).await,
            DeploymentStrategy::BlueGreen | DeploymentStrategy::SocketHandoff => {
                self.deploy_blue_green(&old, new_generation).await
            }
        };
        self.deploying = false;
        result?;

        tracing::info!(new_generation, "deployment finished");
        self.emit(SupervisorEvent::DeploymentFinished {
            timestamp: Instant::now(),
            generation: new_generation,
        });
        Ok(())
    }

    /// Replace one worker at a time: spawn, await ready, drain the old one.
    async fn deploy_rolling(
        &mut self,
        old: &[(WorkerId, u32, u32)],
        generation: u64,
    ) -> Result<(), SupervisorError> {
        for &(old_id, slot, old_pid) in old {
            let new_id = self.spawn_slot(slot, generation, 0)?;

            let ready = self
                .drive_until(
                    |shared| shared.state_of(new_id) == Some(WorkerProcState::Ready),
                    self.config.ready_timeout,
                )
                .await;
            if !ready {
                tracing::error!(slot, "replacement never became ready; keeping old worker");
                if let Some(record) = self.shared_mut().workers.remove(&new_id) {
                    spawn::send_kill(record.pid);
                }
                return Ok(());
            }

            if let Some(record) = self.shared_mut().workers.get_mut(&old_id) {
                record.state = WorkerProcState::Draining;
            }
            spawn::send_term(old_pid);

            let gone = self
                .drive_until(
                    |shared| !shared.workers.contains_key(&old_id),
                    self.config.shutdown_grace,
                )
                .await;
            if !gone {
                spawn::send_kill(old_pid);
                self.drive_until(
                    |shared| !shared.workers.contains_key(&old_id),
                    Duration::from_secs(1),
                )
                .await;
            }
        }
        Ok(())
    }

    /// Bring the whole new generation up, then drain the old fleet.
    async fn deploy_blue_green(
        &mut self,
        old: &[(WorkerId, u32, u32)],
        generation: u64,
    ) -> Result<(), SupervisorError> {
        let mut new_ids = Vec::with_capacity(old.len().max(self.config.worker_count));
        let slots: Vec<u32> = if old.is_empty() {
            (0..self.config.worker_count as u32).collect()
        } else {
            old.iter().map(|&(_, slot, _)| slot).collect()
        };
        for slot in slots {
            new_ids.push(self.spawn_slot(slot, generation, 0)?);
        }

        let all_ready = self
            .drive_until(
                |shared| {
                    new_ids
                        .iter()
                        .all(|id| shared.state_of(*id) == Some(WorkerProcState::Ready))
                },
                self.config.ready_timeout,
            )
            .await;
        if !all_ready {
            tracing::error!("new fleet never became ready; rolling back");
            for id in new_ids {
                if let Some(record) = self.shared_mut().workers.remove(&id) {
                    spawn::send_kill(record.pid);
                }
            }
            return Ok(());
        }

        for &(old_id, _, old_pid) in old {
            if let Some(record) = self.shared_mut().workers.get_mut(&old_id) {
                record.state = WorkerProcState::Draining;
            }
            spawn::send_term(old_pid);
        }
        let drained = self
            .drive_until(
                |shared| old.iter().all(|(id, _, _)| !shared.workers.contains_key(id)),
                self.config.shutdown_grace,
            )
            .await;
        if !drained {
            for &(_, _, old_pid) in old {
                spawn::send_kill(old_pid);
            }
        }
        Ok(())
    }

    /// TERM everything, await drain up to grace, then escalate to KILL.
    async fn graceful_stop(&mut self, fast: bool) -> SupervisorOutcome {
        self.deploying = true; // suppress restarts while stopping

        let pids: Vec<u32> = {
            let mut shared = self.shared_mut();
            shared
                .workers
                .values_mut()
                .map(|record| {
                    record.state = WorkerProcState::Draining;
                    record.pid
                })
                .collect()
        };
        for pid in &pids {
            spawn::send_term(*pid);
        }

        let grace = if fast {
            self.config.fast_shutdown_grace
        } else {
            self.config.shutdown_grace
        };
        let drained = self
            .drive_until(|shared| shared.workers.is_empty(), grace)
            .await;

        if !drained {
            tracing::warn!("grace deadline exceeded; force-killing remaining workers");
            let leftovers: Vec<u32> = self
                .shared_read()
                .workers
                .values()
                .map(|w| w.pid)
                .collect();
            for pid in leftovers {
                spawn::send_kill(pid);
            }
            self.drive_until(|shared| shared.workers.is_empty(), Duration::from_secs(1))
                .await;
        }

        self.emit(SupervisorEvent::FleetStopped {
            timestamp: Instant::now(),
        });
        if drained {
            SupervisorOutcome::Clean
        } else {
            SupervisorOutcome::GraceExceeded
        }
    }

    async fn abort_fleet(&mut self) {
        self.deploying = true;
        let pids: Vec<u32> = self.shared_read().workers.values().map(|w| w.pid).collect();
        for pid in pids {
            spawn::send_kill(pid);
        }
        self.drive_until(|shared| shared.workers.is_empty(), Duration::from_secs(1))
            .await;
        self.emit(SupervisorEvent::FleetStopped {
            timestamp: Instant::now(),
        });
    }

    /// Spawns the fleet and runs the monitor loop until shutdown or abort.
    ///
    /// Returns the outcome to map to the process exit code; an `Err` means an
    /// unrecoverable startup failure (exit code 1).
    pub async fn run(mut self) -> Result<SupervisorOutcome, SupervisorError> {
        self.shared_mut().generation = 1;
        for slot in 0..self.config.worker_count as u32 {
            self.spawn_slot(slot, 1, 0)?;
        }

        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;
        let mut hup = signal(SignalKind::hangup())?;
        let mut usr2 = signal(SignalKind::user_defined2())?;
        let mut liveness = tokio::time::interval(self.config.heartbeat_interval);
        liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(joined) = self.waits.join_next() => {
                    if let Ok((id, code)) = joined {
                        if let Flow::Abort = self.note_exit(id, code) {
                            self.abort_fleet().await;
                            return Ok(SupervisorOutcome::CrashLoopAbort);
                        }
                    }
                }
                Some((id, line)) = self.msg_rx.recv() => self.handle_line(id, &line),
                _ = liveness.tick() => self.check_liveness(),
                Some(ctrl) = self.ctrl_rx.recv() => match ctrl {
                    Control::Scale(target) => self.scale_to(target)?,
                    Control::Deploy { strategy, image } => self.deploy(strategy, image).await?,
                    Control::Respawn { slot, restarts } => {
                        let generation = self.shared_read().generation;
                        self.spawn_slot(slot, generation, restarts)?;
                    }
                    Control::Stop { fast } => return Ok(self.graceful_stop(fast).await),
                },
                _ = term.recv() => return Ok(self.graceful_stop(false).await),
                _ = int.recv() => return Ok(self.graceful_stop(true).await),
                _ = usr2.recv() => {
                    let strategy = self.config.strategy;
                    self.deploy(strategy, None).await?;
                }
                _ = hup.recv() => {
                    tracing::info!("configuration reload requested");
                }
            }
        }
    }
}

fn restart_backoff(base: Duration, cap: Duration, prior_restarts: u32) -> Duration {
    let factor = 2u32.saturating_pow(prior_restarts.min(16));
    base.saturating_mul(factor).min(cap)
}
