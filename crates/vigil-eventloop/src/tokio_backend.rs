//! Accelerated backend: tokio timer wheel and edge-notified fd readiness.
//!
//! Timers sleep exactly to the earliest deadline on the tokio wheel and fd
//! watches ride [`AsyncFd`] reactor notifications, so an idle loop takes no
//! wakeups at all. Requires a tokio runtime; fd callbacks should consume
//! readiness (read/write until `WouldBlock`) before returning.

use crate::sched::{DueTimer, SchedCore};
use crate::{BackendKind, Callback, EventLoopError, IoInterest, LoopBackend, TaskId};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::Notify;

/// Borrowed fd handle registered with the reactor. The loop never owns the
/// fd and never closes it.
struct WatchedFd(RawFd);

impl AsRawFd for WatchedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

struct IoTable {
    watches: Vec<(TaskId, Arc<AsyncFd<WatchedFd>>, IoInterest)>,
    cbs: HashMap<TaskId, Callback>,
    tombstones: HashSet<TaskId>,
}

/// The "accelerated" event loop backend.
pub struct TokioBackend {
    sched: Mutex<SchedCore>,
    io: Mutex<IoTable>,
    notify: Notify,
    running: AtomicBool,
}

impl TokioBackend {
    pub fn new() -> Self {
        Self {
            sched: Mutex::new(SchedCore::new()),
            io: Mutex::new(IoTable {
                watches: Vec::new(),
                cbs: HashMap::new(),
                tombstones: HashSet::new(),
            }),
            notify: Notify::new(),
            running: AtomicBool::new(false),
        }
    }

    fn sched(&self) -> std::sync::MutexGuard<'_, SchedCore> {
        self.sched.lock().expect("scheduler poisoned")
    }

    fn io(&self) -> std::sync::MutexGuard<'_, IoTable> {
        self.io.lock().expect("io table poisoned")
    }

    fn add_watch(
        &self,
        fd: RawFd,
        interest: IoInterest,
        cb: Callback,
    ) -> Result<TaskId, EventLoopError> {
        let tokio_interest = match interest {
            IoInterest::Read => Interest::READABLE,
            IoInterest::Write => Interest::WRITABLE,
        };
        let afd = AsyncFd::with_interest(WatchedFd(fd), tokio_interest)?;

        let id = TaskId::next();
        let mut io = self.io();
        io.watches.push((id, Arc::new(afd), interest));
        io.cbs.insert(id, cb);
        drop(io);
        self.notify.notify_one();
        Ok(id)
    }

    fn fire_io(&self, id: TaskId) {
        let cb = self.io().cbs.remove(&id);
        if let Some(mut cb) = cb {
            cb();
            let mut io = self.io();
            if io.tombstones.remove(&id) || !io.watches.iter().any(|(wid, _, _)| *wid == id) {
                return;
            }
            io.cbs.insert(id, cb);
        }
    }

    async fn run_inner(&self) -> Result<(), EventLoopError> {
        self.running.store(true, Ordering::Release);

        while self.running.load(Ordering::Acquire) {
            let mut did_work = false;

            for (_, mut cb) in self.sched().take_defers() {
                cb();
                did_work = true;
            }

            let due = self.sched().take_due(Instant::now());
            for DueTimer { id, mut cb, period } in due {
                cb();
                did_work = true;
                if let Some(period) = period {
                    self.sched().rearm(id, period, cb);
                }
            }

            if did_work {
                continue;
            }

            let next_deadline = self.sched().next_deadline();
            let watchers: Vec<(TaskId, Arc<AsyncFd<WatchedFd>>, IoInterest)> = {
                let io = self.io();
                io.watches
                    .iter()
                    .map(|(id, afd, interest)| (*id, Arc::clone(afd), *interest))
                    .collect()
            };

            let io_ready = async {
                if watchers.is_empty() {
                    return futures::future::pending::<Option<TaskId>>().await;
                }
                let readiness: Vec<BoxFuture<'static, Option<TaskId>>> = watchers
                    .into_iter()
                    .map(|(id, afd, interest)| {
                        let tokio_interest = match interest {
                            IoInterest::Read => Interest::READABLE,
                            IoInterest::Write => Interest::WRITABLE,
                        };
                        Box::pin(async move {
                            match afd.ready(tokio_interest).await {
                                Ok(mut guard) => {
                                    guard.clear_ready();
                                    Some(id)
                                }
                                Err(_) => None,
                            }
                        }) as BoxFuture<'static, Option<TaskId>>
                    })
                    .collect();
                let (ready, _, _) = futures::future::select_all(readiness).await;
                ready
            };

            let timer_wait = async {
                match next_deadline {
                    Some(deadline) => {
                        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                    }
                    None => futures::future::pending().await,
                }
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                ready = io_ready => {
                    if let Some(id) = ready {
                        self.fire_io(id);
                    }
                }
                _ = timer_wait => {}
            }
        }

        Ok(())
    }
}

impl Default for TokioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBackend for TokioBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Accelerated
    }

    fn delay(&self, after: Duration, cb: Callback) -> TaskId {
        let id = self.sched().add_timer(after, None, cb);
        self.notify.notify_one();
        id
    }

    fn repeat(&self, every: Duration, cb: Callback) -> TaskId {
        let id = self.sched().add_timer(every, Some(every), cb);
        self.notify.notify_one();
        id
    }

    fn defer(&self, cb: Callback) -> TaskId {
        let id = self.sched().add_defer(cb);
        self.notify.notify_one();
        id
    }

    fn on_readable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError> {
        self.add_watch(fd, IoInterest::Read, cb)
    }

    fn on_writable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError> {
        self.add_watch(fd, IoInterest::Write, cb)
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut io = self.io();
        let watched = io.watches.iter().any(|(wid, _, _)| *wid == id);
        if watched {
            io.watches.retain(|(wid, _, _)| *wid != id);
            if io.cbs.remove(&id).is_none() {
                io.tombstones.insert(id);
            }
            self.notify.notify_one();
            return true;
        }
        drop(io);
        self.sched().cancel(id)
    }

    fn run(&self) -> BoxFuture<'_, Result<(), EventLoopError>> {
        Box::pin(self.run_inner())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.notify.notify_one();
    }
}
