//! Primary backend: portable tick-driven scheduler.
//!
//! A single task drains the defer queue, fires due timers from the heap, and
//! scans fd readiness with a zero-timeout `poll(2)` on a coarse tick. No
//! per-registration tasks, no reactor integration; the cost is one wakeup per
//! tick while fd watches exist.

use crate::sched::{DueTimer, SchedCore};
use crate::{BackendKind, Callback, EventLoopError, IoInterest, LoopBackend, TaskId};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct IoTable {
    watches: Vec<(TaskId, RawFd, IoInterest)>,
    cbs: HashMap<TaskId, Callback>,
    tombstones: HashSet<TaskId>,
}

/// The "primary" event loop backend.
pub struct PollBackend {
    sched: Mutex<SchedCore>,
    io: Mutex<IoTable>,
    notify: Notify,
    running: AtomicBool,
    poll_tick: Duration,
}

impl PollBackend {
    pub fn new() -> Self {
        Self::with_tick(Duration::from_millis(1))
    }

    /// `tick` bounds how stale an fd readiness observation can be.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            sched: Mutex::new(SchedCore::new()),
            io: Mutex::new(IoTable {
                watches: Vec::new(),
                cbs: HashMap::new(),
                tombstones: HashSet::new(),
            }),
            notify: Notify::new(),
            running: AtomicBool::new(false),
            poll_tick: tick,
        }
    }

    fn sched(&self) -> std::sync::MutexGuard<'_, SchedCore> {
        self.sched.lock().expect("scheduler poisoned")
    }

    fn io(&self) -> std::sync::MutexGuard<'_, IoTable> {
        self.io.lock().expect("io table poisoned")
    }

    fn add_watch(&self, fd: RawFd, interest: IoInterest, cb: Callback) -> TaskId {
        let id = TaskId::next();
        let mut io = self.io();
        io.watches.push((id, fd, interest));
        io.cbs.insert(id, cb);
        drop(io);
        self.notify.notify_one();
        id
    }

    /// Scans watched fds without blocking; fires ready callbacks.
    fn poll_io(&self) -> bool {
        let (mut pollfds, ids): (Vec<libc::pollfd>, Vec<TaskId>) = {
            let io = self.io();
            if io.watches.is_empty() {
                return false;
            }
            io.watches
                .iter()
                .map(|(id, fd, interest)| {
                    let events = match interest {
                        IoInterest::Read => libc::POLLIN,
                        IoInterest::Write => libc::POLLOUT,
                    };
                    (
                        libc::pollfd {
                            fd: *fd,
                            events,
                            revents: 0,
                        },
                        *id,
                    )
                })
                .unzip()
        };

        let ready =
            unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, 0) };
        if ready <= 0 {
            return false;
        }

        let mut fired = false;
        for (pollfd, id) in pollfds.iter().zip(ids) {
            if pollfd.revents & (pollfd.events | libc::POLLERR | libc::POLLHUP) == 0 {
                continue;
            }
            let cb = self.io().cbs.remove(&id);
            if let Some(mut cb) = cb {
                cb();
                fired = true;
                let mut io = self.io();
                // Watches stay level-triggered until cancelled; a cancel from
                // within the callback must win.
                if io.tombstones.remove(&id) || !io.watches.iter().any(|(wid, _, _)| *wid == id) {
                    continue;
                }
                io.cbs.insert(id, cb);
            }
        }
        fired
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

            did_work |= self.poll_io();

            if did_work {
                continue;
            }

            let next_deadline = self.sched().next_deadline();
            let watching_io = !self.io().watches.is_empty();
            let wait = match (next_deadline, watching_io) {
                (Some(deadline), true) => {
                    Some((deadline.saturating_duration_since(Instant::now())).min(self.poll_tick))
                }
                (Some(deadline), false) => {
                    Some(deadline.saturating_duration_since(Instant::now()))
                }
                (None, true) => Some(self.poll_tick),
                (None, false) => None,
            };

            match wait {
                Some(duration) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep(duration) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }

        Ok(())
    }
}

impl Default for PollBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopBackend for PollBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Primary
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
        Ok(self.add_watch(fd, IoInterest::Read, cb))
    }

    fn on_writable(&self, fd: RawFd, cb: Callback) -> Result<TaskId, EventLoopError> {
        Ok(self.add_watch(fd, IoInterest::Write, cb))
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut io = self.io();
        let watched = io.watches.iter().any(|(wid, _, _)| *wid == id);
        if watched {
            io.watches.retain(|(wid, _, _)| *wid != id);
            if io.cbs.remove(&id).is_none() {
                // The callback is out being fired; stop it from re-arming.
                io.tombstones.insert(id);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    async fn with_running<T>(
        backend: Arc<PollBackend>,
        f: impl std::future::Future<Output = T>,
    ) -> T {
        let driver = Arc::clone(&backend);
        let handle = tokio::spawn(async move { driver.run().await });
        let out = f.await;
        backend.stop();
        handle.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn defers_run_fifo() {
        let backend = Arc::new(PollBackend::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            backend.defer(Box::new(move || order.lock().unwrap().push(n)));
        }

        with_running(Arc::clone(&backend), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
        })
        .await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn delays_fire_in_deadline_order() {
        let backend = Arc::new(PollBackend::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let slow = Arc::clone(&order);
        backend.delay(Duration::from_millis(40), Box::new(move || slow.lock().unwrap().push("slow")));
        let fast = Arc::clone(&order);
        backend.delay(Duration::from_millis(10), Box::new(move || fast.lock().unwrap().push("fast")));

        with_running(Arc::clone(&backend), async {
            tokio::time::sleep(Duration::from_millis(80)).await;
        })
        .await;

        assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn repeat_fires_until_cancelled() {
        let backend = Arc::new(PollBackend::new());
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let id = backend.repeat(
            Duration::from_millis(10),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        with_running(Arc::clone(&backend), async {
            tokio::time::sleep(Duration::from_millis(55)).await;
            assert!(backend.cancel(id));
            assert!(!backend.cancel(id));
            let at_cancel = count.load(Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert_eq!(count.load(Ordering::SeqCst), at_cancel);
        })
        .await;

        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn readable_watch_fires_on_data() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let backend = Arc::new(PollBackend::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        use std::os::unix::io::AsRawFd;
        let hits_clone = Arc::clone(&hits);
        backend
            .on_readable(
                server.as_raw_fd(),
                Box::new(move || {
                    hits_clone.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        with_running(Arc::clone(&backend), async {
            client.write_all(b"ping").await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        })
        .await;

        assert!(hits.load(Ordering::SeqCst) >= 1);
        drop(server);
    }
}
