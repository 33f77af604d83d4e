//! Timer heap and defer queue shared by both backends.

use crate::{Callback, TaskId};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Heap entry. Ordered by deadline, ties broken by registration sequence so
/// simultaneous timers fire in registration order.
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    id: TaskId,
    period: Option<Duration>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert so the earliest deadline pops first.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A timer that is due, taken out of the core for firing.
pub(crate) struct DueTimer {
    pub id: TaskId,
    pub cb: Callback,
    pub period: Option<Duration>,
}

pub(crate) struct SchedCore {
    timers: BinaryHeap<TimerEntry>,
    timer_cbs: HashMap<TaskId, Callback>,
    defers: VecDeque<TaskId>,
    defer_cbs: HashMap<TaskId, Callback>,
    /// Ids cancelled while their callback was out being fired.
    tombstones: HashSet<TaskId>,
    seq: u64,
}

impl SchedCore {
    pub fn new() -> Self {
        Self {
            timers: BinaryHeap::new(),
            timer_cbs: HashMap::new(),
            defers: VecDeque::new(),
            defer_cbs: HashMap::new(),
            tombstones: HashSet::new(),
            seq: 0,
        }
    }

    pub fn add_timer(&mut self, after: Duration, period: Option<Duration>, cb: Callback) -> TaskId {
        let id = TaskId::next();
        self.seq += 1;
        self.timers.push(TimerEntry {
            deadline: Instant::now() + after,
            seq: self.seq,
            id,
            period,
        });
        self.timer_cbs.insert(id, cb);
        id
    }

    pub fn add_defer(&mut self, cb: Callback) -> TaskId {
        let id = TaskId::next();
        self.defers.push_back(id);
        self.defer_cbs.insert(id, cb);
        id
    }

    /// Removes a registration. Idempotent.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if self.timer_cbs.remove(&id).is_some() {
            return true;
        }
        if self.defer_cbs.remove(&id).is_some() {
            self.defers.retain(|queued| *queued != id);
            return true;
        }
        // The callback may be out being fired; make sure it never re-arms.
        self.tombstones.insert(id);
        false
    }

    /// Takes every pending defer in FIFO order.
    pub fn take_defers(&mut self) -> Vec<(TaskId, Callback)> {
        let mut out = Vec::with_capacity(self.defers.len());
        while let Some(id) = self.defers.pop_front() {
            if let Some(cb) = self.defer_cbs.remove(&id) {
                out.push((id, cb));
            }
        }
        out
    }

    /// Takes every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<DueTimer> {
        let mut due = Vec::new();
        while let Some(entry) = self.timers.peek() {
            if entry.deadline > now {
                break;
            }
            let entry = self.timers.pop().expect("peeked entry vanished");
            if let Some(cb) = self.timer_cbs.remove(&entry.id) {
                due.push(DueTimer {
                    id: entry.id,
                    cb,
                    period: entry.period,
                });
            }
            // Entries with no callback were cancelled; drop them silently.
        }
        due
    }

    /// Re-arms a periodic timer after it fired, unless it was cancelled from
    /// within its own callback.
    pub fn rearm(&mut self, id: TaskId, period: Duration, cb: Callback) {
        if self.tombstones.remove(&id) {
            return;
        }
        self.seq += 1;
        self.timers.push(TimerEntry {
            deadline: Instant::now() + period,
            seq: self.seq,
            id,
            period: Some(period),
        });
        self.timer_cbs.insert(id, cb);
    }

    /// Earliest live deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.timers.peek() {
            if self.timer_cbs.contains_key(&entry.id) {
                return Some(entry.deadline);
            }
            self.timers.pop();
        }
        None
    }

    pub fn has_defers(&self) -> bool {
        !self.defers.is_empty()
    }
}
