use super::handler::TimerHandler;
use crate::heap::{FibHeap, NodeId};

use std::cmp::Ordering;
use std::time::Instant;

/// Handle returned by [`EventLoop::set_timer`](crate::EventLoop::set_timer),
/// usable to cancel the timer before it fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(NodeId);

/// An entry in the timer queue.
///
/// `TimerEntry` represents a scheduled one-shot callback at a specific
/// deadline. Entries with equal deadlines fire in scheduling order.
pub(crate) struct TimerEntry {
    /// The time at which the timer should fire.
    pub(crate) deadline: Instant,

    /// Scheduling order, breaks deadline ties.
    seq: u64,

    /// Callback to run once the deadline is reached.
    pub(crate) handler: TimerHandler,
}

fn earliest_first(a: &TimerEntry, b: &TimerEntry) -> Ordering {
    a.deadline.cmp(&b.deadline).then(a.seq.cmp(&b.seq))
}

/// Queue of general one-shot timers, earliest deadline first.
pub(crate) struct TimerQueue {
    heap: FibHeap<TimerEntry>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> Self {
        let compare: fn(&TimerEntry, &TimerEntry) -> Ordering = earliest_first;

        Self {
            heap: FibHeap::with_comparator(compare),
            seq: 0,
        }
    }

    pub(crate) fn schedule(&mut self, deadline: Instant, handler: TimerHandler) -> TimerId {
        let seq = self.seq;
        self.seq += 1;

        TimerId(self.heap.insert(TimerEntry {
            deadline,
            seq,
            handler,
        }))
    }

    /// Removes a pending timer. Returns `false` if it already fired or was
    /// cancelled.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.heap.delete(id.0).is_some()
    }

    /// Pops the earliest timer if its deadline is at or before `now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<TimerEntry> {
        match self.heap.minimum() {
            Some(entry) if entry.deadline <= now => self.heap.extract_min(),
            _ => None,
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.minimum().map(|entry| entry.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
