use crate::heap::{FibHeap, HeapError, NodeId};

use std::os::fd::RawFd;
use std::time::Instant;

/// Key of the per-descriptor timeout queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct FdDeadline {
    deadline: Instant,
    fd: RawFd,
}

/// Deadlines of descriptors that expect activity within a bounded time.
///
/// Independent from [`TimerQueue`](super::timer::TimerQueue): a descriptor's
/// timeout is re-armed many times over its life and is removed as soon as
/// the descriptor shows activity.
pub(crate) struct FdTimeoutQueue {
    heap: FibHeap<FdDeadline>,
}

impl FdTimeoutQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: FibHeap::new(),
        }
    }

    /// Arms `fd` to expire at `deadline`, reusing `existing` when given.
    ///
    /// An earlier deadline is applied in place with decrease-key; a later one
    /// needs a fresh node.
    pub(crate) fn arm(&mut self, existing: Option<NodeId>, fd: RawFd, deadline: Instant) -> NodeId {
        let key = FdDeadline { deadline, fd };

        let Some(id) = existing else {
            return self.heap.insert(key);
        };

        match self.heap.decrease_key(id, key) {
            Ok(()) => id,
            Err(HeapError::NotDecreased(key)) => {
                self.heap.delete(id);
                self.heap.insert(key)
            }
            Err(HeapError::StaleHandle(key)) => self.heap.insert(key),
        }
    }

    pub(crate) fn disarm(&mut self, id: NodeId) {
        self.heap.delete(id);
    }

    /// Pops the earliest expired descriptor, if any.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<RawFd> {
        match self.heap.minimum() {
            Some(key) if key.deadline <= now => self.heap.extract_min().map(|key| key.fd),
            _ => None,
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.minimum().map(|key| key.deadline)
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}
