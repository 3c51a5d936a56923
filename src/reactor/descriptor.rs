use super::flags::Flags;
use super::handler::{FdHandler, TimeoutHandler};
use super::poller::Interest;
use crate::heap::NodeId;

use std::os::fd::RawFd;

/// Lifecycle of a descriptor with respect to clearing.
///
/// Only the dispatcher moves a descriptor out of `PendingClear`; a handler
/// that clears its own fd never frees the memory it is running from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ClearState {
    /// Registered and usable.
    Active,
    /// Cleared while one of its handlers was running; freed once it returns.
    PendingClear,
    /// Removed from the registry.
    Freed,
}

/// Registration for one direction of a descriptor.
#[derive(Default)]
pub(crate) struct Direction {
    pub(crate) handler: Option<FdHandler>,
    pub(crate) oneshot: bool,
}

impl Direction {
    pub(crate) fn is_registered(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.handler = None;
        self.oneshot = false;
    }
}

/// Neighbours in one of the registry's index rings.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Link {
    pub(crate) prev: usize,
    pub(crate) next: usize,
}

/// Everything the loop knows about one file descriptor.
pub(crate) struct FdDescriptor {
    pub(crate) fd: RawFd,

    pub(crate) recv: Direction,
    pub(crate) send: Direction,
    pub(crate) error: Direction,

    /// Runs when `timeout_node` expires.
    pub(crate) timeout_handler: Option<TimeoutHandler>,

    /// Entry in the fd timeout queue, if a timeout is armed.
    pub(crate) timeout_node: Option<NodeId>,

    /// Directions reported ready and not yet dispatched.
    pub(crate) ready: Flags,

    /// One of this descriptor's handlers is running.
    pub(crate) in_process: bool,
    /// Linked into the active list.
    pub(crate) in_active: bool,
    /// Linked into the wait list.
    pub(crate) in_wait: bool,

    pub(crate) state: ClearState,

    /// Bumped on every clear, so a dispatch in flight can tell that the
    /// registration it started with is gone even if it was revived.
    pub(crate) epoch: u64,

    /// Loop iteration in which readiness was last dispatched.
    pub(crate) last_active: u64,

    /// Interest the kernel currently holds, `None` when not registered.
    pub(crate) armed: Option<Interest>,

    pub(crate) wait_link: Link,
    pub(crate) active_link: Link,
}

impl FdDescriptor {
    pub(crate) fn new(fd: RawFd) -> Self {
        Self {
            fd,
            recv: Direction::default(),
            send: Direction::default(),
            error: Direction::default(),
            timeout_handler: None,
            timeout_node: None,
            ready: Flags::empty(),
            in_process: false,
            in_active: false,
            in_wait: false,
            state: ClearState::Active,
            epoch: 0,
            last_active: 0,
            armed: None,
            wait_link: Link::default(),
            active_link: Link::default(),
        }
    }

    /// # Panics
    ///
    /// Panics unless `direction` is exactly one of `RECV`, `SEND`, `ERROR`.
    pub(crate) fn direction(&self, direction: Flags) -> &Direction {
        match direction {
            Flags::RECV => &self.recv,
            Flags::SEND => &self.send,
            Flags::ERROR => &self.error,
            other => panic!("not a single direction: {other:?}"),
        }
    }

    pub(crate) fn direction_mut(&mut self, direction: Flags) -> &mut Direction {
        match direction {
            Flags::RECV => &mut self.recv,
            Flags::SEND => &mut self.send,
            Flags::ERROR => &mut self.error,
            other => panic!("not a single direction: {other:?}"),
        }
    }

    /// Directions that currently have a handler.
    pub(crate) fn registered(&self) -> Flags {
        let mut flags = Flags::empty();
        for (direction, slot) in [
            (Flags::RECV, &self.recv),
            (Flags::SEND, &self.send),
            (Flags::ERROR, &self.error),
        ] {
            if slot.is_registered() {
                flags |= direction;
            }
        }
        flags
    }

    /// Interest that should be armed in the kernel right now.
    ///
    /// A oneshot direction that fired and still waits for dispatch is left
    /// out: the kernel already disarmed it and it must not fire twice.
    pub(crate) fn interest(&self) -> Interest {
        let mut interest = Interest::default();

        for direction in self.registered().each_direction() {
            let slot = self.direction(direction);
            if slot.oneshot {
                if self.ready.contains(direction) {
                    continue;
                }
                interest.oneshot |= direction;
            }
            interest.directions |= direction;
        }

        interest
    }

    pub(crate) fn clear_directions(&mut self) {
        self.recv.clear();
        self.send.clear();
        self.error.clear();
    }

    pub(crate) fn is_pending_clear(&self) -> bool {
        self.state == ClearState::PendingClear
    }
}
