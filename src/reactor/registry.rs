use super::descriptor::{ClearState, FdDescriptor, Link};
use crate::utils::Slab;

use std::collections::BTreeMap;
use std::os::fd::RawFd;

/// Which index ring an operation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum List {
    /// Every registered descriptor.
    Wait,
    /// Descriptors with readiness waiting to be dispatched.
    Active,
}

/// Head of a circular doubly linked ring threaded through descriptor links.
#[derive(Default)]
struct Ring {
    head: Option<usize>,
    len: usize,
}

/// Descriptor storage with O(log n) lookup by fd.
///
/// Descriptors live in a slab and are addressed by index. The wait and
/// active lists are two disjoint rings threaded through each descriptor's
/// `wait_link` and `active_link`, so membership changes never allocate.
pub(crate) struct FdRegistry {
    descriptors: Slab<FdDescriptor>,
    by_fd: BTreeMap<RawFd, usize>,
    wait: Ring,
    active: Ring,
}

impl FdRegistry {
    pub(crate) fn new() -> Self {
        Self {
            descriptors: Slab::new(64),
            by_fd: BTreeMap::new(),
            wait: Ring::default(),
            active: Ring::default(),
        }
    }

    pub(crate) fn lookup(&self, fd: RawFd) -> Option<usize> {
        self.by_fd.get(&fd).copied()
    }

    pub(crate) fn get(&self, index: usize) -> &FdDescriptor {
        &self.descriptors[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut FdDescriptor {
        &mut self.descriptors[index]
    }

    /// Returns the descriptor for `fd`, creating it on first use.
    pub(crate) fn find_or_insert(&mut self, fd: RawFd) -> usize {
        if let Some(index) = self.lookup(fd) {
            return index;
        }

        let index = self.descriptors.insert(FdDescriptor::new(fd));
        self.by_fd.insert(fd, index);
        index
    }

    /// Links a descriptor into the wait list if it is not there yet.
    pub(crate) fn watch(&mut self, index: usize) {
        if !self.descriptors[index].in_wait {
            self.push_back(List::Wait, index);
            self.descriptors[index].in_wait = true;
        }
    }

    pub(crate) fn unwatch(&mut self, index: usize) {
        if self.descriptors[index].in_wait {
            self.unlink(List::Wait, index);
            self.descriptors[index].in_wait = false;
        }
    }

    /// Queues a descriptor for dispatch; a no-op if it is already queued.
    pub(crate) fn activate(&mut self, index: usize) {
        if !self.descriptors[index].in_active {
            self.push_back(List::Active, index);
            self.descriptors[index].in_active = true;
        }
    }

    pub(crate) fn deactivate(&mut self, index: usize) {
        if self.descriptors[index].in_active {
            self.unlink(List::Active, index);
            self.descriptors[index].in_active = false;
        }
    }

    /// Unlinks and returns the oldest active descriptor.
    pub(crate) fn pop_active(&mut self) -> Option<usize> {
        let index = self.active.head?;

        self.unlink(List::Active, index);
        self.descriptors[index].in_active = false;

        Some(index)
    }

    /// Removes a descriptor from every list and from the fd map.
    pub(crate) fn free(&mut self, index: usize) -> FdDescriptor {
        self.unwatch(index);
        self.deactivate(index);

        let mut descriptor = self.descriptors.remove(index);
        self.by_fd.remove(&descriptor.fd);

        descriptor.state = ClearState::Freed;
        descriptor
    }

    /// Number of descriptors in storage, including pending clears.
    pub(crate) fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub(crate) fn watched(&self) -> usize {
        self.wait.len
    }

    #[cfg(test)]
    pub(crate) fn active(&self) -> usize {
        self.active.len
    }

    /// Fds in wait-list order.
    #[cfg(test)]
    pub(crate) fn watched_fds(&self) -> Vec<RawFd> {
        let mut fds = Vec::with_capacity(self.wait.len);
        let Some(head) = self.wait.head else {
            return fds;
        };

        let mut cursor = head;
        loop {
            fds.push(self.descriptors[cursor].fd);
            cursor = self.descriptors[cursor].wait_link.next;
            if cursor == head {
                break;
            }
        }
        fds
    }

    fn ring(&mut self, list: List) -> &mut Ring {
        match list {
            List::Wait => &mut self.wait,
            List::Active => &mut self.active,
        }
    }

    fn link(&mut self, list: List, index: usize) -> &mut Link {
        let descriptor = &mut self.descriptors[index];
        match list {
            List::Wait => &mut descriptor.wait_link,
            List::Active => &mut descriptor.active_link,
        }
    }

    fn push_back(&mut self, list: List, index: usize) {
        match self.ring(list).head {
            None => {
                *self.link(list, index) = Link {
                    prev: index,
                    next: index,
                };
                self.ring(list).head = Some(index);
            }
            Some(head) => {
                let tail = self.link(list, head).prev;

                *self.link(list, index) = Link {
                    prev: tail,
                    next: head,
                };
                self.link(list, tail).next = index;
                self.link(list, head).prev = index;
            }
        }

        self.ring(list).len += 1;
    }

    fn unlink(&mut self, list: List, index: usize) {
        let Link { prev, next } = *self.link(list, index);

        if next == index {
            self.ring(list).head = None;
        } else {
            self.link(list, prev).next = next;
            self.link(list, next).prev = prev;

            if self.ring(list).head == Some(index) {
                self.ring(list).head = Some(next);
            }
        }

        *self.link(list, index) = Link {
            prev: index,
            next: index,
        };
        self.ring(list).len -= 1;
    }
}
