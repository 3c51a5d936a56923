//! Readiness backend abstraction.
//!
//! This module provides one interface over the OS readiness-notification
//! mechanisms: `epoll` (Linux), `kqueue` (macOS and the BSDs), and the
//! portable `select`. All three speak the same `Flags` vocabulary and
//! implement the `Multiplexer` capability; the concrete one is picked
//! through [`BackendKind`] when the loop is built.

pub(crate) mod common;
pub(crate) mod unix;

mod select;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod epoll;

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod kqueue;

pub(crate) use common::{Event, Interest, Multiplexer};

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Which readiness backend a loop uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// The best backend for the target: epoll on Linux, kqueue on the BSDs
    /// and macOS, select elsewhere.
    #[default]
    Auto,
    Epoll,
    Kqueue,
    Select,
}

impl BackendKind {
    /// Resolves `Auto` to the concrete backend for this target.
    pub fn resolve(self) -> BackendKind {
        match self {
            BackendKind::Auto => {
                if cfg!(any(target_os = "linux", target_os = "android")) {
                    BackendKind::Epoll
                } else if cfg!(any(
                    target_os = "macos",
                    target_os = "ios",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "netbsd",
                    target_os = "dragonfly"
                )) {
                    BackendKind::Kqueue
                } else {
                    BackendKind::Select
                }
            }
            other => other,
        }
    }

    /// Whether this backend can be built on the current target.
    pub fn is_available(self) -> bool {
        match self.resolve() {
            BackendKind::Epoll => cfg!(any(target_os = "linux", target_os = "android")),
            BackendKind::Kqueue => cfg!(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            )),
            _ => true,
        }
    }
}

/// The backend owned by an event loop.
pub(crate) enum Poller {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Epoll(epoll::EpollPoller),

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    Kqueue(kqueue::KqueuePoller),

    Select(select::SelectPoller),
}

impl Poller {
    /// Builds the backend named by `kind`.
    ///
    /// Asking for a backend the target does not have fails with
    /// [`io::ErrorKind::Unsupported`].
    pub(crate) fn new(kind: BackendKind, capacity: usize) -> io::Result<Self> {
        match kind.resolve() {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            BackendKind::Epoll => Ok(Poller::Epoll(epoll::EpollPoller::new(capacity)?)),

            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            ))]
            BackendKind::Kqueue => Ok(Poller::Kqueue(kqueue::KqueuePoller::new(capacity)?)),

            BackendKind::Select => {
                let _ = capacity;
                Ok(Poller::Select(select::SelectPoller::new()))
            }

            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{other:?} backend is not available on this target"),
            )),
        }
    }

    pub(crate) fn kind(&self) -> BackendKind {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Poller::Epoll(_) => BackendKind::Epoll,

            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            ))]
            Poller::Kqueue(_) => BackendKind::Kqueue,

            Poller::Select(_) => BackendKind::Select,
        }
    }

    /// Exclusive upper bound on descriptor values, if the backend has one.
    pub(crate) fn fd_limit(&self) -> Option<usize> {
        match self {
            Poller::Select(_) => Some(select::SelectPoller::limit()),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    fn backend(&mut self) -> &mut dyn Multiplexer {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Poller::Epoll(poller) => poller,

            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "netbsd",
                target_os = "dragonfly"
            ))]
            Poller::Kqueue(poller) => poller,

            Poller::Select(poller) => poller,
        }
    }
}

impl Multiplexer for Poller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.backend().register(fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.backend().modify(fd, interest)
    }

    fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.backend().unregister(fd)
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        self.backend().wait(events, timeout)
    }
}
