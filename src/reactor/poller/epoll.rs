//! Linux `epoll`-based backend.
//!
//! One `epoll_ctl` call carries the combined read/write/error mask of a
//! descriptor. When any armed direction is oneshot the whole registration is
//! armed with `EPOLLONESHOT`; the kernel then disarms the descriptor after
//! one event and the dispatcher re-arms whatever persistent directions remain.
//!
//! This backend is the default on Linux targets.

use super::common::{Event, Interest, Multiplexer, is_gone, timeout_millis};
use crate::reactor::flags::Flags;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLONESHOT, EPOLLOUT, EPOLLPRI, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - a reusable event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: OwnedFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,
}

impl EpollPoller {
    /// Creates the epoll instance with room for `capacity` events per wait.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            // SAFETY: freshly created descriptor owned by nobody else.
            epoll: unsafe { OwnedFd::from_raw_fd(epoll) },
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    fn ctl(&self, op: i32, fd: RawFd, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: mask(interest),
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

fn mask(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.read() {
        flags |= EPOLLIN;
    }
    if interest.write() {
        flags |= EPOLLOUT;
    }
    if interest.error() {
        flags |= EPOLLERR | EPOLLPRI;
    }
    if !interest.oneshot.is_empty() {
        flags |= EPOLLONESHOT;
    }

    flags as u32
}

impl Multiplexer for EpollPoller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest)
    }

    fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe {
            epoll_ctl(
                self.epoll.as_raw_fd(),
                EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if !is_gone(&err) {
                return Err(err);
            }
        }

        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        events.clear();
        self.events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_millis(timeout),
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        // SAFETY: the kernel initialized the first `n` entries.
        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let bits = ev.events;
            let mut ready = Flags::empty();

            if bits & ((EPOLLIN | EPOLLHUP | EPOLLERR) as u32) != 0 {
                ready |= Flags::RECV;
            }
            if bits & ((EPOLLOUT | EPOLLERR) as u32) != 0 {
                ready |= Flags::SEND;
            }
            if bits & ((EPOLLERR | EPOLLHUP | EPOLLPRI) as u32) != 0 {
                ready |= Flags::ERROR;
            }

            events.push(Event {
                fd: ev.u64 as RawFd,
                ready,
            });
        }

        Ok(())
    }
}
