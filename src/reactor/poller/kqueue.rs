//! BSD / macOS `kqueue`-based backend.
//!
//! Reads and writes are independent `EVFILT_READ` / `EVFILT_WRITE` filters,
//! each enabled or deleted on its own and each carrying its own `EV_ONESHOT`.
//! kqueue has no error filter: error readiness is inferred from `EV_ERROR` on
//! the read or write filter. A descriptor registered for errors only keeps an
//! edge-triggered read filter so that errors can surface at all.

use super::common::{Event, Interest, Multiplexer, timeout_millis};
use crate::reactor::flags::Flags;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_ENABLE, EV_ERROR, EV_ONESHOT, EVFILT_READ, EVFILT_WRITE,
    kevent, kqueue,
};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use std::{io, mem, ptr};

/// `kqueue` poller.
pub(crate) struct KqueuePoller {
    queue: OwnedFd,

    /// Reusable buffer for returned events.
    events: Vec<kevent>,
}

impl KqueuePoller {
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let queue = unsafe { kqueue() };
        if queue < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: freshly created descriptor owned by nobody else.
        let queue = unsafe { OwnedFd::from_raw_fd(queue) };
        super::unix::sys_set_cloexec(queue.as_raw_fd())?;

        Ok(Self {
            queue,
            events: Vec::with_capacity(capacity.max(1)),
        })
    }

    /// Submits a single change. Deleting a filter the kernel already dropped
    /// (after a oneshot fired, or because the fd was closed) is not an error.
    fn change(&self, fd: RawFd, filter: i16, flags: u16) -> io::Result<()> {
        // SAFETY: kevent is plain data; all-zero is a valid value.
        let mut change: kevent = unsafe { mem::zeroed() };
        change.ident = fd as _;
        change.filter = filter as _;
        change.flags = flags as _;

        let rc = unsafe {
            kevent(
                self.queue.as_raw_fd(),
                &change,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if flags & EV_DELETE != 0 && super::common::is_gone(&err) {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }

    fn apply(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let filter_flags = |direction: Flags| {
            let mut flags = EV_ADD | EV_ENABLE;
            if interest.oneshot.contains(direction) {
                flags |= EV_ONESHOT;
            }
            flags
        };

        if interest.read() {
            self.change(fd, EVFILT_READ, filter_flags(Flags::RECV))?;
        } else if interest.error() && !interest.write() {
            self.change(fd, EVFILT_READ, filter_flags(Flags::ERROR) | EV_CLEAR)?;
        } else {
            self.change(fd, EVFILT_READ, EV_DELETE)?;
        }

        if interest.write() {
            self.change(fd, EVFILT_WRITE, filter_flags(Flags::SEND))?;
        } else {
            self.change(fd, EVFILT_WRITE, EV_DELETE)?;
        }

        Ok(())
    }
}

impl Multiplexer for KqueuePoller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.apply(fd, interest)
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.apply(fd, interest)
    }

    fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.change(fd, EVFILT_READ, EV_DELETE)?;
        self.change(fd, EVFILT_WRITE, EV_DELETE)
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        events.clear();
        self.events.clear();

        let timespec = timeout.map(|t| {
            let ms = timeout_millis(Some(t)) as i64;
            libc::timespec {
                tv_sec: (ms / 1000) as _,
                tv_nsec: ((ms % 1000) * 1_000_000) as _,
            }
        });
        let timespec_ptr = timespec
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        let n = unsafe {
            kevent(
                self.queue.as_raw_fd(),
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as _,
                timespec_ptr,
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
            let fd = ev.ident as RawFd;
            let mut ready = Flags::empty();

            if ev.filter == EVFILT_READ as _ {
                ready |= Flags::RECV;
            }
            if ev.filter == EVFILT_WRITE as _ {
                ready |= Flags::SEND;
            }
            if ev.flags & (EV_ERROR as _) != 0 {
                ready |= Flags::ERROR;
            }

            // Read and write filters of one fd come back as separate entries.
            if let Some(existing) = events.iter_mut().find(|e| e.fd == fd) {
                existing.ready |= ready;
            } else {
                events.push(Event { fd, ready });
            }
        }

        Ok(())
    }
}
