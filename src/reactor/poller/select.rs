//! Portable `select(2)` backend.
//!
//! The `fd_set`s are rebuilt from the registered set on every wait, which
//! makes each wait O(n) in the number of registered descriptors. Descriptors
//! at or above `FD_SETSIZE` cannot be represented and are refused before they
//! reach this backend.
//!
//! The except set carries the `ERROR` direction, and `select` puts only
//! exceptional conditions such as out-of-band data there. A peer hang-up
//! shows up as `RECV` alone (a read returns zero bytes), where epoll also
//! reports `ERROR`.

use super::common::{Event, Interest, Multiplexer};
use crate::reactor::flags::Flags;

use libc::{FD_ISSET, FD_SET, FD_ZERO, fd_set, timeval};
use std::collections::BTreeMap;
use std::os::fd::RawFd;
use std::time::Duration;
use std::{io, mem, ptr};

/// `select` poller.
pub(crate) struct SelectPoller {
    /// Every descriptor the dispatcher currently keeps armed.
    registered: BTreeMap<RawFd, Interest>,

    /// Highest registered descriptor plus one, the `nfds` argument.
    max_fd: RawFd,
}

impl SelectPoller {
    pub(crate) fn new() -> Self {
        Self {
            registered: BTreeMap::new(),
            max_fd: 0,
        }
    }

    /// Largest descriptor value this backend can watch, exclusive.
    pub(crate) fn limit() -> usize {
        libc::FD_SETSIZE as usize
    }

    fn refresh_max(&mut self) {
        self.max_fd = self
            .registered
            .last_key_value()
            .map_or(0, |(fd, _)| fd + 1);
    }
}

impl Multiplexer for SelectPoller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if fd as usize >= Self::limit() {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }

        self.registered.insert(fd, interest);
        self.max_fd = self.max_fd.max(fd + 1);
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        match self.registered.get_mut(&fd) {
            Some(slot) => {
                *slot = interest;
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        if self.registered.remove(&fd).is_some() && fd + 1 == self.max_fd {
            self.refresh_max();
        }
        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        events.clear();

        // SAFETY: fd_set is plain data, FD_ZERO initializes it fully.
        let mut read: fd_set = unsafe { mem::zeroed() };
        let mut write: fd_set = unsafe { mem::zeroed() };
        let mut except: fd_set = unsafe { mem::zeroed() };

        unsafe {
            FD_ZERO(&mut read);
            FD_ZERO(&mut write);
            FD_ZERO(&mut except);
        }

        for (&fd, interest) in &self.registered {
            unsafe {
                if interest.read() {
                    FD_SET(fd, &mut read);
                }
                if interest.write() {
                    FD_SET(fd, &mut write);
                }
                if interest.error() {
                    FD_SET(fd, &mut except);
                }
            }
        }

        let mut tv = timeout.map(|t| timeval {
            tv_sec: t.as_secs().min(i32::MAX as u64) as _,
            tv_usec: t.subsec_micros() as _,
        });
        let tv_ptr = tv
            .as_mut()
            .map_or(ptr::null_mut(), |tv| tv as *mut timeval);

        let n = unsafe { libc::select(self.max_fd, &mut read, &mut write, &mut except, tv_ptr) };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        if n == 0 {
            return Ok(());
        }

        for &fd in self.registered.keys() {
            let mut ready = Flags::empty();

            unsafe {
                if FD_ISSET(fd, &read) {
                    ready |= Flags::RECV;
                }
                if FD_ISSET(fd, &write) {
                    ready |= Flags::SEND;
                }
                if FD_ISSET(fd, &except) {
                    ready |= Flags::ERROR;
                }
            }

            if !ready.is_empty() {
                events.push(Event { fd, ready });
            }
        }

        Ok(())
    }
}
