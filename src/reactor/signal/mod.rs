//! Signal delivery through a self-pipe.
//!
//! The OS handler only writes the signal number into the notification pipe
//! of every primary loop. Each loop watches the read end like any other
//! descriptor and runs the registered handlers from its dispatcher, on the
//! driving thread.

mod hub;
mod table;

pub use hub::{MAX_LOOPS, SignalHub};
pub use table::SignalKey;

pub(crate) use table::SignalTable;

use super::poller::unix::{sys_pipe, sys_read};
use crate::error::Result;

use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Notification pipe of a primary loop, joined to a hub for its lifetime.
pub(crate) struct SignalPipe {
    hub: &'static SignalHub,
    slot: usize,
    reader: OwnedFd,
    /// Held open for the hub, which writes to it from signal context.
    _writer: OwnedFd,
}

impl SignalPipe {
    pub(crate) fn open(hub: &'static SignalHub) -> Result<Self> {
        let (reader, writer) = sys_pipe()?;
        let slot = hub.join(writer.as_raw_fd())?;

        Ok(Self {
            hub,
            slot,
            reader,
            _writer: writer,
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        // Leave before the write end closes so the handler never writes to
        // a recycled descriptor.
        self.hub.leave(self.slot);
    }
}

/// Reads every pending signal number from a non-blocking pipe.
pub(crate) fn drain(fd: RawFd) -> Vec<i32> {
    let mut signals = Vec::new();
    let mut buffer = [0u8; 64];

    loop {
        let n = sys_read(fd, &mut buffer);

        match n {
            (1..) => signals.extend(buffer[..n as usize].iter().map(|&b| b as i32)),
            0 => break,
            _ => {
                let error = io::Error::last_os_error();

                match error.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => break,
                    _ => {
                        tracing::warn!(fd, %error, "failed to read signal pipe");
                        break;
                    }
                }
            }
        }
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::{SignalHub, SignalPipe, drain};
    use crate::reactor::poller::unix::sys_write;

    use std::os::fd::AsRawFd;

    #[test]
    fn test_pipe_drains_written_signals() {
        static HUB: SignalHub = SignalHub::new();
        let pipe = SignalPipe::open(&HUB).unwrap();

        assert!(drain(pipe.fd()).is_empty());

        sys_write(pipe._writer.as_raw_fd(), &[10, 12, 10]);
        assert_eq!(drain(pipe.fd()), vec![10, 12, 10]);
    }
}
