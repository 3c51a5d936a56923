use crate::reactor::flags::Flags;

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Interest armed in the kernel for one descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) struct Interest {
    /// Directions to watch.
    pub(crate) directions: Flags,

    /// Subset of `directions` that disarm after firing once.
    pub(crate) oneshot: Flags,
}

impl Interest {
    pub(crate) fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    pub(crate) fn read(&self) -> bool {
        self.directions.contains(Flags::RECV)
    }

    pub(crate) fn write(&self) -> bool {
        self.directions.contains(Flags::SEND)
    }

    pub(crate) fn error(&self) -> bool {
        self.directions.contains(Flags::ERROR)
    }
}

/// A readiness event reported by a backend.
///
/// `ready` holds the directions the kernel reported for `fd`. The dispatcher
/// intersects it with the directions actually registered, so a backend may
/// over-report (e.g. a hang-up surfacing as both readable and error).
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    pub(crate) fd: RawFd,
    pub(crate) ready: Flags,
}

/// The capability every readiness backend provides.
///
/// `register` is only called for descriptors the backend does not know yet,
/// `modify` and `unregister` only for ones it does. Removal tolerates a
/// descriptor that was already closed by its owner.
pub(crate) trait Multiplexer {
    fn register(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    fn unregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Blocks until readiness, or until `timeout` elapses when one is given.
    ///
    /// `events` is cleared first. An interrupted wait returns `Ok` with no
    /// events.
    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()>;
}

/// Converts a wait timeout to whole milliseconds, rounding up so that a
/// sub-millisecond remainder does not turn into a busy poll.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(t) => {
            let ms = t.as_micros().div_ceil(1000);
            ms.min(i32::MAX as u128) as i32
        }
    }
}

/// `true` for removal errors meaning the kernel no longer knows the fd.
pub(crate) fn is_gone(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::EBADF))
}

#[cfg(test)]
mod tests {
    use super::timeout_millis;

    use std::time::Duration;

    #[test]
    fn test_timeout_rounds_up() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_millis(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(10))), 10);
        assert_eq!(timeout_millis(Some(Duration::from_secs(u64::MAX))), i32::MAX);
    }
}
