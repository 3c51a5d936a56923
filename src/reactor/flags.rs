use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not, Sub};
use std::time::Duration;

/// Registration flags accepted by [`EventLoop::set_fd`](crate::EventLoop::set_fd).
///
/// Directions (`RECV`, `SEND`, `ERROR`) pick which readiness a handler is
/// interested in. The remaining flags modify how the registration is applied.
/// Flags combine with `|`:
///
/// ```
/// use vigil::Flags;
///
/// let flags = Flags::RECV | Flags::ONESHOT;
/// assert!(flags.contains(Flags::RECV));
/// assert_eq!(flags.directions(), Flags::RECV);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u32);

impl Flags {
    /// Readable.
    pub const RECV: Flags = Flags(1 << 0);
    /// Writable.
    pub const SEND: Flags = Flags(1 << 1);
    /// Error condition.
    ///
    /// What counts as one depends on the backend: epoll reports hang-ups and
    /// socket errors, kqueue reports `EV_ERROR`, and select reports only
    /// exceptional conditions such as out-of-band data.
    pub const ERROR: Flags = Flags(1 << 2);
    /// Disarm the named directions after they fire once.
    pub const ONESHOT: Flags = Flags(1 << 3);
    /// Put the descriptor in non-blocking mode.
    pub const NONBLOCK: Flags = Flags(1 << 4);
    /// Put the descriptor in blocking mode.
    pub const BLOCK: Flags = Flags(1 << 5);
    /// Merge the named directions into the existing registration.
    pub const APPEND: Flags = Flags(1 << 6);
    /// Remove the registration. Must be used alone.
    pub const CLR: Flags = Flags(1 << 7);

    const DIRECTIONS: Flags = Flags(0b111);

    pub const fn empty() -> Flags {
        Flags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    /// Only the direction bits of `self`.
    pub const fn directions(self) -> Flags {
        Flags(self.0 & Self::DIRECTIONS.0)
    }

    /// Iterates over the direction bits in dispatch order: recv, send, error.
    pub(crate) fn each_direction(self) -> impl Iterator<Item = Flags> {
        [Flags::RECV, Flags::SEND, Flags::ERROR]
            .into_iter()
            .filter(move |d| self.contains(*d))
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl Sub for Flags {
    type Output = Flags;

    fn sub(self, rhs: Flags) -> Flags {
        Flags(self.0 & !rhs.0)
    }
}

impl Not for Flags {
    type Output = Flags;

    fn not(self) -> Flags {
        Flags(!self.0)
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Flags, &str); 8] = [
            (Flags::RECV, "RECV"),
            (Flags::SEND, "SEND"),
            (Flags::ERROR, "ERROR"),
            (Flags::ONESHOT, "ONESHOT"),
            (Flags::NONBLOCK, "NONBLOCK"),
            (Flags::BLOCK, "BLOCK"),
            (Flags::APPEND, "APPEND"),
            (Flags::CLR, "CLR"),
        ];

        if self.is_empty() {
            return f.write_str("(empty)");
        }

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// What to do with a descriptor's timeout when calling `set_fd`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FdTimeout {
    /// Remove any pending timeout.
    Unlimited,
    /// Leave the pending timeout (or its absence) as it is.
    Unmodified,
    /// Arm or re-arm the timeout to fire this long from now.
    After(Duration),
}

impl FdTimeout {
    /// Shorthand for `FdTimeout::After(Duration::from_millis(ms))`.
    pub fn millis(ms: u64) -> FdTimeout {
        FdTimeout::After(Duration::from_millis(ms))
    }
}
