use crate::error::{Error, Result};
use crate::reactor::poller::unix::{errno, set_errno, sys_write};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use std::collections::BTreeMap;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, AtomicPtr, Ordering};
use std::{io, mem, ptr};

/// Maximum number of primary loops that can join one hub.
pub const MAX_LOOPS: usize = 64;

/// Exclusive upper bound on signal numbers.
const SIGNAL_LIMIT: usize = 65;

/// Hub that installed the OS handler for each signal number.
static OWNERS: [AtomicPtr<SignalHub>; SIGNAL_LIMIT] =
    [const { AtomicPtr::new(ptr::null_mut()) }; SIGNAL_LIMIT];

static GLOBAL: SignalHub = SignalHub::new();

static FORK_HOOKS: Lazy<()> = Lazy::new(|| {
    let rc = unsafe {
        libc::pthread_atfork(
            Some(global_prepare_fork),
            Some(global_parent_after_fork),
            Some(global_child_after_fork),
        )
    };

    if rc != 0 {
        tracing::warn!(rc, "pthread_atfork failed, signal hub is not fork-safe");
    }
});

struct HubState {
    /// Registrations per signal number, summed over every loop.
    refcounts: BTreeMap<i32, usize>,
}

/// Process-wide half of signal delivery.
///
/// The OS handler for a signal is process-wide, so registrations from every
/// loop are reference counted here: the handler is installed on the first
/// registration and `SIG_DFL` is restored when the last one goes away.
///
/// Each primary loop joins the hub with the write end of its notification
/// pipe. From signal context the hub only reads the fixed slot table and
/// writes one byte per joined loop; no lock is taken there.
///
/// Most programs use [`SignalHub::global`]. A separate hub can be injected
/// through [`LoopBuilder::signal_hub`](crate::LoopBuilder::signal_hub), but a
/// given signal number can only be owned by one hub at a time.
pub struct SignalHub {
    state: Mutex<HubState>,
    slots: [AtomicI32; MAX_LOOPS],
}

impl SignalHub {
    /// Creates an empty hub, typically stored in a `static`.
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                refcounts: BTreeMap::new(),
            }),
            slots: [const { AtomicI32::new(-1) }; MAX_LOOPS],
        }
    }

    /// The hub used by loops that were not given one explicitly.
    ///
    /// The first call registers `pthread_atfork` hooks that keep the hub's
    /// lock consistent across `fork`.
    pub fn global() -> &'static SignalHub {
        Lazy::force(&FORK_HOOKS);
        &GLOBAL
    }

    /// Number of registrations for `signo` across all loops.
    pub fn refcount(&self, signo: i32) -> usize {
        self.state.lock().refcounts.get(&signo).copied().unwrap_or(0)
    }

    /// Takes the hub lock ahead of `fork`.
    ///
    /// Must be paired with [`parent_after_fork`](Self::parent_after_fork) in
    /// the parent and [`child_after_fork`](Self::child_after_fork) in the
    /// child. The global hub does this on its own.
    pub fn prepare_fork(&self) {
        mem::forget(self.state.lock());
    }

    pub fn parent_after_fork(&self) {
        // SAFETY: locked by `prepare_fork` on this thread.
        unsafe { self.state.force_unlock() };
    }

    pub fn child_after_fork(&self) {
        // SAFETY: the child has a single thread, the one that called
        // `prepare_fork`.
        unsafe { self.state.force_unlock() };
    }

    /// Adds `write_fd` to the fan-out table and returns its slot.
    pub(crate) fn join(&self, write_fd: RawFd) -> Result<usize> {
        for (slot, entry) in self.slots.iter().enumerate() {
            if entry
                .compare_exchange(-1, write_fd, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                tracing::debug!(slot, fd = write_fd, "loop joined signal hub");
                return Ok(slot);
            }
        }

        Err(Error::TooManyLoops(MAX_LOOPS))
    }

    pub(crate) fn leave(&self, slot: usize) {
        self.slots[slot].store(-1, Ordering::Release);
        tracing::debug!(slot, "loop left signal hub");
    }

    /// Counts one more registration for `signo`, installing the OS handler
    /// on the first one.
    pub(crate) fn acquire(&'static self, signo: i32) -> Result<()> {
        let index = validate(signo)?;
        let mut state = self.state.lock();

        let count = state.refcounts.get(&signo).copied().unwrap_or(0);
        if count == 0 {
            let this = self as *const SignalHub as *mut SignalHub;
            if OWNERS[index]
                .compare_exchange(ptr::null_mut(), this, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return Err(Error::SignalOwned(signo));
            }

            if let Err(err) = install(signo, on_signal as usize) {
                OWNERS[index].store(ptr::null_mut(), Ordering::Release);
                return match err.raw_os_error() {
                    Some(libc::EINVAL) => Err(Error::InvalidSignal(signo)),
                    _ => Err(err.into()),
                };
            }

            tracing::debug!(signo, "installed signal handler");
        }

        state.refcounts.insert(signo, count + 1);
        Ok(())
    }

    /// Drops one registration for `signo`, restoring `SIG_DFL` after the
    /// last one.
    pub(crate) fn release(&self, signo: i32) {
        let Ok(index) = validate(signo) else {
            return;
        };
        let mut state = self.state.lock();

        let Some(count) = state.refcounts.get_mut(&signo) else {
            tracing::warn!(signo, "release of a signal with no registrations");
            return;
        };

        *count -= 1;
        if *count > 0 {
            return;
        }
        state.refcounts.remove(&signo);

        if let Err(err) = install(signo, libc::SIG_DFL) {
            tracing::error!(signo, error = %err, "failed to restore default signal disposition");
            panic!("sigaction({signo}, SIG_DFL) failed: {err}");
        }
        OWNERS[index].store(ptr::null_mut(), Ordering::Release);

        tracing::debug!(signo, "restored default signal disposition");
    }

    /// Writes `signo` into every joined loop's pipe.
    ///
    /// Async-signal-safe. A full pipe drops the byte; the loop is already
    /// due to wake up in that case.
    fn notify(&self, signo: i32) {
        let byte = [signo as u8];

        for slot in &self.slots {
            let fd = slot.load(Ordering::Acquire);
            if fd >= 0 {
                sys_write(fd, &byte);
            }
        }
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(signo: i32) -> Result<usize> {
    let catchable = signo > 0
        && (signo as usize) < SIGNAL_LIMIT
        && signo != libc::SIGKILL
        && signo != libc::SIGSTOP;

    if catchable {
        Ok(signo as usize)
    } else {
        Err(Error::InvalidSignal(signo))
    }
}

fn install(signo: i32, handler: libc::sighandler_t) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(signo, &action, ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }
    }

    Ok(())
}

extern "C" fn on_signal(signo: libc::c_int) {
    let saved = errno();

    if let Some(owner) = OWNERS.get(signo as usize) {
        let hub = owner.load(Ordering::Acquire);
        // SAFETY: owners are `'static` hubs, published before the handler
        // was installed.
        if let Some(hub) = unsafe { hub.as_ref() } {
            hub.notify(signo);
        }
    }

    set_errno(saved);
}

unsafe extern "C" fn global_prepare_fork() {
    GLOBAL.prepare_fork();
}

unsafe extern "C" fn global_parent_after_fork() {
    GLOBAL.parent_after_fork();
}

unsafe extern "C" fn global_child_after_fork() {
    GLOBAL.child_after_fork();
}

#[cfg(test)]
mod tests {
    use super::{MAX_LOOPS, SignalHub};
    use crate::error::Error;

    #[test]
    fn test_rejects_uncatchable_signals() {
        static HUB: SignalHub = SignalHub::new();

        for signo in [0, -3, 65, 1000, libc::SIGKILL, libc::SIGSTOP] {
            assert!(matches!(HUB.acquire(signo), Err(Error::InvalidSignal(s)) if s == signo));
        }
        assert_eq!(HUB.refcount(libc::SIGKILL), 0);
    }

    #[test]
    fn test_join_until_full() {
        let hub = SignalHub::new();

        let slots: Vec<usize> = (0..MAX_LOOPS)
            .map(|fd| hub.join(fd as i32 + 100).unwrap())
            .collect();
        assert!(matches!(hub.join(7), Err(Error::TooManyLoops(MAX_LOOPS))));

        hub.leave(slots[3]);
        assert_eq!(hub.join(7).unwrap(), slots[3]);
    }

    #[test]
    fn test_signal_owned_by_one_hub() {
        static FIRST: SignalHub = SignalHub::new();
        static SECOND: SignalHub = SignalHub::new();

        FIRST.acquire(libc::SIGWINCH).unwrap();
        assert!(matches!(
            SECOND.acquire(libc::SIGWINCH),
            Err(Error::SignalOwned(libc::SIGWINCH))
        ));

        FIRST.acquire(libc::SIGWINCH).unwrap();
        assert_eq!(FIRST.refcount(libc::SIGWINCH), 2);

        FIRST.release(libc::SIGWINCH);
        FIRST.release(libc::SIGWINCH);
        assert_eq!(FIRST.refcount(libc::SIGWINCH), 0);

        SECOND.acquire(libc::SIGWINCH).unwrap();
        SECOND.release(libc::SIGWINCH);
    }
}
