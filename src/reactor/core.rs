use super::descriptor::ClearState;
use super::flags::{FdTimeout, Flags};
use super::handler::{Callback, FdHandler, SignalHandler, TimeoutHandler};
use super::poller::unix::sys_set_nonblocking;
use super::poller::{BackendKind, Event, Multiplexer, Poller};
use super::registry::FdRegistry;
use super::signal::{self, SignalHub, SignalKey, SignalPipe, SignalTable};
use super::timeout::FdTimeoutQueue;
use super::timer::{TimerId, TimerQueue};
use crate::builder::LoopBuilder;
use crate::error::{Error, Result};

use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// A single-threaded callback reactor.
///
/// `EventLoop` watches file descriptors for readiness, runs one-shot timers,
/// enforces per-descriptor inactivity timeouts, and turns POSIX signals into
/// ordinary callbacks. Every handler receives the loop itself and may add,
/// change, or remove any registration, its own included.
///
/// One iteration of [`dispatch`](Self::dispatch) runs, in order: the
/// per-iteration callback, due timers, ready descriptors, expired descriptor
/// timeouts, due timers again, and finally the backend wait.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use vigil::EventLoop;
///
/// let mut event_loop = EventLoop::init(false)?;
///
/// event_loop.set_timer(Duration::from_millis(10), |event_loop| {
///     event_loop.set_break();
/// });
///
/// event_loop.dispatch()?;
/// # Ok::<(), vigil::Error>(())
/// ```
pub struct EventLoop {
    poller: Poller,
    events: Vec<Event>,

    registry: FdRegistry,
    timers: TimerQueue,
    timeouts: FdTimeoutQueue,

    hub: &'static SignalHub,
    signals: SignalTable,
    pipe: Option<SignalPipe>,

    callback: Option<Callback>,
    tick: Duration,

    broken: bool,
    dispatching: bool,
    iteration: u64,
}

impl EventLoop {
    /// Creates a loop with the default configuration.
    ///
    /// A primary loop owns a notification pipe and can register signal
    /// handlers; use [`LoopBuilder`] for anything else.
    pub fn init(is_primary: bool) -> Result<Self> {
        LoopBuilder::new().primary(is_primary).build()
    }

    pub(crate) fn with_builder(builder: LoopBuilder) -> Result<Self> {
        let poller = Poller::new(builder.backend, builder.event_capacity)?;

        let mut event_loop = Self {
            poller,
            events: Vec::with_capacity(builder.event_capacity),
            registry: FdRegistry::new(),
            timers: TimerQueue::new(),
            timeouts: FdTimeoutQueue::new(),
            hub: builder.signal_hub,
            signals: SignalTable::default(),
            pipe: None,
            callback: None,
            tick: builder.tick,
            broken: false,
            dispatching: false,
            iteration: 0,
        };

        if builder.primary {
            let pipe = SignalPipe::open(builder.signal_hub)?;
            let fd = pipe.fd();
            event_loop.pipe = Some(pipe);

            event_loop.set_fd(
                fd,
                Flags::RECV | Flags::NONBLOCK,
                FdTimeout::Unlimited,
                |event_loop, fd, _| event_loop.deliver_signals(fd),
            )?;
        }

        tracing::debug!(
            backend = ?event_loop.poller.kind(),
            primary = builder.primary,
            tick = ?builder.tick,
            "event loop created"
        );

        Ok(event_loop)
    }

    /// Tears the loop down, releasing every signal it still holds.
    ///
    /// Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self);
    }

    /// The readiness backend in use.
    pub fn backend(&self) -> BackendKind {
        self.poller.kind()
    }

    /// Whether this loop receives signals.
    pub fn is_primary(&self) -> bool {
        self.pipe.is_some()
    }

    /// Registers, modifies, or clears interest in `fd`.
    ///
    /// The directions named in `flags` (`RECV`, `SEND`, `ERROR`) are bound
    /// to `handler`. Without `APPEND` they replace the whole registration;
    /// with it they are merged into it. With no direction named only the
    /// modifiers and `timeout` apply. `ONESHOT` makes the named directions
    /// fire once; `NONBLOCK` and `BLOCK` switch the descriptor's mode.
    ///
    /// `timeout` arms, keeps, or removes an inactivity deadline whose
    /// expiry runs the handler installed with
    /// [`set_fd_timeout_handler`](Self::set_fd_timeout_handler). Readiness
    /// on the descriptor removes it.
    ///
    /// `Flags::CLR` is the same as [`clear_fd`](Self::clear_fd).
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FdOutOfRange`] if the backend cannot watch `fd`.
    ///
    /// # Panics
    ///
    /// Panics if `fd` is negative, if `NONBLOCK` and `BLOCK` are combined,
    /// if `CLR` is combined with anything, or if the kernel rejects the
    /// registration.
    pub fn set_fd<F>(
        &mut self,
        fd: RawFd,
        flags: Flags,
        timeout: FdTimeout,
        handler: F,
    ) -> Result<()>
    where
        F: FnMut(&mut EventLoop, RawFd, Flags) + 'static,
    {
        assert!(fd >= 0, "negative fd {fd}");

        if flags.contains(Flags::CLR) {
            assert!(flags == Flags::CLR, "CLR cannot be combined with other flags: {flags:?}");
            self.clear_fd(fd);
            return Ok(());
        }

        assert!(
            !flags.contains(Flags::NONBLOCK | Flags::BLOCK),
            "NONBLOCK and BLOCK are mutually exclusive"
        );

        if let Some(limit) = self.poller.fd_limit() {
            if fd as usize >= limit {
                return Err(Error::FdOutOfRange { fd, limit });
            }
        }

        if flags.intersects(Flags::NONBLOCK | Flags::BLOCK) {
            let nonblocking = flags.contains(Flags::NONBLOCK);
            if let Err(err) = sys_set_nonblocking(fd, nonblocking) {
                fatal("fcntl", fd, &err);
            }
        }

        let index = self.registry.find_or_insert(fd);
        self.registry.watch(index);

        let descriptor = self.registry.get_mut(index);
        if descriptor.is_pending_clear() {
            descriptor.state = ClearState::Active;
            descriptor.ready = Flags::empty();
        }

        let directions = flags.directions();
        if !directions.is_empty() {
            if !flags.contains(Flags::APPEND) {
                descriptor.clear_directions();
            }

            let handler: FdHandler = Rc::new(RefCell::new(handler));
            for direction in directions.each_direction() {
                let slot = descriptor.direction_mut(direction);
                slot.handler = Some(handler.clone());
                slot.oneshot = flags.contains(Flags::ONESHOT);
            }

            // Readiness reported for an earlier registration is not carried
            // over to the new one.
            descriptor.ready = descriptor.ready - directions;
        }

        match timeout {
            FdTimeout::Unmodified => {}
            FdTimeout::Unlimited => {
                if let Some(node) = descriptor.timeout_node.take() {
                    self.timeouts.disarm(node);
                }
            }
            FdTimeout::After(delay) => {
                let deadline = Instant::now() + delay;
                let node = self.timeouts.arm(descriptor.timeout_node, fd, deadline);
                descriptor.timeout_node = Some(node);
            }
        }

        tracing::debug!(fd, ?flags, ?timeout, "set fd");

        self.sync_backend(index, false);
        Ok(())
    }

    /// Removes every registration for `fd`, including its timeout.
    ///
    /// The kernel stops reporting the descriptor at once. If one of its
    /// handlers is running, the descriptor itself is released after that
    /// handler returns and none of its other pending directions fire.
    /// Clearing an unknown descriptor does nothing.
    pub fn clear_fd(&mut self, fd: RawFd) {
        let Some(index) = self.registry.lookup(fd) else {
            return;
        };

        let descriptor = self.registry.get_mut(index);
        if descriptor.armed.take().is_some() {
            if let Err(err) = self.poller.unregister(fd) {
                fatal("unregister", fd, &err);
            }
        }

        descriptor.epoch += 1;
        descriptor.clear_directions();
        descriptor.timeout_handler = None;
        if let Some(node) = descriptor.timeout_node.take() {
            self.timeouts.disarm(node);
        }

        if descriptor.in_process {
            descriptor.state = ClearState::PendingClear;
            descriptor.ready = Flags::empty();
            self.registry.unwatch(index);
            self.registry.deactivate(index);
            tracing::debug!(fd, "clear deferred until handler returns");
        } else {
            self.registry.free(index);
            tracing::debug!(fd, "cleared fd");
        }
    }

    /// Installs the handler run when `fd`'s timeout expires.
    ///
    /// # Panics
    ///
    /// Panics if `fd` is not registered.
    pub fn set_fd_timeout_handler<F>(&mut self, fd: RawFd, handler: F)
    where
        F: FnMut(&mut EventLoop, RawFd) + 'static,
    {
        let Some(index) = self.registry.lookup(fd) else {
            panic!("timeout handler for unregistered fd {fd}");
        };

        let handler: TimeoutHandler = Rc::new(RefCell::new(handler));
        self.registry.get_mut(index).timeout_handler = Some(handler);
    }

    /// Directions currently registered for `fd`, `None` if it is unknown.
    pub fn interest(&self, fd: RawFd) -> Option<Flags> {
        let index = self.registry.lookup(fd)?;
        let descriptor = self.registry.get(index);

        if descriptor.is_pending_clear() {
            return None;
        }
        Some(descriptor.registered())
    }

    /// Number of registered descriptors.
    ///
    /// Includes the notification pipe of a primary loop.
    pub fn registered_fds(&self) -> usize {
        self.registry.watched()
    }

    /// Runs `handler` once, `delay` from now.
    ///
    /// Timers with the same deadline fire in the order they were set.
    pub fn set_timer<F>(&mut self, delay: Duration, handler: F) -> TimerId
    where
        F: FnOnce(&mut EventLoop) + 'static,
    {
        self.timers.schedule(Instant::now() + delay, Box::new(handler))
    }

    /// Cancels a timer that has not fired yet.
    ///
    /// Returns `false` if it already fired or was cancelled.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Number of timers waiting to fire.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Registers `handler` for `signo`.
    ///
    /// Handlers for the same signal run in registration order, on the
    /// thread driving the loop. The returned key removes this registration
    /// with [`unset_signal`](Self::unset_signal).
    ///
    /// # Errors
    ///
    /// - [`Error::NotPrimary`] if the loop has no notification pipe.
    /// - [`Error::InvalidSignal`] for signals that cannot be caught.
    /// - [`Error::SignalOwned`] if another hub handles `signo`.
    pub fn set_signal<F>(&mut self, signo: i32, handler: F) -> Result<SignalKey>
    where
        F: FnMut(&mut EventLoop, i32) + 'static,
    {
        if self.pipe.is_none() {
            return Err(Error::NotPrimary);
        }

        self.hub.acquire(signo)?;

        let handler: SignalHandler = Rc::new(RefCell::new(handler));
        let key = self.signals.insert(signo, handler);

        tracing::debug!(signo, ?key, "set signal handler");
        Ok(key)
    }

    /// Removes the registration `key` for `signo`.
    ///
    /// Takes effect at once: a handler removed by another handler of the
    /// same delivery does not run.
    ///
    /// The default disposition is restored once no loop handles `signo`.
    pub fn unset_signal(&mut self, signo: i32, key: SignalKey) -> Result<()> {
        if self.pipe.is_none() {
            return Err(Error::NotPrimary);
        }

        if !self.signals.remove(signo, key) {
            return Err(Error::UnknownSignalHandler(signo));
        }
        self.hub.release(signo);

        tracing::debug!(signo, ?key, "unset signal handler");
        Ok(())
    }

    /// Makes [`dispatch`](Self::dispatch) return after the running handler.
    pub fn set_break(&mut self) {
        self.broken = true;
    }

    /// Installs a callback run at the start of every iteration.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut EventLoop) + 'static,
    {
        let callback: Callback = Rc::new(RefCell::new(callback));
        self.callback = Some(callback);
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Runs the loop until [`set_break`](Self::set_break) is called.
    ///
    /// The break request is consumed on return, so the loop can be
    /// dispatched again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Reentrant`] when called from one of the loop's own
    /// handlers.
    ///
    /// # Panics
    ///
    /// Panics if the backend wait fails for a reason other than an
    /// interruption.
    pub fn dispatch(&mut self) -> Result<()> {
        if self.dispatching {
            return Err(Error::Reentrant);
        }
        self.dispatching = true;

        loop {
            if self.broken {
                break;
            }
            self.iteration += 1;

            self.run_callback();
            if self.broken {
                break;
            }

            self.fire_timers();
            self.process_active();
            self.fire_fd_timeouts();
            self.fire_timers();
            if self.broken {
                break;
            }

            let timeout = self.wait_timeout();
            tracing::trace!(iteration = self.iteration, ?timeout, "waiting for events");

            if let Err(err) = self.poller.wait(&mut self.events, timeout) {
                tracing::error!(error = %err, "backend wait failed");
                panic!("backend wait failed: {err}");
            }

            self.queue_events();
        }

        self.broken = false;
        self.dispatching = false;
        Ok(())
    }

    fn run_callback(&mut self) {
        if let Some(callback) = self.callback.clone() {
            (callback.borrow_mut())(self);
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();

        while !self.broken {
            let Some(entry) = self.timers.pop_expired(now) else {
                break;
            };

            tracing::trace!(deadline = ?entry.deadline, "firing timer");
            (entry.handler)(self);
        }
    }

    fn process_active(&mut self) {
        while !self.broken {
            let Some(index) = self.registry.pop_active() else {
                break;
            };

            let descriptor = self.registry.get_mut(index);
            let fd = descriptor.fd;
            let epoch = descriptor.epoch;
            let mut pending = descriptor.ready;

            descriptor.ready = Flags::empty();
            descriptor.in_process = true;
            descriptor.last_active = self.iteration;
            if let Some(node) = descriptor.timeout_node.take() {
                self.timeouts.disarm(node);
            }

            for direction in pending.each_direction() {
                if self.broken || self.registry.get(index).epoch != epoch {
                    break;
                }
                pending = pending - direction;

                let slot = self.registry.get_mut(index).direction_mut(direction);
                let handler = if slot.oneshot {
                    slot.oneshot = false;
                    slot.handler.take()
                } else {
                    slot.handler.clone()
                };

                if let Some(handler) = handler {
                    tracing::trace!(fd, ?direction, "firing fd handler");
                    (handler.borrow_mut())(self, fd, direction);
                }
            }

            self.finish(index, epoch, pending);
        }
    }

    /// Settles a descriptor after its handlers ran: frees it if it was
    /// cleared, re-queues directions a break left unfired, and brings the
    /// kernel in line with what is still registered.
    fn finish(&mut self, index: usize, epoch: u64, pending: Flags) {
        let descriptor = self.registry.get_mut(index);
        descriptor.in_process = false;

        if descriptor.is_pending_clear() {
            self.registry.free(index);
            return;
        }

        if descriptor.epoch == epoch && !pending.is_empty() {
            descriptor.ready |= pending & descriptor.registered();
            if !descriptor.ready.is_empty() {
                self.registry.activate(index);
            }
        }

        self.sync_backend(index, false);
    }

    fn fire_fd_timeouts(&mut self) {
        let now = Instant::now();
        let mut deferred = Vec::new();

        while !self.broken {
            let Some(fd) = self.timeouts.pop_expired(now) else {
                break;
            };

            let Some(index) = self.registry.lookup(fd) else {
                panic!("fd timeout fired for unregistered fd {fd}");
            };

            let descriptor = self.registry.get_mut(index);
            descriptor.timeout_node = None;
            if descriptor.last_active == self.iteration {
                deferred.push(fd);
                continue;
            }

            let Some(handler) = descriptor.timeout_handler.clone() else {
                tracing::warn!(fd, "fd timeout expired without a timeout handler");
                continue;
            };

            let epoch = descriptor.epoch;
            descriptor.in_process = true;

            tracing::trace!(fd, "firing fd timeout");
            (handler.borrow_mut())(self, fd);

            self.finish(index, epoch, Flags::empty());
        }

        // Handled as active this iteration; expire on the next one. Handlers
        // that ran since may have cleared the descriptor or armed a new
        // timeout for it, and both win over the deferred one.
        for fd in deferred {
            let Some(index) = self.registry.lookup(fd) else {
                continue;
            };

            let descriptor = self.registry.get_mut(index);
            if descriptor.is_pending_clear() || descriptor.timeout_node.is_some() {
                continue;
            }
            descriptor.timeout_node = Some(self.timeouts.arm(None, fd, now));
        }
    }

    fn wait_timeout(&self) -> Option<Duration> {
        let next = match (self.timers.next_deadline(), self.timeouts.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }?;

        let remaining = next.saturating_duration_since(Instant::now());
        Some(remaining.min(self.tick))
    }

    /// Moves reported readiness onto the active list.
    fn queue_events(&mut self) {
        let events = std::mem::take(&mut self.events);

        for event in &events {
            let Some(index) = self.registry.lookup(event.fd) else {
                continue;
            };

            let descriptor = self.registry.get_mut(index);
            if descriptor.is_pending_clear() {
                continue;
            }

            let ready = event.ready & descriptor.interest().directions;
            if ready.is_empty() {
                continue;
            }

            let rearm = descriptor.armed.is_some_and(|armed| !armed.oneshot.is_empty());
            descriptor.ready |= ready;
            self.registry.activate(index);

            if rearm {
                self.sync_backend(index, true);
            }
        }

        self.events = events;
    }

    /// Brings the kernel's interest for a descriptor in line with its
    /// registrations.
    ///
    /// `force` re-arms even when nothing changed, for backends that disarm
    /// the whole descriptor after a oneshot event.
    fn sync_backend(&mut self, index: usize, force: bool) {
        let descriptor = self.registry.get_mut(index);
        let fd = descriptor.fd;
        let wanted = descriptor.interest();

        let result = match descriptor.armed {
            None if wanted.is_empty() => return,
            None => self.poller.register(fd, wanted),
            Some(_) if wanted.is_empty() => self.poller.unregister(fd),
            Some(armed) if armed != wanted || force => self.poller.modify(fd, wanted),
            Some(_) => return,
        };

        if let Err(err) = result {
            fatal("sync", fd, &err);
        }

        descriptor.armed = (!wanted.is_empty()).then_some(wanted);
    }

    /// Runs the handlers for every signal number waiting in the pipe.
    fn deliver_signals(&mut self, fd: RawFd) {
        for signo in signal::drain(fd) {
            tracing::trace!(signo, "delivering signal");

            for (key, handler) in self.signals.snapshot(signo) {
                // Unset by an earlier handler of this delivery.
                if !self.signals.contains(signo, key) {
                    continue;
                }
                (handler.borrow_mut())(self, signo);
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        for signo in self.signals.drain() {
            self.hub.release(signo);
        }

        tracing::debug!(
            fds = self.registry.len(),
            timers = self.timers.len(),
            "event loop destroyed"
        );
    }
}

fn fatal(operation: &str, fd: RawFd, err: &io::Error) -> ! {
    tracing::error!(operation, fd, error = %err, "kernel rejected descriptor change");
    panic!("{operation} failed for fd {fd}: {err}");
}
