use crate::error::Result;
use crate::reactor::{BackendKind, EventLoop, SignalHub};

use std::time::Duration;

/// Builder for configuring and creating an event loop.
///
/// `LoopBuilder` allows customizing the loop before constructing it: the
/// readiness backend, the wait tick, whether the loop receives signals, the
/// size of the event buffer, and the signal hub it joins.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use vigil::{BackendKind, LoopBuilder};
///
/// let event_loop = LoopBuilder::new()
///     .backend(BackendKind::Select)
///     .tick(Duration::from_millis(5))
///     .build()?;
/// # Ok::<(), vigil::Error>(())
/// ```
pub struct LoopBuilder {
    pub(crate) backend: BackendKind,
    /// Longest wait while timers or fd timeouts are pending.
    pub(crate) tick: Duration,
    pub(crate) primary: bool,
    /// Events collected per backend wait.
    pub(crate) event_capacity: usize,
    pub(crate) signal_hub: &'static SignalHub,
}

impl LoopBuilder {
    /// Creates a new `LoopBuilder` with default configuration.
    ///
    /// By default the loop uses the best backend for the target, a 10 ms
    /// tick, room for 64 events per wait, the global signal hub, and is not
    /// primary.
    pub fn new() -> Self {
        Self {
            backend: BackendKind::Auto,
            tick: Duration::from_millis(10),
            primary: false,
            event_capacity: 64,
            signal_hub: SignalHub::global(),
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the longest time a wait may block while deadlines are pending.
    ///
    /// # Panics
    ///
    /// Panics if `tick` is zero.
    pub fn tick(mut self, tick: Duration) -> Self {
        assert!(!tick.is_zero(), "tick must be > 0");

        self.tick = tick;
        self
    }

    /// Makes the loop primary: it owns a notification pipe and can register
    /// signal handlers.
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "event_capacity must be > 0");

        self.event_capacity = capacity;
        self
    }

    /// Uses `hub` instead of [`SignalHub::global`].
    pub fn signal_hub(mut self, hub: &'static SignalHub) -> Self {
        self.signal_hub = hub;
        self
    }

    /// Builds the loop with the configured options.
    ///
    /// # Errors
    ///
    /// Fails if the backend is unavailable on this target or if an OS
    /// resource (poller instance, notification pipe) cannot be created.
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_builder(self)
    }
}

impl Default for LoopBuilder {
    /// Creates a default `LoopBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
