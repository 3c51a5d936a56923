//! Callback types stored by the loop.
//!
//! Every handler receives the loop itself, so it can add, modify, or remove
//! registrations, including its own. Repeating handlers are reference
//! counted: the dispatcher clones the `Rc` before calling, which keeps the
//! closure alive even if the handler drops its own registration mid-call.

use super::EventLoop;
use super::flags::Flags;

use std::cell::RefCell;
use std::os::fd::RawFd;
use std::rc::Rc;

/// Readiness handler. The `Flags` argument is the single direction firing.
pub(crate) type FdHandler = Rc<RefCell<dyn FnMut(&mut EventLoop, RawFd, Flags)>>;

/// Handler run when a descriptor's timeout expires without activity.
pub(crate) type TimeoutHandler = Rc<RefCell<dyn FnMut(&mut EventLoop, RawFd)>>;

/// One-shot timer handler.
pub(crate) type TimerHandler = Box<dyn FnOnce(&mut EventLoop)>;

/// Signal handler, run on the driving thread with the signal number.
pub(crate) type SignalHandler = Rc<RefCell<dyn FnMut(&mut EventLoop, i32)>>;

/// Per-iteration callback.
pub(crate) type Callback = Rc<RefCell<dyn FnMut(&mut EventLoop)>>;
