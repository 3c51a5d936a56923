//! The event reactor: descriptor registry, deadline queues, readiness
//! backends, signal bridge, and the dispatcher tying them together.

mod core;
mod descriptor;
mod flags;
mod handler;
mod poller;
mod registry;
mod signal;
mod timeout;
mod timer;

pub use self::core::EventLoop;
pub use flags::{FdTimeout, Flags};
pub use poller::BackendKind;
pub use signal::{MAX_LOOPS, SignalHub, SignalKey};
pub use timer::TimerId;
