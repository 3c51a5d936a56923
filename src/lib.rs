//! # Vigil
//!
//! **Vigil** is a single-threaded callback reactor for Rust, designed as the
//! event core that process supervision, connection buffering, thread
//! bridging, and configuration reload are built on.
//!
//! Unlike future-based runtimes, Vigil drives plain closures: a handler runs
//! when a descriptor becomes ready, when a timer expires, when a descriptor
//! stays idle for too long, or when a POSIX signal arrives. Every handler
//! receives the loop and may change any registration, its own included.
//!
//! Vigil offers:
//!
//! - **One flag vocabulary** over epoll (Linux), kqueue (macOS and the BSDs),
//!   and select
//! - **Timers and per-descriptor timeouts** kept in two Fibonacci heaps
//! - **Signal delivery** on the driving thread through a self-pipe
//! - **Safe self-modification**: clearing a descriptor from its own handler
//!   defers the release until the handler returns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use vigil::{EventLoop, FdTimeout, Flags};
//!
//! let mut event_loop = EventLoop::init(true)?;
//!
//! event_loop.set_fd(0, Flags::RECV | Flags::NONBLOCK, FdTimeout::Unlimited, |_, fd, _| {
//!     println!("fd {fd} is readable");
//! })?;
//!
//! event_loop.set_signal(libc::SIGINT, |event_loop, _| event_loop.set_break())?;
//!
//! event_loop.set_timer(Duration::from_secs(5), |event_loop| {
//!     event_loop.set_break();
//! });
//!
//! event_loop.dispatch()?;
//! # Ok::<(), vigil::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`heap`]: the Fibonacci heap behind both deadline queues

mod builder;
mod error;
mod reactor;
mod utils;

pub mod heap;

pub use builder::LoopBuilder;
pub use error::{Error, Result};
pub use reactor::{
    BackendKind, EventLoop, FdTimeout, Flags, MAX_LOOPS, SignalHub, SignalKey, TimerId,
};
