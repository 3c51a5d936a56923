//! Error types for fallible reactor operations.
//!
//! Only conditions a caller can react to are reported here. Misuse of the
//! registration API (negative descriptors, contradictory flags) and kernel
//! calls that fail in ways that would desynchronize the registry from the
//! kernel are treated as bugs and panic instead.

use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

/// Main error type for reactor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// An OS resource (poller instance, notification pipe) could not be created.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The descriptor cannot be watched by the active backend.
    #[error("fd {fd} exceeds the backend limit of {limit}")]
    FdOutOfRange { fd: RawFd, limit: usize },

    /// The signal number is out of range or cannot be caught.
    #[error("signal {0} cannot be handled")]
    InvalidSignal(i32),

    /// Another signal hub already installed the process handler for this signal.
    #[error("signal {0} is owned by another signal hub")]
    SignalOwned(i32),

    /// Signals can only be registered on a primary loop.
    #[error("signal handlers require a primary event loop")]
    NotPrimary,

    /// No handler with this key is registered for the signal.
    #[error("no handler registered for signal {0} with this key")]
    UnknownSignalHandler(i32),

    /// The signal hub has no free fan-out slot for another loop.
    #[error("signal hub supports at most {0} primary loops")]
    TooManyLoops(usize),

    /// `dispatch` was called from inside one of the loop's own handlers.
    #[error("dispatch called re-entrantly from a handler")]
    Reentrant,
}

/// Result type alias for reactor operations.
pub type Result<T> = std::result::Result<T, Error>;
