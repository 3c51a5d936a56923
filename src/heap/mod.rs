//! Priority queues used by the reactor.
//!
//! The reactor keeps two independent deadline queues, one for general timers
//! and one for per-descriptor timeouts. Both are [`FibHeap`]s: inserts and
//! re-arms are O(1) amortized, and only extracting the earliest deadline pays
//! the O(log n) consolidation cost.

mod fibonacci;

pub use fibonacci::{FibHeap, HeapError, NodeId};
