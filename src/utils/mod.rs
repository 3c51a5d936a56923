//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the crate.
//! In particular, it exposes a [`Slab`] arena that backs both the heap nodes
//! and the descriptor registry, giving them stable indices instead of
//! pointers.

mod slab;

pub(crate) use slab::Slab;
