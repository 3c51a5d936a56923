use crate::reactor::handler::SignalHandler;

use std::collections::BTreeMap;
use std::{iter, mem};

/// Identifies one handler registered with
/// [`EventLoop::set_signal`](crate::EventLoop::set_signal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalKey(u64);

/// Per-loop signal handlers, in registration order for each signal.
#[derive(Default)]
pub(crate) struct SignalTable {
    handlers: BTreeMap<i32, Vec<(SignalKey, SignalHandler)>>,
    next_key: u64,
}

impl SignalTable {
    pub(crate) fn insert(&mut self, signo: i32, handler: SignalHandler) -> SignalKey {
        let key = SignalKey(self.next_key);
        self.next_key += 1;

        self.handlers.entry(signo).or_default().push((key, handler));
        key
    }

    /// Returns `false` if no such registration exists.
    pub(crate) fn remove(&mut self, signo: i32, key: SignalKey) -> bool {
        let Some(list) = self.handlers.get_mut(&signo) else {
            return false;
        };

        let Some(position) = list.iter().position(|(k, _)| *k == key) else {
            return false;
        };

        list.remove(position);
        if list.is_empty() {
            self.handlers.remove(&signo);
        }
        true
    }

    pub(crate) fn contains(&self, signo: i32, key: SignalKey) -> bool {
        self.handlers
            .get(&signo)
            .is_some_and(|list| list.iter().any(|(k, _)| *k == key))
    }

    /// Copy of the handlers for `signo`, so they can run while the table
    /// is being modified.
    pub(crate) fn snapshot(&self, signo: i32) -> Vec<(SignalKey, SignalHandler)> {
        self.handlers.get(&signo).cloned().unwrap_or_default()
    }

    /// Empties the table, yielding one signal number per registration.
    pub(crate) fn drain(&mut self) -> Vec<i32> {
        mem::take(&mut self.handlers)
            .into_iter()
            .flat_map(|(signo, list)| iter::repeat_n(signo, list.len()))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self, signo: i32) -> usize {
        self.handlers.get(&signo).map_or(0, Vec::len)
    }
}
