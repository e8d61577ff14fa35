//! Pending data requests — correlation handles awaiting completion.
//!
//! Owned by the coordinator, so no locking. A handle is issued before its
//! resolution starts and removed when it completes. Removal is what
//! makes delivery exactly-once: a second completion for the same handle
//! finds nothing and is dropped.

use std::collections::HashMap;

/// Opaque number correlating an asynchronous data request with its
/// eventual completion.
///
/// Allocated from a monotonically increasing counter starting at 1 and
/// never reused within a broker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationHandle(i64);

impl CorrelationHandle {
    pub fn get(self) -> i64 {
        self.0
    }
}

/// Table of in-flight requests, each carrying its completion target.
#[derive(Debug)]
pub(crate) struct PendingRequests<T> {
    next: i64,
    entries: HashMap<CorrelationHandle, T>,
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    /// Allocate a fresh handle for `target`.
    pub fn issue(&mut self, target: T) -> CorrelationHandle {
        let handle = CorrelationHandle(self.next);
        self.next += 1;
        self.entries.insert(handle, target);
        handle
    }

    /// Remove and return the target for `handle`. `None` when the handle
    /// was never issued or has already completed.
    pub fn take(&mut self, handle: CorrelationHandle) -> Option<T> {
        self.entries.remove(&handle)
    }

    /// Return a taken target to the table without reissuing its handle.
    pub fn restore(&mut self, handle: CorrelationHandle, target: T) {
        self.entries.insert(handle, target);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove everything still pending, oldest handle first.
    pub fn drain(&mut self) -> Vec<(CorrelationHandle, T)> {
        let mut drained: Vec<_> = self.entries.drain().collect();
        drained.sort_by_key(|(handle, _)| *handle);
        drained
    }
}
