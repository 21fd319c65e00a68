//! Advisory busy flags.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts operations in flight. Callers may check it to avoid duplicate
/// requests; nothing is blocked by it.
#[derive(Debug, Default)]
pub(crate) struct BusyCounter(AtomicUsize);

impl BusyCounter {
    /// Mark an operation as started until the guard is dropped
    pub(crate) fn enter(&self) -> BusyGuard<'_> {
        self.0.fetch_add(1, Ordering::SeqCst);
        BusyGuard(&self.0)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst) > 0
    }
}

/// Decrements the counter however the operation ends, including abort
pub(crate) struct BusyGuard<'a>(&'a AtomicUsize);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
