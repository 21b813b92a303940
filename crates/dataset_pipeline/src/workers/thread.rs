//! Thread-local storage for worker identification.
//!
//! Every pool thread records its index here on startup so that log events
//! emitted from deep inside row reading or batch building can be attributed
//! to the worker that produced them.

use std::cell::Cell;

thread_local! {
    /// Index of the current pool worker (0 to num_workers-1).
    ///
    /// Threads that are not pool workers (the caller's thread, test threads)
    /// report `None`.
    pub static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Returns the pool worker index of the calling thread, if any.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

pub(crate) fn set_worker_id(worker_id: usize) {
    WORKER_ID.with(|id| id.set(Some(worker_id)));
}
