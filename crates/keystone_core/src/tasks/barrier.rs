//! # Work Barrier
//!
//! Counts outstanding work items. Joining threads keep executing pool work
//! until the count reaches zero, so a join never idles while runnable work
//! exists.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use super::pool::{ThreadPool, WorkerContext};

/// Completion counter that joining threads help drain.
#[derive(Debug)]
pub struct WorkBarrier {
    remaining: AtomicUsize,
    lock: Mutex<()>,
    signal: Condvar,
}

impl WorkBarrier {
    /// Creates a barrier waiting on `count` completions.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            lock: Mutex::new(()),
            signal: Condvar::new(),
        }
    }

    /// Adds `count` more expected completions.
    pub fn add(&self, count: usize) {
        self.remaining.fetch_add(count, Ordering::AcqRel);
    }

    /// Signals one completion.
    ///
    /// # Returns
    ///
    /// `true` if this was the last outstanding item.
    ///
    /// # Panics
    ///
    /// Panics if more completions are signalled than were expected.
    pub fn complete(&self) -> bool {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "Work barrier completed too many times!");
        if previous == 1 {
            let _guard = self.lock.lock();
            self.signal.notify_all();
            return true;
        }
        false
    }

    /// Outstanding completions.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// `true` once every expected completion arrived.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Runs pool work on the current thread until the barrier completes.
    pub fn join(&self, ctx: &WorkerContext) {
        while !self.is_complete() {
            if ctx.run_one() {
                continue;
            }
            let mut guard = self.lock.lock();
            if !self.is_complete() {
                self.signal.wait_for(&mut guard, ctx.idle_poll());
            }
        }
    }

    /// Joins from a thread outside the pool.
    pub fn join_local(&self, pool: &ThreadPool) {
        let ctx = pool.external_context();
        self.join(&ctx);
    }
}
