//! # Scratch Arena
//!
//! Per-worker temporary memory budget. Update tasks draw their short-lived
//! buffers from the arena of the worker running them; the worker resets the
//! arena after every job.

use std::cell::Cell;

/// A bump-style budget for temporary per-task allocations.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Every worker owns one.
///
/// # Example
///
/// ```rust,ignore
/// let arena = ScratchArena::new(1024 * 1024); // 1MB
///
/// let ids = arena.alloc_vec::<u32>(1000).unwrap_or_default();
///
/// arena.reset();
/// ```
#[derive(Debug)]
pub struct ScratchArena {
    /// Current allocation offset.
    offset: Cell<usize>,
    /// Largest offset seen since creation.
    high_water: Cell<usize>,
    /// Total capacity.
    capacity: usize,
}

impl ScratchArena {
    /// Creates a new arena with the specified capacity in bytes.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            offset: Cell::new(0),
            high_water: Cell::new(0),
            capacity,
        }
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current used space in bytes.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.offset.get()
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used()
    }

    /// Largest number of bytes ever in use at once.
    #[inline]
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water.get()
    }

    fn bump<T>(&self, count: usize) -> bool {
        let size = std::mem::size_of::<T>().saturating_mul(count);
        let align = std::mem::align_of::<T>();

        let offset = self.offset.get();
        let aligned_offset = (offset + align - 1) & !(align - 1);
        let new_offset = aligned_offset.saturating_add(size);

        if new_offset > self.capacity {
            return false;
        }
        self.offset.set(new_offset);
        self.high_water.set(self.high_water.get().max(new_offset));
        true
    }

    /// Allocates `count` default-initialized elements.
    ///
    /// # Returns
    ///
    /// `None` if the budget is exhausted.
    pub fn alloc_vec<T: Default + Clone>(&self, count: usize) -> Option<Vec<T>> {
        if count == 0 {
            return Some(Vec::new());
        }
        self.bump::<T>(count).then(|| vec![T::default(); count])
    }

    /// Returns an empty vector with room for `count` elements.
    ///
    /// Never fails: over-budget requests are still served and logged.
    pub fn vec_with_capacity<T>(&self, count: usize) -> Vec<T> {
        if !self.bump::<T>(count) {
            tracing::warn!(
                requested = count * std::mem::size_of::<T>(),
                remaining = self.remaining(),
                "scratch budget exceeded"
            );
        }
        Vec::with_capacity(count)
    }

    /// Resets the arena. Buffers handed out earlier stay valid; only the budget is reclaimed.
    #[inline]
    pub fn reset(&self) {
        self.offset.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_allocation() {
        let arena = ScratchArena::new(1024);
        let slice = arena.alloc_vec::<f32>(10).unwrap();
        assert_eq!(slice.len(), 10);
        assert_eq!(arena.used(), 40);
    }

    #[test]
    fn test_arena_exhaustion_and_reset() {
        let arena = ScratchArena::new(64);
        assert!(arena.alloc_vec::<u64>(8).is_some());
        assert!(arena.alloc_vec::<u8>(1).is_none());

        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.high_water(), 64);
        assert!(arena.alloc_vec::<u8>(1).is_some());
    }

    #[test]
    fn test_vec_with_capacity_never_fails() {
        let arena = ScratchArena::new(8);
        let v: Vec<u64> = arena.vec_with_capacity(100);
        assert!(v.capacity() >= 100);
    }
}
