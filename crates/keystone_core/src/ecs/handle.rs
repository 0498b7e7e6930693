//! # Handles
//!
//! Handles are stable identifiers for rows in dense storage:
//! - An index into the handle table's slot array
//! - A generation counter for detecting stale references
//!
//! The table maps each live handle to a dense index. Released slots form an
//! intrusive LIFO free list: the next-free link lives in the unused slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Free-list terminator.
const FREE_LIST_END: u32 = u32::MAX;

/// Typed identifier of a row owned by a [`HandleTable`].
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index in the handle table
/// - Upper 32 bits: Generation counter for detecting stale references
#[repr(transparent)]
pub struct Handle<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            raw: ((generation as u64) << 32) | (index as u64),
            _marker: PhantomData,
        }
    }

    /// Null/invalid handle.
    pub const INVALID: Self = Self {
        raw: u64::MAX,
        _marker: PhantomData,
    };

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.raw as u32
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.raw >> 32) as u32
    }

    /// Checks if this is the invalid handle.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.raw == u64::MAX
    }

    /// Packed 64-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.raw
    }

    /// Rebuilds a handle from [`Handle::to_bits`].
    #[inline]
    #[must_use]
    pub const fn from_bits(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Reinterprets the handle for another element type.
    #[inline]
    #[must_use]
    pub const fn cast<U>(self) -> Handle<U> {
        Handle::from_bits(self.raw)
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            f.write_str("Handle(INVALID)")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Dense index while occupied, next free slot while free.
    value: u32,
    generation: u32,
    occupied: bool,
}

/// Maps handles to dense indices with O(1) create, lookup and release.
#[derive(Clone)]
pub struct HandleTable<T> {
    slots: Vec<Slot>,
    free_head: u32,
    live: usize,
    /// Slot count at which the table is exhausted.
    max_slots: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl<T> HandleTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: FREE_LIST_END,
            live: 0,
            max_slots: FREE_LIST_END,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    fn with_slot_limit(max_slots: u32) -> Self {
        Self {
            max_slots,
            ..Self::new()
        }
    }

    /// Creates an empty table with room for `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::new()
        }
    }

    /// Returns a fresh handle, reusing the most recently released slot first.
    ///
    /// The handle maps to dense index `0` until [`HandleTable::set`] is called.
    ///
    /// # Panics
    ///
    /// Panics if the table would exceed `u32::MAX - 1` slots.
    pub fn get_new_handle(&mut self) -> Handle<T> {
        if self.free_head != FREE_LIST_END {
            let index = self.free_head;
            let slot = &mut self.slots[index as usize];
            self.free_head = slot.value;
            slot.value = 0;
            slot.occupied = true;
            self.live += 1;
            return Handle::new(index, slot.generation);
        }

        assert!(
            self.slots.len() < self.max_slots as usize,
            "Handle table exhausted!"
        );
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            value: 0,
            generation: 0,
            occupied: true,
        });
        self.live += 1;
        Handle::new(index, 0)
    }

    /// Releases a handle. Returns `false` for stale or invalid handles.
    pub fn remove_handle(&mut self, handle: Handle<T>) -> bool {
        if !self.contains(handle) {
            return false;
        }
        let slot = &mut self.slots[handle.index() as usize];
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.value = self.free_head;
        self.free_head = handle.index();
        self.live -= 1;
        true
    }

    /// Checks whether the handle refers to a live slot.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.slots
            .get(handle.index() as usize)
            .is_some_and(|s| s.occupied && s.generation == handle.generation())
    }

    /// Dense index of a live handle.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<usize> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.occupied && s.generation == handle.generation())
            .map(|s| s.value as usize)
    }

    /// Points a live handle at a dense index. Returns `false` for stale handles.
    #[inline]
    pub fn set(&mut self, handle: Handle<T>, dense_index: usize) -> bool {
        match self.slots.get_mut(handle.index() as usize) {
            Some(slot) if slot.occupied && slot.generation == handle.generation() => {
                slot.value = u32::try_from(dense_index).unwrap_or(FREE_LIST_END);
                true
            }
            _ => false,
        }
    }

    /// Finds the live handle currently mapped to `dense_index`.
    ///
    /// This is a linear scan.
    #[must_use]
    pub fn find(&self, dense_index: usize) -> Option<Handle<T>> {
        self.slots.iter().enumerate().find_map(|(i, s)| {
            (s.occupied && s.value as usize == dense_index)
                .then(|| Handle::new(i as u32, s.generation))
        })
    }

    /// Number of live handles.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no handle is live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Releases every handle. Outstanding handles become stale.
    pub fn clear(&mut self) {
        self.free_head = FREE_LIST_END;
        for index in (0..self.slots.len()).rev() {
            let slot = &mut self.slots[index];
            if slot.occupied {
                slot.generation = slot.generation.wrapping_add(1);
                slot.occupied = false;
            }
            slot.value = self.free_head;
            self.free_head = index as u32;
        }
        self.live = 0;
    }
}

impl<T> std::ops::Index<Handle<T>> for HandleTable<T> {
    type Output = u32;

    /// # Panics
    ///
    /// Panics on a stale or invalid handle.
    fn index(&self, handle: Handle<T>) -> &u32 {
        match self.slots.get(handle.index() as usize) {
            Some(slot) if slot.occupied && slot.generation == handle.generation() => &slot.value,
            _ => panic!("Stale handle {handle:?} used to index handle table!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tag;

    #[test]
    fn test_handle_roundtrip() {
        let h: Handle<Tag> = Handle::new(12345, 67890);
        assert_eq!(h.index(), 12345);
        assert_eq!(h.generation(), 67890);
        assert_eq!(Handle::<Tag>::from_bits(h.to_bits()), h);
        assert!(Handle::<Tag>::default().is_invalid());
    }

    #[test]
    fn test_lifo_reuse_bumps_generation() {
        let mut table = HandleTable::<Tag>::new();
        let a = table.get_new_handle();
        let b = table.get_new_handle();
        let c = table.get_new_handle();

        assert!(table.remove_handle(a));
        assert!(table.remove_handle(c));

        let d = table.get_new_handle();
        let e = table.get_new_handle();
        assert_eq!(d.index(), c.index());
        assert_eq!(e.index(), a.index());
        assert_ne!(d.generation(), c.generation());
        assert!(!table.contains(a));
        assert!(table.contains(b));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_exhaustion_keeps_live_count() {
        let mut table = HandleTable::<Tag>::with_slot_limit(2);
        let a = table.get_new_handle();
        table.get_new_handle();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            table.get_new_handle();
        }));
        assert!(result.is_err());
        assert_eq!(table.len(), 2);

        // Released slots are still handed out at the limit.
        assert!(table.remove_handle(a));
        assert_eq!(table.get_new_handle().index(), a.index());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut table = HandleTable::<Tag>::new();
        let a = table.get_new_handle();
        assert!(table.set(a, 7));
        assert_eq!(table.get(a), Some(7));
        assert_eq!(table[a], 7);

        table.remove_handle(a);
        assert_eq!(table.get(a), None);
        assert!(!table.set(a, 3));
        assert!(!table.remove_handle(a));
        assert!(!table.remove_handle(Handle::INVALID));
    }

    #[test]
    #[should_panic(expected = "Stale handle")]
    fn test_index_panics_on_stale() {
        let mut table = HandleTable::<Tag>::new();
        let a = table.get_new_handle();
        table.remove_handle(a);
        let _ = table[a];
    }

    #[test]
    fn test_find_and_clear() {
        let mut table = HandleTable::<Tag>::new();
        let a = table.get_new_handle();
        let b = table.get_new_handle();
        table.set(a, 0);
        table.set(b, 1);
        assert_eq!(table.find(1), Some(b));

        table.clear();
        assert!(table.is_empty());
        assert!(!table.contains(a));
        let c = table.get_new_handle();
        assert_eq!(c.index(), 0);
    }
}
