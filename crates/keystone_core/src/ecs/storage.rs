//! # Dense Storage
//!
//! Handle-addressed storage backed by a contiguous array.
//!
//! The storage uses a dense array strategy:
//! - Every live element sits in one contiguous `Vec`
//! - Access is O(1) through the handle table
//! - Removal swap-removes the last element into the hole and remaps its handle,
//!   so handles stay valid while dense indices move

use super::handle::{Handle, HandleTable};

/// One stored row: the owning handle plus the data.
#[derive(Clone, Debug)]
pub struct Element<T> {
    /// The handle addressing this row.
    pub handle: Handle<T>,
    /// The row's data.
    pub data: T,
}

/// Dense, handle-addressed storage for a single element type.
///
/// # Example
///
/// ```rust,ignore
/// let mut storage = DenseStorage::new();
/// let h = storage.insert(Light::default());
/// storage[h].radius = 10.0;
/// ```
#[derive(Clone, Debug)]
pub struct DenseStorage<T> {
    handles: HandleTable<T>,
    elements: Vec<Element<T>>,
}

impl<T> Default for DenseStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DenseStorage<T> {
    /// Creates empty storage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handles: HandleTable::new(),
            elements: Vec::new(),
        }
    }

    /// Creates empty storage with room for `capacity` rows.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: HandleTable::with_capacity(capacity),
            elements: Vec::with_capacity(capacity),
        }
    }

    /// Appends a row and returns its handle.
    pub fn insert(&mut self, data: T) -> Handle<T> {
        let handle = self.handles.get_new_handle();
        self.handles.set(handle, self.elements.len());
        self.elements.push(Element { handle, data });
        handle
    }

    /// Removes a row, moving the last row into its place.
    ///
    /// # Returns
    ///
    /// The removed data, or `None` for a stale handle.
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let index = self.handles.get(handle)?;
        self.handles.remove_handle(handle);
        let removed = self.elements.swap_remove(index);
        if let Some(moved) = self.elements.get(index) {
            self.handles.set(moved.handle, index);
        }
        Some(removed.data)
    }

    /// Checks whether the handle refers to a live row.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.handles.contains(handle)
    }

    /// Gets a row by handle.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let index = self.handles.get(handle)?;
        self.elements.get(index).map(|e| &e.data)
    }

    /// Gets a mutable row by handle.
    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let index = self.handles.get(handle)?;
        self.elements.get_mut(index).map(|e| &mut e.data)
    }

    /// Number of live rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if there are no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates rows in dense order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.elements.iter().map(|e| (e.handle, &e.data))
    }

    /// Iterates rows mutably in dense order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.elements.iter_mut().map(|e| (e.handle, &mut e.data))
    }

    /// Handles of all live rows, in dense order.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.elements.iter().map(|e| e.handle)
    }

    /// The raw dense rows.
    #[inline]
    #[must_use]
    pub fn elements(&self) -> &[Element<T>] {
        &self.elements
    }

    /// Removes every row, returning the data in dense order.
    pub fn drain(&mut self) -> Vec<T> {
        self.handles.clear();
        self.elements.drain(..).map(|e| e.data).collect()
    }
}

impl<T: Clone> DenseStorage<T> {
    /// Snapshot of every row's data in dense order.
    #[must_use]
    pub fn elements_copy(&self) -> Vec<T> {
        self.elements.iter().map(|e| e.data.clone()).collect()
    }
}

impl<T> std::ops::Index<Handle<T>> for DenseStorage<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        let index = self.handles[handle] as usize;
        &self.elements[index].data
    }
}

impl<T> std::ops::IndexMut<Handle<T>> for DenseStorage<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        let index = self.handles[handle] as usize;
        &mut self.elements[index].data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_remove_keeps_handles_valid() {
        let mut storage = DenseStorage::new();
        let handles: Vec<_> = (0..5).map(|i| storage.insert(i * 10)).collect();

        assert_eq!(storage.remove(handles[1]), Some(10));
        assert_eq!(storage.len(), 4);
        assert_eq!(storage.get(handles[1]), None);

        for (i, &h) in handles.iter().enumerate() {
            if i != 1 {
                assert_eq!(storage[h], i * 10);
            }
        }
        // The last row moved into the hole.
        assert_eq!(storage.elements()[1].handle, handles[4]);
    }

    #[test]
    fn test_remove_last_and_stale() {
        let mut storage = DenseStorage::new();
        let a = storage.insert("a");
        let b = storage.insert("b");
        assert_eq!(storage.remove(b), Some("b"));
        assert_eq!(storage.remove(b), None);
        assert_eq!(storage[a], "a");

        storage[a] = "z";
        assert_eq!(storage.elements_copy(), vec!["z"]);
    }

    #[test]
    fn test_drain_invalidates() {
        let mut storage = DenseStorage::new();
        let a = storage.insert(1);
        storage.insert(2);
        assert_eq!(storage.drain(), vec![1, 2]);
        assert!(storage.is_empty());
        assert!(!storage.contains(a));
    }
}
