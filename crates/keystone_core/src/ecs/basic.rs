//! # Basic Component Storage
//!
//! The common component shape: a dense array of `{handle, T}` rows behind a
//! lock, with views that own exactly one row each.

use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use super::component::{Component, ComponentId, ComponentStore, ValueMap};
use super::handle::Handle;
use super::storage::DenseStorage;
use super::view::{GameObject, View};
use crate::error::{CoreError, CoreResult};

/// Row type stored in a [`BasicComponent`].
pub trait ComponentData: Sized + Send + Sync + 'static {
    /// Component ID of the store holding this row type.
    const ID: ComponentId;

    /// Human-readable store name.
    const NAME: &'static str;

    /// Loading hook: builds a view for `go` from a blob.
    ///
    /// Row types that cannot be loaded keep the default, which rejects
    /// every blob.
    ///
    /// # Errors
    ///
    /// Implementations return an error for malformed blobs or missing values.
    /// The default returns [`CoreError::NoLoadingHook`].
    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let _ = (component, go, values);
        tracing::error!(
            component = Self::NAME,
            bytes = blob.len(),
            "blob for a component without loading hook"
        );
        Err(CoreError::NoLoadingHook {
            id: Self::ID,
            name: Self::NAME,
        })
    }
}

/// Dense, lock-protected storage for one component row type.
pub struct BasicComponent<T> {
    storage: RwLock<DenseStorage<T>>,
}

impl<T: ComponentData> Default for BasicComponent<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComponentData> BasicComponent<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: RwLock::new(DenseStorage::new()),
        }
    }

    /// Creates an empty store behind an `Arc`, ready for registration.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Appends a row.
    pub fn create(&self, data: T) -> Handle<T> {
        self.storage.write().insert(data)
    }

    /// Swap-removes a row.
    pub fn remove(&self, handle: Handle<T>) -> Option<T> {
        self.storage.write().remove(handle)
    }

    /// Checks whether a row is live.
    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.storage.read().contains(handle)
    }

    /// Read guard on one row.
    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.storage.read(), |s| s.get(handle)).ok()
    }

    /// Write guard on one row.
    #[must_use]
    pub fn get_mut(&self, handle: Handle<T>) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.storage.write(), |s| s.get_mut(handle)).ok()
    }

    /// Read guard on the whole storage.
    pub fn read(&self) -> RwLockReadGuard<'_, DenseStorage<T>> {
        self.storage.read()
    }

    /// Write guard on the whole storage.
    pub fn write(&self) -> RwLockWriteGuard<'_, DenseStorage<T>> {
        self.storage.write()
    }

    /// Number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.read().len()
    }

    /// Returns `true` if the store has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.read().is_empty()
    }
}

impl<T: ComponentData + Clone> BasicComponent<T> {
    /// Snapshot of every row.
    #[must_use]
    pub fn elements_copy(&self) -> Vec<T> {
        self.storage.read().elements_copy()
    }
}

impl<T: ComponentData> ComponentStore for BasicComponent<T> {
    fn id(&self) -> ComponentId {
        T::ID
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn add_component_view(
        self: Arc<Self>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        T::add_component_view(&self, go, values, blob)
    }
}

impl<T: ComponentData> Component for BasicComponent<T> {
    const ID: ComponentId = T::ID;
    const NAME: &'static str = T::NAME;
}

/// A view owning one row of a [`BasicComponent`]. Dropping it removes the row.
pub struct BasicView<T: ComponentData> {
    handle: Handle<T>,
    component: Arc<BasicComponent<T>>,
}

impl<T: ComponentData> BasicView<T> {
    /// Creates a row and a view owning it.
    #[must_use]
    pub fn new(component: &Arc<BasicComponent<T>>, data: T) -> Self {
        Self {
            handle: component.create(data),
            component: Arc::clone(component),
        }
    }

    /// Handle of the owned row.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> Handle<T> {
        self.handle
    }

    /// The store the row lives in.
    #[inline]
    #[must_use]
    pub fn component(&self) -> &Arc<BasicComponent<T>> {
        &self.component
    }

    /// Read guard on the owned row.
    ///
    /// # Panics
    ///
    /// Panics if the row was removed from the store behind the view's back.
    #[must_use]
    pub fn get(&self) -> MappedRwLockReadGuard<'_, T> {
        self.component
            .get(self.handle)
            .unwrap_or_else(|| panic!("{} row released under a live view!", T::NAME))
    }

    /// Write guard on the owned row.
    ///
    /// # Panics
    ///
    /// Panics if the row was removed from the store behind the view's back.
    #[must_use]
    pub fn get_mut(&self) -> MappedRwLockWriteGuard<'_, T> {
        self.component
            .get_mut(self.handle)
            .unwrap_or_else(|| panic!("{} row released under a live view!", T::NAME))
    }
}

impl<T: ComponentData> Drop for BasicView<T> {
    fn drop(&mut self) {
        self.component.remove(self.handle);
    }
}

impl<T: ComponentData> View for BasicView<T> {
    const COMPONENT_ID: ComponentId = T::ID;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::component_id;

    #[derive(Clone, Debug, PartialEq)]
    struct Health(u32);

    impl ComponentData for Health {
        const ID: ComponentId = component_id("Health");
        const NAME: &'static str = "Health";
    }

    #[test]
    fn test_view_owns_row() {
        let store = BasicComponent::<Health>::shared();
        let mut go = GameObject::new();
        let handle = go.add_view(|| BasicView::new(&store, Health(10))).handle();

        assert_eq!(store.len(), 1);
        go.get_view::<BasicView<Health>>().unwrap().get_mut().0 += 5;
        assert_eq!(*store.get(handle).unwrap(), Health(15));

        drop(go);
        assert!(store.is_empty());
        assert!(!store.contains(handle));
    }

    #[test]
    fn test_blob_without_loading_hook_is_rejected() {
        let store = BasicComponent::<Health>::shared();
        let mut go = GameObject::new();
        let err = Arc::clone(&store).add_component_view(&mut go, &[], &[1, 2, 3]);
        assert_eq!(
            err,
            Err(CoreError::NoLoadingHook {
                id: Health::ID,
                name: "Health"
            })
        );
        assert!(store.is_empty());
        assert_eq!(go.len(), 0);
    }

    #[test]
    fn test_swap_remove_through_views() {
        let store = BasicComponent::<Health>::shared();
        let a = BasicView::new(&store, Health(1));
        let b = BasicView::new(&store, Health(2));
        let c = BasicView::new(&store, Health(3));

        drop(a);
        assert_eq!(store.len(), 2);
        assert_eq!(b.get().0, 2);
        assert_eq!(c.get().0, 3);
        assert_eq!(store.elements_copy(), vec![Health(3), Health(2)]);
    }
}
