//! # Component Registry
//!
//! One authoritative store per component ID, shared by every domain module.
//! The registry is an explicit object passed around by `Arc`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::component::{Component, ComponentBlob, ComponentId, ComponentStore, ValueMap};
use super::view::GameObject;
use crate::error::{CoreError, CoreResult};

struct Entry {
    store: Arc<dyn ComponentStore>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Registry of component stores keyed by component ID.
#[derive(Default)]
pub struct Registry {
    components: RwLock<HashMap<ComponentId, Entry>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.component_list())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a store under its component ID.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyRegistered`] if the ID is taken.
    pub fn register<C: Component>(&self, component: Arc<C>) -> CoreResult<Arc<C>> {
        let mut components = self.components.write();
        if components.contains_key(&C::ID) {
            tracing::error!(id = C::ID, name = C::NAME, "component registered twice");
            return Err(CoreError::AlreadyRegistered {
                id: C::ID,
                name: C::NAME,
            });
        }
        components.insert(
            C::ID,
            Entry {
                store: component.clone(),
                any: component.clone(),
            },
        );
        tracing::debug!(id = C::ID, name = C::NAME, "component registered");
        Ok(component)
    }

    /// Returns the store registered for `C`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] before registration and
    /// [`CoreError::StoreTypeMismatch`] if another store type owns the ID.
    pub fn get<C: Component>(&self) -> CoreResult<Arc<C>> {
        let components = self.components.read();
        let entry = components
            .get(&C::ID)
            .ok_or(CoreError::NotInitialized(C::ID))?;
        entry
            .any
            .clone()
            .downcast::<C>()
            .map_err(|_| CoreError::StoreTypeMismatch(C::ID))
    }

    /// Returns a store by ID, type-erased.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] if nothing is registered under `id`.
    pub fn component(&self, id: ComponentId) -> CoreResult<Arc<dyn ComponentStore>> {
        self.components
            .read()
            .get(&id)
            .map(|e| e.store.clone())
            .ok_or(CoreError::NotInitialized(id))
    }

    /// Checks whether a store is registered under `id`.
    #[must_use]
    pub fn is_available(&self, id: ComponentId) -> bool {
        self.components.read().contains_key(&id)
    }

    /// Removes a store. Outstanding `Arc`s keep it alive.
    pub fn unregister(&self, id: ComponentId) -> Option<Arc<dyn ComponentStore>> {
        self.components.write().remove(&id).map(|e| e.store)
    }

    /// `(id, name)` of every registered store, sorted by ID.
    #[must_use]
    pub fn component_list(&self) -> Vec<(ComponentId, &'static str)> {
        let mut list: Vec<_> = self
            .components
            .read()
            .iter()
            .map(|(&id, e)| (id, e.store.name()))
            .collect();
        list.sort_unstable_by_key(|&(id, _)| id);
        list
    }

    /// Forwards one blob to its store's loading hook.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInitialized`] for unknown stores, or the hook's error.
    pub fn add_component_view(
        &self,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &ComponentBlob<'_>,
    ) -> CoreResult<()> {
        let store = self.component(blob.id)?;
        store.add_component_view(go, values, blob.bytes)
    }

    /// Populates a game object from a list of component blobs, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing blob and returns its error.
    pub fn populate(
        &self,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blobs: &[ComponentBlob<'_>],
    ) -> CoreResult<()> {
        for blob in blobs {
            self.add_component_view(go, values, blob)?;
        }
        Ok(())
    }
}
