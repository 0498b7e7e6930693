//! # Component Definitions
//!
//! A component is one authoritative store per component ID. Domain modules
//! (transforms, lights, visibility, ...) implement [`ComponentStore`]; game
//! objects hold views that point into those stores.

use std::any::Any;
use std::sync::Arc;

use crate::ecs::view::GameObject;
use crate::error::CoreResult;

/// Stable identifier of a component store.
pub type ComponentId = u32;

/// Key into a loading [`ValueMap`].
pub type ValueKey = u32;

/// One side-channel value handed to loading hooks.
pub type KeyValue<'a> = (ValueKey, &'a dyn Any);

/// Side-channel values (loading contexts, physics layers, ...) handed to
/// [`ComponentStore::add_component_view`].
pub type ValueMap<'a> = [KeyValue<'a>];

/// Derives a component ID from a name (32-bit FNV-1a).
///
/// Usable in `const` position so every store can declare its ID statically.
#[must_use]
pub const fn component_id(name: &str) -> ComponentId {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0x811c_9dc5;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(0x0100_0193);
        i += 1;
    }
    hash
}

/// Finds a typed value in a value map.
///
/// # Returns
///
/// `None` if the key is absent or holds a value of another type.
#[must_use]
pub fn find_value<'a, T: Any>(values: &ValueMap<'a>, key: ValueKey) -> Option<&'a T> {
    values
        .iter()
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| v.downcast_ref::<T>())
}

/// A serialized component attached to an entity description.
#[derive(Clone, Copy, Debug)]
pub struct ComponentBlob<'a> {
    /// Target component store.
    pub id: ComponentId,
    /// Raw bytes interpreted by the store's loading hook.
    pub bytes: &'a [u8],
}

impl<'a> ComponentBlob<'a> {
    /// Creates a blob for a component.
    #[must_use]
    pub const fn new(id: ComponentId, bytes: &'a [u8]) -> Self {
        Self { id, bytes }
    }
}

/// Object-safe interface of a component store held by the registry.
pub trait ComponentStore: Any + Send + Sync {
    /// The store's component ID.
    fn id(&self) -> ComponentId;

    /// Human-readable store name used in logs.
    fn name(&self) -> &'static str;

    /// Number of live rows.
    fn row_count(&self) -> usize;

    /// Deserializes a view onto `go` from a blob plus side-channel values.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is malformed or a required value is missing.
    fn add_component_view(
        self: Arc<Self>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()>;
}

/// A component store with a statically known ID.
pub trait Component: ComponentStore + Sized {
    /// Unique ID for this component.
    const ID: ComponentId;

    /// Human-readable name.
    const NAME: &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_is_stable() {
        const A: ComponentId = component_id("Transform");
        assert_eq!(A, component_id("Transform"));
        assert_ne!(A, component_id("Light"));
        assert_eq!(component_id(""), 0x811c_9dc5);
    }

    #[test]
    fn test_find_value() {
        let layer = 7_u32;
        let name = String::from("ctx");
        let values: [KeyValue<'_>; 2] = [(1, &layer), (2, &name)];

        assert_eq!(find_value::<u32>(&values, 1), Some(&7));
        assert_eq!(find_value::<String>(&values, 2).map(String::as_str), Some("ctx"));
        assert_eq!(find_value::<u32>(&values, 2), None);
        assert_eq!(find_value::<u32>(&values, 3), None);
    }
}
