//! # Entity-Component Runtime
//!
//! Handles, dense storage, the component registry, game objects with their
//! type-erased views, and the Apply/Query dispatch over view tuples.

pub mod basic;
pub mod component;
pub mod handle;
pub mod query;
pub mod registry;
pub mod storage;
pub mod view;

pub use basic::{BasicComponent, BasicView, ComponentData};
pub use component::{
    component_id, find_value, Component, ComponentBlob, ComponentId, ComponentStore, KeyValue,
    ValueKey, ValueMap,
};
pub use handle::{Handle, HandleTable};
pub use query::{
    apply, apply_each, apply_ref, query, query_ref, Access, Has, Read, ReadOnlyAccess,
    ReadOnlyViewQuery, Request, RequestSet, ViewQuery, Write,
};
pub use registry::Registry;
pub use storage::{DenseStorage, Element};
pub use view::{ComponentView, GameObject, View, INLINE_VIEW_COUNT};
