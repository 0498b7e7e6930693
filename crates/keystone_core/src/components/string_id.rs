//! # String IDs
//!
//! A short name per entity (at most 63 bytes) with a cached 64-bit hash, plus
//! the query predicates that find entities by name.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::ecs::{
    component_id, Access, BasicComponent, BasicView, ComponentData, ComponentId, GameObject,
    Read, Request, ValueMap, View, Write,
};
use crate::error::CoreResult;

/// Storage size of a serialized string ID, terminator included.
pub const STRING_ID_LENGTH: usize = 64;

/// 64-bit FNV-1a hash used for string IDs.
#[must_use]
pub const fn string_hash(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

fn truncate_id(id: &str) -> &str {
    if id.len() < STRING_ID_LENGTH {
        return id;
    }
    let mut end = STRING_ID_LENGTH - 1;
    while !id.is_char_boundary(end) {
        end -= 1;
    }
    &id[..end]
}

/// Row of the string ID component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringId {
    id: String,
    hash: u64,
}

impl StringId {
    /// Creates an ID, truncating names that do not fit.
    #[must_use]
    pub fn new(id: &str) -> Self {
        let id = truncate_id(id);
        Self {
            id: id.to_string(),
            hash: string_hash(id),
        }
    }

    /// The name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// Cached hash of the name.
    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }
}

impl ComponentData for StringId {
    const ID: ComponentId = component_id("StringID");
    const NAME: &'static str = "StringID";

    /// The blob is the NUL-padded UTF-8 name.
    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        _values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let len = blob.iter().position(|&b| b == 0).unwrap_or(blob.len());
        let name = String::from_utf8_lossy(&blob[..len]);
        go.add_view(|| StringIdView::new(component, &name)).set_id(&name);
        Ok(())
    }
}

/// Store of string IDs.
pub type StringIdComponent = BasicComponent<StringId>;

/// An entity's name.
pub struct StringIdView {
    inner: BasicView<StringId>,
}

impl View for StringIdView {
    const COMPONENT_ID: ComponentId = StringId::ID;
}

impl StringIdView {
    /// Creates the row and the view.
    #[must_use]
    pub fn new(component: &Arc<StringIdComponent>, id: &str) -> Self {
        Self {
            inner: BasicView::new(component, StringId::new(id)),
        }
    }

    /// The name.
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.get().id.clone()
    }

    /// Cached hash of the name.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.inner.get().hash
    }

    /// Renames the entity.
    pub fn set_id(&self, id: &str) {
        *self.inner.get_mut() = StringId::new(id);
    }

    /// Compares against a name, hash first.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        let row = self.inner.get();
        row.hash == string_hash(truncate_id(id)) && row.id == truncate_id(id)
    }
}

/// The entity's name, if it has one.
#[must_use]
pub fn get_string_id(go: &GameObject) -> Option<String> {
    go.get_view::<StringIdView>().map(StringIdView::id)
}

/// Names the entity, attaching a string ID view if needed.
pub fn set_string_id(go: &mut GameObject, component: &Arc<StringIdComponent>, id: &str) {
    go.add_view(|| StringIdView::new(component, id)).set_id(id);
}

/// Matches any of several names; hands the view back mutably.
#[derive(Clone, Debug, Default)]
pub struct StringQuery<'a> {
    ids: SmallVec<[&'a str; 4]>,
}

impl<'a> StringQuery<'a> {
    /// Matches any name in `ids`.
    #[must_use]
    pub fn new(ids: &[&'a str]) -> Self {
        Self {
            ids: ids.iter().copied().collect(),
        }
    }

    /// Matches exactly one name.
    #[must_use]
    pub fn one(id: &'a str) -> Self {
        Self::new(&[id])
    }

    fn accepts(&self, view: &StringIdView) -> bool {
        self.ids.iter().any(|id| view.matches(id))
    }
}

impl Request for StringQuery<'_> {
    type Access = Write<StringIdView>;

    fn is_valid(&self, view: &<Self::Access as Access>::View) -> bool {
        self.accepts(view)
    }
}

/// Read-only form of [`StringQuery`].
#[derive(Clone, Debug, Default)]
pub struct RoStringQuery<'a>(pub StringQuery<'a>);

impl<'a> RoStringQuery<'a> {
    /// Matches any name in `ids`.
    #[must_use]
    pub fn new(ids: &[&'a str]) -> Self {
        Self(StringQuery::new(ids))
    }
}

impl Request for RoStringQuery<'_> {
    type Access = Read<StringIdView>;

    fn is_valid(&self, view: &StringIdView) -> bool {
        self.0.accepts(view)
    }
}

/// Matches a precomputed name hash.
#[derive(Clone, Copy, Debug)]
pub struct StringHashQuery {
    /// Hash to match, from [`string_hash`].
    pub hash: u64,
}

impl StringHashQuery {
    /// Matches names hashing to `hash`.
    #[must_use]
    pub const fn new(hash: u64) -> Self {
        Self { hash }
    }
}

impl Request for StringHashQuery {
    type Access = Read<StringIdView>;

    fn is_valid(&self, view: &StringIdView) -> bool {
        view.hash() == self.hash
    }
}

/// Matches names accepted by a caller predicate.
pub struct StringPatternQuery<F> {
    pattern: F,
}

impl<F: Fn(&str) -> bool> StringPatternQuery<F> {
    /// Matches names for which `pattern` returns `true`.
    pub const fn new(pattern: F) -> Self {
        Self { pattern }
    }
}

impl<F: Fn(&str) -> bool> Request for StringPatternQuery<F> {
    type Access = Read<StringIdView>;

    fn is_valid(&self, view: &StringIdView) -> bool {
        (self.pattern)(&view.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{query, query_ref, ComponentStore};

    fn named(store: &Arc<StringIdComponent>, name: &str) -> GameObject {
        let mut go = GameObject::new();
        set_string_id(&mut go, store, name);
        go
    }

    #[test]
    fn test_truncates_long_names() {
        let long = "x".repeat(100);
        let id = StringId::new(&long);
        assert_eq!(id.as_str().len(), STRING_ID_LENGTH - 1);

        let multibyte = "é".repeat(40);
        assert!(StringId::new(&multibyte).as_str().len() < STRING_ID_LENGTH);
    }

    #[test]
    fn test_string_queries() {
        let store = StringIdComponent::shared();
        let mut door = named(&store, "door");

        assert!(query(&mut door, &(StringQuery::new(&["window", "door"]),)).is_some());
        assert!(query(&mut door, &(StringQuery::one("window"),)).is_none());
        assert!(query_ref(&door, &(RoStringQuery::new(&["door"]),)).is_some());
        assert!(query_ref(&door, &(StringHashQuery::new(string_hash("door")),)).is_some());
        assert!(query_ref(&door, &(StringPatternQuery::new(|s: &str| s.starts_with("do")),)).is_some());

        if let Some((view,)) = query(&mut door, &(StringQuery::one("door"),)) {
            view.set_id("gate");
        }
        assert_eq!(get_string_id(&door).as_deref(), Some("gate"));
    }

    #[test]
    fn test_blob_loading() {
        let store = StringIdComponent::shared();
        let mut go = GameObject::new();
        let mut blob = [0_u8; STRING_ID_LENGTH];
        blob[..5].copy_from_slice(b"crate");

        Arc::clone(&store).add_component_view(&mut go, &[], &blob).unwrap();
        assert_eq!(get_string_id(&go).as_deref(), Some("crate"));
        assert_eq!(store.len(), 1);
    }
}
