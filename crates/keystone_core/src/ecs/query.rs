//! # Apply / Query Dispatch
//!
//! Fetches a tuple of views from a game object in one pass:
//!
//! ```rust,ignore
//! apply::<(Write<LightView>, Read<SceneVisibilityView>), _>(
//!     &mut go,
//!     |(light, visibility)| light.set_radius(visibility.radius()),
//!     || tracing::warn!("not a light"),
//! );
//! ```
//!
//! [`Read`] and [`Write`] mark the access mode. A read-only game object can
//! only be queried with tuples made entirely of [`Read`] accesses
//! ([`ReadOnlyViewQuery`]), which the compiler enforces.
//!
//! [`Request`]s add predicates on top: a query succeeds only if every view is
//! present and every predicate accepts its view.

use std::marker::PhantomData;

use smallvec::{smallvec, SmallVec};

use super::component::ComponentId;
use super::view::{GameObject, View};

/// Access mode for one view in a query.
pub trait Access: 'static {
    /// The accessed view type.
    type View: View;
    /// What the callback receives.
    type Item<'a>;
    /// `true` for shared access.
    const READ_ONLY: bool;

    /// Converts a mutable view reference into the callback item.
    fn from_mut(view: &mut Self::View) -> Self::Item<'_>;
}

/// An access that only needs a shared reference.
pub trait ReadOnlyAccess: Access {
    /// Converts a shared view reference into the callback item.
    fn from_ref(view: &Self::View) -> Self::Item<'_>;
}

/// Shared access to view `V`.
pub struct Read<V>(PhantomData<fn() -> V>);

/// Exclusive access to view `V`.
pub struct Write<V>(PhantomData<fn() -> V>);

impl<V: View> Access for Read<V> {
    type View = V;
    type Item<'a> = &'a V;
    const READ_ONLY: bool = true;

    #[inline]
    fn from_mut(view: &mut V) -> &V {
        view
    }
}

impl<V: View> ReadOnlyAccess for Read<V> {
    #[inline]
    fn from_ref(view: &V) -> &V {
        view
    }
}

impl<V: View> Access for Write<V> {
    type View = V;
    type Item<'a> = &'a mut V;
    const READ_ONLY: bool = false;

    #[inline]
    fn from_mut(view: &mut V) -> &mut V {
        view
    }
}

/// A set of views fetched together from a game object.
pub trait ViewQuery {
    /// What the callback receives.
    type Items<'a>;

    /// Component IDs the query needs.
    fn component_ids() -> SmallVec<[ComponentId; 8]>;

    /// Checks whether every requested view is attached.
    fn matches(go: &GameObject) -> bool {
        Self::component_ids().iter().all(|&id| go.has_view(id))
    }

    /// Fetches the views, or `None` if any is missing.
    fn fetch_mut(go: &mut GameObject) -> Option<Self::Items<'_>>;
}

/// A view query that only reads.
pub trait ReadOnlyViewQuery: ViewQuery {
    /// Fetches the views from a shared game object.
    fn fetch(go: &GameObject) -> Option<Self::Items<'_>>;
}

impl<V: View> ViewQuery for Read<V> {
    type Items<'a> = &'a V;

    fn component_ids() -> SmallVec<[ComponentId; 8]> {
        smallvec![V::COMPONENT_ID]
    }

    fn fetch_mut(go: &mut GameObject) -> Option<&V> {
        go.get_view::<V>()
    }
}

impl<V: View> ReadOnlyViewQuery for Read<V> {
    fn fetch(go: &GameObject) -> Option<&V> {
        go.get_view::<V>()
    }
}

impl<V: View> ViewQuery for Write<V> {
    type Items<'a> = &'a mut V;

    fn component_ids() -> SmallVec<[ComponentId; 8]> {
        smallvec![V::COMPONENT_ID]
    }

    fn fetch_mut(go: &mut GameObject) -> Option<&mut V> {
        go.get_view_mut::<V>()
    }
}

macro_rules! impl_view_query {
    ($(($A:ident, $a:ident)),+) => {
        impl<$($A: Access),+> ViewQuery for ($($A,)+) {
            type Items<'a> = ($($A::Item<'a>,)+);

            fn component_ids() -> SmallVec<[ComponentId; 8]> {
                smallvec![$(<$A::View as View>::COMPONENT_ID),+]
            }

            fn fetch_mut(go: &mut GameObject) -> Option<Self::Items<'_>> {
                $(let mut $a = None;)+
                // Single pass over the view list; every view is borrowed at most once.
                for (id, view) in go.views_mut() {
                    $(
                        if $a.is_none() && id == <$A::View as View>::COMPONENT_ID {
                            $a = view.as_any_mut().downcast_mut::<$A::View>().map($A::from_mut);
                            continue;
                        }
                    )+
                }
                Some(($($a?,)+))
            }
        }

        impl<$($A: ReadOnlyAccess),+> ReadOnlyViewQuery for ($($A,)+) {
            fn fetch(go: &GameObject) -> Option<Self::Items<'_>> {
                Some(($(go.get_view::<$A::View>().map($A::from_ref)?,)+))
            }
        }
    };
}

impl_view_query!((A, a));
impl_view_query!((A, a), (B, b));
impl_view_query!((A, a), (B, b), (C, c));
impl_view_query!((A, a), (B, b), (C, c), (D, d));
impl_view_query!((A, a), (B, b), (C, c), (D, d), (E, e));
impl_view_query!((A, a), (B, b), (C, c), (D, d), (E, e), (F, f));

/// Invokes `success` with the requested views if all are attached, else `fallback`.
pub fn apply<'a, Q: ViewQuery, R>(
    go: &'a mut GameObject,
    success: impl FnOnce(Q::Items<'a>) -> R,
    fallback: impl FnOnce() -> R,
) -> R {
    match Q::fetch_mut(go) {
        Some(items) => success(items),
        None => fallback(),
    }
}

/// [`apply`] for a shared game object; only read accesses are allowed.
pub fn apply_ref<'a, Q: ReadOnlyViewQuery, R>(
    go: &'a GameObject,
    success: impl FnOnce(Q::Items<'a>) -> R,
    fallback: impl FnOnce() -> R,
) -> R {
    match Q::fetch(go) {
        Some(items) => success(items),
        None => fallback(),
    }
}

/// Invokes `f` for every game object carrying all requested views.
///
/// # Returns
///
/// The number of game objects `f` was called for.
pub fn apply_each<'a, Q: ViewQuery>(
    objects: impl IntoIterator<Item = &'a mut GameObject>,
    mut f: impl FnMut(Q::Items<'a>),
) -> usize {
    let mut count = 0;
    for go in objects {
        if let Some(items) = Q::fetch_mut(go) {
            f(items);
            count += 1;
        }
    }
    count
}

/// A predicate on one view.
pub trait Request {
    /// How the view is handed back when the query succeeds.
    type Access: Access;

    /// Checks the predicate against the attached view.
    fn is_valid(&self, view: &<Self::Access as Access>::View) -> bool;
}

/// Requests that only the view is attached.
pub struct Has<A>(PhantomData<fn() -> A>);

impl<A> Has<A> {
    /// Creates the request.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<A> Default for Has<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Access> Request for Has<A> {
    type Access = A;

    #[inline]
    fn is_valid(&self, _view: &A::View) -> bool {
        true
    }
}

/// A tuple of [`Request`]s evaluated together.
pub trait RequestSet {
    /// The view query run once every predicate passed.
    type Query: ViewQuery;

    /// Checks every request against `go`.
    fn is_satisfied(&self, go: &GameObject) -> bool;
}

macro_rules! impl_request_set {
    ($(($R:ident, $idx:tt)),+) => {
        impl<$($R: Request),+> RequestSet for ($($R,)+) {
            type Query = ($($R::Access,)+);

            fn is_satisfied(&self, go: &GameObject) -> bool {
                $(
                    go.get_view::<<$R::Access as Access>::View>()
                        .is_some_and(|view| self.$idx.is_valid(view))
                )&&+
            }
        }
    };
}

impl_request_set!((R0, 0));
impl_request_set!((R0, 0), (R1, 1));
impl_request_set!((R0, 0), (R1, 1), (R2, 2));
impl_request_set!((R0, 0), (R1, 1), (R2, 2), (R3, 3));

/// Runs predicated requests against a game object.
pub fn query<'a, S: RequestSet>(
    go: &'a mut GameObject,
    requests: &S,
) -> Option<<S::Query as ViewQuery>::Items<'a>> {
    if !requests.is_satisfied(go) {
        return None;
    }
    S::Query::fetch_mut(go)
}

/// Runs read-only predicated requests against a shared game object.
pub fn query_ref<'a, S>(
    go: &'a GameObject,
    requests: &S,
) -> Option<<S::Query as ViewQuery>::Items<'a>>
where
    S: RequestSet,
    S::Query: ReadOnlyViewQuery,
{
    if !requests.is_satisfied(go) {
        return None;
    }
    S::Query::fetch(go)
}

impl GameObject {
    /// Fetches the views of `Q`, or `None` if any is missing.
    pub fn try_get<Q: ViewQuery>(&mut self) -> Option<Q::Items<'_>> {
        Q::fetch_mut(self)
    }

    /// Fetches the read-only views of `Q`, or `None` if any is missing.
    #[must_use]
    pub fn try_get_ref<Q: ReadOnlyViewQuery>(&self) -> Option<Q::Items<'_>> {
        Q::fetch(self)
    }

    /// Checks whether every view of `Q` is attached.
    #[must_use]
    pub fn has_all<Q: ViewQuery>(&self) -> bool {
        Q::matches(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position(f32);
    struct Velocity(f32);
    struct Name(&'static str);

    impl View for Position {
        const COMPONENT_ID: ComponentId = 10;
    }
    impl View for Velocity {
        const COMPONENT_ID: ComponentId = 11;
    }
    impl View for Name {
        const COMPONENT_ID: ComponentId = 12;
    }

    struct NameIs(&'static str);

    impl Request for NameIs {
        type Access = Read<Name>;

        fn is_valid(&self, view: &Name) -> bool {
            view.0 == self.0
        }
    }

    fn mover(name: &'static str) -> GameObject {
        let mut go = GameObject::new();
        go.add_view(|| Name(name));
        go.add_view(|| Velocity(2.0));
        go.add_view(|| Position(1.0));
        go
    }

    #[test]
    fn test_apply_success_and_fallback() {
        let mut go = mover("a");
        let moved = apply::<(Write<Position>, Read<Velocity>), _>(
            &mut go,
            |(p, v)| {
                p.0 += v.0;
                true
            },
            || false,
        );
        assert!(moved);
        assert_eq!(go.get_view::<Position>().map(|p| p.0), Some(3.0));

        go.remove::<Velocity>();
        let moved = apply::<(Write<Position>, Read<Velocity>), _>(&mut go, |_| true, || false);
        assert!(!moved);
    }

    #[test]
    fn test_apply_ref_on_shared_object() {
        let go = mover("b");
        let name = apply_ref::<Read<Name>, _>(&go, |n| n.0, || "none");
        assert_eq!(name, "b");
        assert!(go.try_get_ref::<(Read<Name>, Read<Position>)>().is_some());
        assert!(go.has_all::<(Read<Name>, Write<Velocity>)>());
    }

    #[test]
    fn test_apply_each_counts_matches() {
        let mut objects = vec![mover("a"), GameObject::new(), mover("c")];
        let visited = apply_each::<Write<Position>>(objects.iter_mut(), |p| p.0 = 0.0);
        assert_eq!(visited, 2);
        assert_eq!(objects[2].get_view::<Position>().map(|p| p.0), Some(0.0));
    }

    #[test]
    fn test_query_predicates() {
        let mut go = mover("target");
        let hit = query(&mut go, &(NameIs("target"), Has::<Write<Position>>::new()));
        assert!(hit.is_some());
        if let Some((_, position)) = hit {
            position.0 = 42.0;
        }
        assert_eq!(go.get_view::<Position>().map(|p| p.0), Some(42.0));

        assert!(query(&mut go, &(NameIs("other"),)).is_none());
        assert!(query_ref(&go, &(NameIs("target"), Has::<Read<Velocity>>::new())).is_some());
    }

    #[test]
    fn test_duplicate_access_yields_none() {
        let mut go = mover("x");
        assert!(go.try_get::<(Write<Position>, Write<Position>)>().is_none());
    }
}
