//! # Game Objects and Views
//!
//! A game object is a small, unordered list of `(ComponentId, view)` pairs.
//! Each view is a thin handle into one component store; the game object owns
//! its views and dropping a view releases its row in the store.
//!
//! At most one view per component ID is attached to a game object.

use std::any::Any;
use std::fmt;

use smallvec::SmallVec;

use super::component::ComponentId;

/// Inline capacity of a game object's view list.
pub const INLINE_VIEW_COUNT: usize = 8;

/// Object-safe view interface stored inside game objects.
///
/// Implemented automatically for every [`View`].
pub trait ComponentView: Any + Send + Sync {
    /// ID of the component this view points into.
    fn component_id(&self) -> ComponentId;
    /// Upcast for downcasting to the concrete view.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting to the concrete view.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A typed view into a component store.
///
/// Dropping a view must release whatever it holds in its store.
pub trait View: Send + Sync + 'static {
    /// ID of the component this view points into.
    const COMPONENT_ID: ComponentId;
}

impl<V: View> ComponentView for V {
    #[inline]
    fn component_id(&self) -> ComponentId {
        V::COMPONENT_ID
    }

    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ViewEntry {
    id: ComponentId,
    view: Box<dyn ComponentView>,
}

/// An entity: the set of views attached to it.
#[derive(Default)]
pub struct GameObject {
    views: SmallVec<[ViewEntry; INLINE_VIEW_COUNT]>,
}

impl fmt::Debug for GameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameObject")
            .field("views", &self.view_ids().collect::<SmallVec<[ComponentId; 8]>>())
            .finish()
    }
}

impl GameObject {
    /// Creates a game object with no views.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn position(&self, id: ComponentId) -> Option<usize> {
        self.views.iter().position(|e| e.id == id)
    }

    /// Attaches a view, or returns the one already attached for `V`'s component.
    ///
    /// `make` is only called when no view of that component is attached.
    ///
    /// # Panics
    ///
    /// Panics if a view of another concrete type is attached under the same
    /// component ID.
    pub fn add_view<V: View>(&mut self, make: impl FnOnce() -> V) -> &mut V {
        let index = match self.position(V::COMPONENT_ID) {
            Some(index) => index,
            None => {
                self.views.push(ViewEntry {
                    id: V::COMPONENT_ID,
                    view: Box::new(make()),
                });
                self.views.len() - 1
            }
        };
        self.views[index]
            .view
            .as_any_mut()
            .downcast_mut::<V>()
            .unwrap_or_else(|| {
                panic!(
                    "View type mismatch for component {:#010x}!",
                    V::COMPONENT_ID
                )
            })
    }

    /// Fallible form of [`GameObject::add_view`].
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `make`; nothing is attached in that case.
    pub fn try_add_view<V: View, E>(
        &mut self,
        make: impl FnOnce() -> Result<V, E>,
    ) -> Result<&mut V, E> {
        if !self.has_view(V::COMPONENT_ID) {
            let view = make()?;
            return Ok(self.add_view(|| view));
        }
        Ok(self.add_view::<V>(|| unreachable!("view already attached")))
    }

    /// Returns the attached view of type `V`.
    #[must_use]
    pub fn get_view<V: View>(&self) -> Option<&V> {
        let index = self.position(V::COMPONENT_ID)?;
        self.views[index].view.as_any().downcast_ref::<V>()
    }

    /// Returns the attached view of type `V` mutably.
    pub fn get_view_mut<V: View>(&mut self) -> Option<&mut V> {
        let index = self.position(V::COMPONENT_ID)?;
        self.views[index].view.as_any_mut().downcast_mut::<V>()
    }

    /// Returns the attached view for a component ID, type-erased.
    #[must_use]
    pub fn get_view_dyn(&self, id: ComponentId) -> Option<&dyn ComponentView> {
        let index = self.position(id)?;
        Some(self.views[index].view.as_ref())
    }

    /// Checks whether a view of the component is attached.
    #[inline]
    #[must_use]
    pub fn has_view(&self, id: ComponentId) -> bool {
        self.position(id).is_some()
    }

    /// Checks whether a view of type `V` is attached.
    #[inline]
    #[must_use]
    pub fn has<V: View>(&self) -> bool {
        self.has_view(V::COMPONENT_ID)
    }

    /// Releases the view of a component.
    ///
    /// # Returns
    ///
    /// `false` if no view of that component was attached.
    pub fn remove_view(&mut self, id: ComponentId) -> bool {
        match self.position(id) {
            Some(index) => {
                drop(self.views.swap_remove(index));
                true
            }
            None => false,
        }
    }

    /// Releases the view of type `V`.
    pub fn remove<V: View>(&mut self) -> bool {
        self.remove_view(V::COMPONENT_ID)
    }

    /// Releases every view.
    pub fn release(&mut self) {
        self.views.clear();
    }

    /// IDs of all attached components, in attachment order modulo removals.
    pub fn view_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.views.iter().map(|e| e.id)
    }

    /// Number of attached views.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns `true` if no view is attached.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Type-erased views, mutably. Each item borrows a distinct view.
    pub(crate) fn views_mut(
        &mut self,
    ) -> impl Iterator<Item = (ComponentId, &mut (dyn ComponentView + 'static))> + '_ {
        self.views.iter_mut().map(|e| (e.id, e.view.as_mut()))
    }
}
