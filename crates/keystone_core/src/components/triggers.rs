//! # Triggers
//!
//! Named signals and slots attached to game objects. Firing a signal runs
//! every slot connected to it, on this object or on others.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::ecs::{component_id, BasicComponent, BasicView, ComponentData, ComponentId, GameObject, View};

/// Identifier of a signal or a slot.
pub type TriggerId = u32;

/// Callback run when a connected signal fires.
pub type SlotFn = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Fired by scene nodes after their world transform was written.
pub const TRANSFORM_CHANGED: TriggerId = component_id("TransformChanged");

/// Row of the trigger component.
#[derive(Default)]
pub struct Triggers {
    signals: HashMap<TriggerId, SmallVec<[SlotFn; 2]>>,
    slots: HashMap<TriggerId, SlotFn>,
}

impl fmt::Debug for Triggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Triggers")
            .field("signals", &self.signals.len())
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl ComponentData for Triggers {
    const ID: ComponentId = component_id("Trigger");
    const NAME: &'static str = "Trigger";
}

/// Store of trigger rows.
pub type TriggerComponent = BasicComponent<Triggers>;

/// Signals and slots of one game object.
pub struct TriggerView {
    inner: BasicView<Triggers>,
}

impl View for TriggerView {
    const COMPONENT_ID: ComponentId = Triggers::ID;
}

impl TriggerView {
    /// Creates an empty trigger row.
    #[must_use]
    pub fn new(component: &Arc<TriggerComponent>) -> Self {
        Self {
            inner: BasicView::new(component, Triggers::default()),
        }
    }

    /// Registers (or replaces) the slot `id`.
    pub fn add_slot(&self, id: TriggerId, slot: impl Fn(&dyn Any) + Send + Sync + 'static) {
        self.inner.get_mut().slots.insert(id, Arc::new(slot));
    }

    /// The slot `id`, if registered.
    #[must_use]
    pub fn slot(&self, id: TriggerId) -> Option<SlotFn> {
        self.inner.get().slots.get(&id).cloned()
    }

    /// Declares the signal `id` with no listeners.
    pub fn add_trigger(&self, id: TriggerId) {
        self.inner.get_mut().signals.entry(id).or_default();
    }

    /// Connects `slot` to the signal `id`, declaring the signal if needed.
    pub fn connect(&self, id: TriggerId, slot: SlotFn) {
        self.inner.get_mut().signals.entry(id).or_default().push(slot);
    }

    /// Removes the slot `id`. Connections already made keep their callback.
    pub fn remove_slot(&self, id: TriggerId) -> bool {
        self.inner.get_mut().slots.remove(&id).is_some()
    }

    /// Removes the signal `id` with all of its connections.
    pub fn remove_trigger(&self, id: TriggerId) -> bool {
        self.inner.get_mut().signals.remove(&id).is_some()
    }

    /// Number of slots connected to the signal `id`.
    #[must_use]
    pub fn connection_count(&self, id: TriggerId) -> usize {
        self.inner.get().signals.get(&id).map_or(0, SmallVec::len)
    }

    /// Fires the signal `id`.
    ///
    /// Listeners run after the row lock is released, so they may touch
    /// triggers themselves.
    ///
    /// # Returns
    ///
    /// The number of slots that ran.
    pub fn trigger(&self, id: TriggerId, args: &dyn Any) -> usize {
        let listeners = match self.inner.get().signals.get(&id) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };
        for slot in &listeners {
            slot(args);
        }
        listeners.len()
    }

    /// Runs the slot `id` directly.
    pub fn trigger_slot(&self, id: TriggerId, args: &dyn Any) -> bool {
        match self.slot(id) {
            Some(slot) => {
                slot(args);
                true
            }
            None => false,
        }
    }
}

/// Fires `id` on `go`; objects without triggers fire nothing.
pub fn trigger(go: &GameObject, id: TriggerId, args: &dyn Any) -> usize {
    go.get_view::<TriggerView>()
        .map_or(0, |view| view.trigger(id, args))
}

/// Connects `signal` on `source` to `slot` on `target`.
///
/// Source and target may be the same object.
///
/// # Returns
///
/// `false` if either side has no trigger view or the slot is unknown.
pub fn connect_trigger(
    source: &GameObject,
    signal: TriggerId,
    target: &GameObject,
    slot: TriggerId,
) -> bool {
    let Some(callback) = target.get_view::<TriggerView>().and_then(|view| view.slot(slot)) else {
        tracing::debug!(slot, "connect_trigger: target slot not found");
        return false;
    };
    let Some(source) = source.get_view::<TriggerView>() else {
        tracing::debug!(signal, "connect_trigger: source has no triggers");
        return false;
    };
    source.connect(signal, callback);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const OPEN: TriggerId = 1;
    const ON_OPEN: TriggerId = 2;

    fn with_triggers(store: &Arc<TriggerComponent>) -> GameObject {
        let mut go = GameObject::new();
        go.add_view(|| TriggerView::new(store));
        go
    }

    #[test]
    fn test_cross_object_connection() {
        let store = TriggerComponent::shared();
        let door = with_triggers(&store);
        let lamp = with_triggers(&store);
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        lamp.get_view::<TriggerView>().unwrap().add_slot(ON_OPEN, move |args| {
            let amount = args.downcast_ref::<u32>().copied().unwrap_or(1);
            h.fetch_add(amount, Ordering::SeqCst);
        });

        assert!(connect_trigger(&door, OPEN, &lamp, ON_OPEN));
        assert_eq!(trigger(&door, OPEN, &5_u32), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_same_object_and_removal() {
        let store = TriggerComponent::shared();
        let go = with_triggers(&store);
        let view = go.get_view::<TriggerView>().unwrap();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        view.add_slot(ON_OPEN, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(connect_trigger(&go, OPEN, &go, ON_OPEN));
        assert!(view.trigger_slot(ON_OPEN, &()));
        assert_eq!(view.trigger(OPEN, &()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(view.remove_slot(ON_OPEN));
        assert!(!view.trigger_slot(ON_OPEN, &()));
        assert!(!connect_trigger(&go, OPEN, &go, ON_OPEN));

        assert!(view.remove_trigger(OPEN));
        assert_eq!(view.trigger(OPEN, &()), 0);
    }

    #[test]
    fn test_object_without_triggers() {
        let go = GameObject::new();
        assert_eq!(trigger(&go, OPEN, &()), 0);
    }
}
