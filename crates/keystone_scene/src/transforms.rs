//! # Scene Nodes
//!
//! A hierarchy of nodes, each holding a local transform and a cached world
//! transform. Writes mark a node [`NodeFlags::DIRTY`]; the per-frame update
//! recomputes world transforms top-down and marks every node whose world
//! transform changed this frame [`NodeFlags::UPDATED`].
//!
//! ```text
//! set_position_l / set_orientation / set_scale   → DIRTY
//! update_transforms (root → leaves)
//!   ├─ dirty or parent changed → world = parent ∘ local, UPDATED
//!   └─ otherwise               → UPDATED cleared
//! ```

use std::any::Any;
use std::sync::Arc;

use keystone_core::components::{trigger, TRANSFORM_CHANGED};
use keystone_core::ecs::{
    component_id, find_value, Component, ComponentId, ComponentStore, DenseStorage, GameObject,
    Handle, ValueMap, View,
};
use keystone_core::math::{Quaternion, Transform, Vec3};
use keystone_core::tasks::{TaskRef, UpdateDispatcher};
use keystone_core::{CoreError, CoreResult};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::loading::{read_blob, SceneLoadingContext, SceneNodeBlob, SCENE_LOADING_CONTEXT_KID};

/// Component ID of the transform store; also the ID of the transform update task.
pub const TRANSFORM_COMPONENT_ID: ComponentId = component_id("Transform");

/// Handle to a scene node.
pub type NodeHandle = Handle<Node>;

/// Per-node state bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// Local transform written since the last update.
    pub const DIRTY: Self = Self(1 << 0);
    /// World transform recomputed by the last update.
    pub const UPDATED: Self = Self(1 << 1);
    /// Local scale differs from one.
    pub const SCALE: Self = Self(1 << 2);

    /// No flags.
    pub const NONE: Self = Self(0);

    /// `true` if any bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// `true` if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    #[inline]
    fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for NodeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One scene node.
#[derive(Debug, Clone)]
pub struct Node {
    parent: NodeHandle,
    children: SmallVec<[NodeHandle; 4]>,
    local: Transform,
    world: Transform,
    flags: NodeFlags,
}

impl Node {
    fn new(local: Transform) -> Self {
        let mut node = Self {
            parent: NodeHandle::INVALID,
            children: SmallVec::new(),
            local,
            world: local,
            flags: NodeFlags::default(),
        };
        node.mark_modified();
        node
    }

    /// Flags a local write: DIRTY, and SCALE tracking the local scale.
    fn mark_modified(&mut self) {
        self.flags.insert(NodeFlags::DIRTY);
        if self.local.scale == Vec3::ONE {
            self.flags.remove(NodeFlags::SCALE);
        } else {
            self.flags.insert(NodeFlags::SCALE);
        }
    }
}

/// Store of scene nodes.
#[derive(Default)]
pub struct TransformComponent {
    nodes: RwLock<DenseStorage<Node>>,
}

impl std::fmt::Debug for TransformComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformComponent")
            .field("nodes", &self.nodes.read().len())
            .finish()
    }
}

impl TransformComponent {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store behind an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Creates a root node at the origin.
    pub fn create_node(&self) -> NodeHandle {
        self.create_node_with(Transform::IDENTITY)
    }

    /// Creates a root node with the given local transform.
    pub fn create_node_with(&self, local: Transform) -> NodeHandle {
        self.nodes.write().insert(Node::new(local))
    }

    /// Releases a node. Its children become roots and are marked dirty.
    pub fn release_node(&self, node: NodeHandle) -> bool {
        let mut nodes = self.nodes.write();
        let Some(removed) = nodes.remove(node) else {
            return false;
        };
        if let Some(parent) = nodes.get_mut(removed.parent) {
            parent.children.retain(|c| *c != node);
        }
        for child in removed.children {
            if let Some(child) = nodes.get_mut(child) {
                child.parent = NodeHandle::INVALID;
                child.flags.insert(NodeFlags::DIRTY);
            }
        }
        true
    }

    /// `true` if the node is live.
    #[must_use]
    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.read().contains(node)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// `true` if no node is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Re-parents `child`; an invalid `parent` detaches it.
    ///
    /// The local transform is kept, so the world transform changes.
    ///
    /// # Returns
    ///
    /// `false` if either node is unknown or the link would form a cycle.
    pub fn set_parent(&self, child: NodeHandle, parent: NodeHandle) -> bool {
        let mut nodes = self.nodes.write();
        if !nodes.contains(child) || (!parent.is_invalid() && !nodes.contains(parent)) {
            return false;
        }

        let mut ancestor = parent;
        while !ancestor.is_invalid() {
            if ancestor == child {
                tracing::warn!(?child, ?parent, "set_parent would create a cycle");
                return false;
            }
            ancestor = nodes.get(ancestor).map_or(NodeHandle::INVALID, |n| n.parent);
        }

        let old_parent = nodes[child].parent;
        if let Some(old) = nodes.get_mut(old_parent) {
            old.children.retain(|c| *c != child);
        }
        if let Some(new) = nodes.get_mut(parent) {
            new.children.push(child);
        }
        let node = &mut nodes[child];
        node.parent = parent;
        node.flags.insert(NodeFlags::DIRTY);
        true
    }

    /// Parent of a node, `None` for roots and unknown nodes.
    #[must_use]
    pub fn parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes
            .read()
            .get(node)
            .map(|n| n.parent)
            .filter(|p| !p.is_invalid())
    }

    /// Children of a node.
    #[must_use]
    pub fn children(&self, node: NodeHandle) -> SmallVec<[NodeHandle; 4]> {
        self.nodes
            .read()
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// State bits of a node; unknown nodes report none.
    #[must_use]
    pub fn flags(&self, node: NodeHandle) -> NodeFlags {
        self.nodes.read().get(node).map_or(NodeFlags::NONE, |n| n.flags)
    }

    /// Local transform.
    #[must_use]
    pub fn local(&self, node: NodeHandle) -> Option<Transform> {
        self.nodes.read().get(node).map(|n| n.local)
    }

    /// Replaces the local transform.
    pub fn set_local(&self, node: NodeHandle, local: Transform) -> bool {
        self.modify(node, |n| n.local = local)
    }

    fn modify(&self, node: NodeHandle, f: impl FnOnce(&mut Node)) -> bool {
        let mut nodes = self.nodes.write();
        let Some(n) = nodes.get_mut(node) else {
            tracing::warn!(?node, "write to unknown scene node");
            return false;
        };
        f(n);
        n.mark_modified();
        true
    }

    /// World transform, recomposed from local transforms if anything on the
    /// path to the root is dirty.
    #[must_use]
    pub fn world_transform(&self, node: NodeHandle) -> Option<Transform> {
        let nodes = self.nodes.read();
        resolve_world(&nodes, node)
    }

    /// Cached world transform as of the last [`TransformComponent::update_transforms`].
    #[must_use]
    pub fn cached_world_transform(&self, node: NodeHandle) -> Option<Transform> {
        self.nodes.read().get(node).map(|n| n.world)
    }

    /// World-space position.
    #[must_use]
    pub fn position_w(&self, node: NodeHandle) -> Option<Vec3> {
        self.world_transform(node).map(|t| t.position)
    }

    /// Moves the node so its world-space position becomes `position`.
    pub fn set_position_w(&self, node: NodeHandle, position: Vec3) -> bool {
        let mut nodes = self.nodes.write();
        let Some(parent) = nodes.get(node).map(|n| n.parent) else {
            return false;
        };
        let parent_world = resolve_world(&nodes, parent).unwrap_or(Transform::IDENTITY);
        let n = &mut nodes[node];
        n.local.position = parent_world.inverse_transform_point(position);
        n.mark_modified();
        true
    }

    /// Local position.
    #[must_use]
    pub fn position_l(&self, node: NodeHandle) -> Option<Vec3> {
        self.local(node).map(|t| t.position)
    }

    /// Sets the local position.
    pub fn set_position_l(&self, node: NodeHandle, position: Vec3) -> bool {
        self.modify(node, |n| n.local.position = position)
    }

    /// Adds `delta` to the local position.
    pub fn translate(&self, node: NodeHandle, delta: Vec3) -> bool {
        self.modify(node, |n| n.local.position += delta)
    }

    /// World-space orientation.
    #[must_use]
    pub fn orientation(&self, node: NodeHandle) -> Option<Quaternion> {
        self.world_transform(node).map(|t| t.rotation)
    }

    /// Sets the local orientation.
    pub fn set_orientation(&self, node: NodeHandle, rotation: Quaternion) -> bool {
        self.modify(node, |n| n.local.rotation = rotation.normalized())
    }

    /// Rotates around the local Y axis.
    pub fn yaw(&self, node: NodeHandle, radians: f32) -> bool {
        self.rotate_local(node, Vec3::Y, radians)
    }

    /// Rotates around the local X axis.
    pub fn pitch(&self, node: NodeHandle, radians: f32) -> bool {
        self.rotate_local(node, Vec3::X, radians)
    }

    /// Rotates around the local Z axis.
    pub fn roll(&self, node: NodeHandle, radians: f32) -> bool {
        self.rotate_local(node, Vec3::Z, radians)
    }

    fn rotate_local(&self, node: NodeHandle, axis: Vec3, radians: f32) -> bool {
        let delta = Quaternion::from_axis_angle(axis, radians);
        self.modify(node, |n| n.local.rotation = (n.local.rotation * delta).normalized())
    }

    /// Local scale.
    #[must_use]
    pub fn scale(&self, node: NodeHandle) -> Option<Vec3> {
        self.local(node).map(|t| t.scale)
    }

    /// Sets the local scale.
    pub fn set_scale(&self, node: NodeHandle, scale: Vec3) -> bool {
        self.modify(node, |n| n.local.scale = scale)
    }

    /// Recomputes world transforms top-down.
    ///
    /// # Returns
    ///
    /// The number of nodes marked [`NodeFlags::UPDATED`].
    pub fn update_transforms(&self) -> usize {
        let mut nodes = self.nodes.write();
        let mut stack: Vec<(NodeHandle, Transform, bool)> = nodes
            .iter()
            .filter(|(_, n)| n.parent.is_invalid())
            .map(|(h, _)| (h, Transform::IDENTITY, false))
            .collect();

        let mut updated = 0;
        while let Some((handle, parent_world, parent_changed)) = stack.pop() {
            let Some(node) = nodes.get_mut(handle) else {
                continue;
            };
            let changed = parent_changed || node.flags.contains(NodeFlags::DIRTY);
            if changed {
                node.world = parent_world.compose(&node.local);
                node.flags.remove(NodeFlags::DIRTY);
                node.flags.insert(NodeFlags::UPDATED);
                updated += 1;
            } else {
                node.flags.remove(NodeFlags::UPDATED);
            }
            let world = node.world;
            stack.extend(node.children.iter().map(|&child| (child, world, changed)));
        }

        tracing::trace!(nodes = nodes.len(), updated, "transforms updated");
        updated
    }
}

fn resolve_world(nodes: &DenseStorage<Node>, node: NodeHandle) -> Option<Transform> {
    let mut chain: SmallVec<[&Node; 16]> = SmallVec::new();
    let mut current = node;
    let mut dirty = false;
    while let Some(n) = nodes.get(current) {
        dirty |= n.flags.contains(NodeFlags::DIRTY);
        chain.push(n);
        current = n.parent;
    }
    let target = *chain.first()?;
    if !dirty {
        return Some(target.world);
    }
    Some(
        chain
            .iter()
            .rev()
            .fold(Transform::IDENTITY, |world, n| world.compose(&n.local)),
    )
}

impl ComponentStore for TransformComponent {
    fn id(&self) -> ComponentId {
        TRANSFORM_COMPONENT_ID
    }

    fn name(&self) -> &'static str {
        "Transform"
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    /// Attaches the node at the blob's index in the loading context's node table.
    fn add_component_view(
        self: Arc<Self>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let desc: SceneNodeBlob = read_blob(TRANSFORM_COMPONENT_ID, blob)?;
        let ctx = find_value::<SceneLoadingContext>(values, SCENE_LOADING_CONTEXT_KID)
            .ok_or(CoreError::MissingValue(SCENE_LOADING_CONTEXT_KID))?;
        let node = ctx.node(desc.node_index).ok_or_else(|| CoreError::InvalidBlob {
            id: TRANSFORM_COMPONENT_ID,
            reason: format!("node index {} out of range", desc.node_index),
        })?;
        go.add_view(|| SceneNodeView::attach(&self, node));
        Ok(())
    }
}

impl Component for TransformComponent {
    const ID: ComponentId = TRANSFORM_COMPONENT_ID;
    const NAME: &'static str = "Transform";
}

/// A game object's place in the node hierarchy. Dropping it releases the node.
pub struct SceneNodeView {
    node: NodeHandle,
    transforms: Arc<TransformComponent>,
}

impl View for SceneNodeView {
    const COMPONENT_ID: ComponentId = TRANSFORM_COMPONENT_ID;
}

impl SceneNodeView {
    /// Creates a fresh root node for the view.
    #[must_use]
    pub fn new(transforms: &Arc<TransformComponent>) -> Self {
        Self::attach(transforms, transforms.create_node())
    }

    /// Takes ownership of an existing node.
    #[must_use]
    pub fn attach(transforms: &Arc<TransformComponent>, node: NodeHandle) -> Self {
        Self {
            node,
            transforms: Arc::clone(transforms),
        }
    }

    /// The owned node.
    #[inline]
    #[must_use]
    pub const fn node(&self) -> NodeHandle {
        self.node
    }

    /// The node store.
    #[must_use]
    pub fn transforms(&self) -> &Arc<TransformComponent> {
        &self.transforms
    }

    /// World-space position; origin if the node vanished.
    #[must_use]
    pub fn position_w(&self) -> Vec3 {
        self.transforms.position_w(self.node).unwrap_or(Vec3::ZERO)
    }

    /// Sets the world-space position.
    pub fn set_position_w(&self, position: Vec3) -> bool {
        self.transforms.set_position_w(self.node, position)
    }

    /// Sets the local position.
    pub fn set_position_l(&self, position: Vec3) -> bool {
        self.transforms.set_position_l(self.node, position)
    }

    /// World-space orientation.
    #[must_use]
    pub fn orientation(&self) -> Quaternion {
        self.transforms.orientation(self.node).unwrap_or_default()
    }

    /// Sets the local orientation.
    pub fn set_orientation(&self, rotation: Quaternion) -> bool {
        self.transforms.set_orientation(self.node, rotation)
    }

    /// Sets the local scale.
    pub fn set_scale(&self, scale: Vec3) -> bool {
        self.transforms.set_scale(self.node, scale)
    }

    /// Adds `delta` to the local position.
    pub fn translate(&self, delta: Vec3) -> bool {
        self.transforms.translate(self.node, delta)
    }

    /// World transform.
    #[must_use]
    pub fn world_transform(&self) -> Transform {
        self.transforms.world_transform(self.node).unwrap_or_default()
    }

    /// Node state bits.
    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        self.transforms.flags(self.node)
    }
}

impl Drop for SceneNodeView {
    fn drop(&mut self) {
        self.transforms.release_node(self.node);
    }
}

/// The game object's node, if it has one.
#[must_use]
pub fn get_node(go: &GameObject) -> Option<NodeHandle> {
    go.get_view::<SceneNodeView>().map(SceneNodeView::node)
}

/// The game object's world position, if it has a node.
#[must_use]
pub fn get_world_position(go: &GameObject) -> Option<Vec3> {
    go.get_view::<SceneNodeView>().map(SceneNodeView::position_w)
}

/// Moves the game object and fires [`TRANSFORM_CHANGED`] with the new position.
///
/// # Returns
///
/// `false` if the game object has no node.
pub fn set_world_position(go: &GameObject, position: Vec3) -> bool {
    let Some(view) = go.get_view::<SceneNodeView>() else {
        return false;
    };
    if !view.set_position_w(position) {
        return false;
    }
    trigger(go, TRANSFORM_CHANGED, &position as &dyn Any);
    true
}

/// Payload of the transform update task.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformUpdate {
    /// Nodes whose world transform changed this frame.
    pub updated: usize,
}

/// Schedules [`TransformComponent::update_transforms`] under [`TRANSFORM_COMPONENT_ID`].
///
/// Other tasks may depend on it through
/// `builder.add_input_id(TRANSFORM_COMPONENT_ID)`.
pub fn queue_transform_update_task(
    dispatcher: &mut UpdateDispatcher,
    transforms: &Arc<TransformComponent>,
) -> TaskRef<TransformUpdate> {
    let transforms = Arc::clone(transforms);
    dispatcher.add_with_id(
        TRANSFORM_COMPONENT_ID,
        |builder, _: &mut TransformUpdate| {
            builder.set_debug_string("Transform Update");
        },
        move |data, _| data.updated = transforms.update_transforms(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::components::{TriggerComponent, TriggerView};
    use keystone_core::ThreadPool;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_hierarchy_composes_world() {
        let store = TransformComponent::new();
        let parent = store.create_node_with(Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        let child = store.create_node_with(Transform::from_position(Vec3::new(0.0, 1.0, 0.0)));
        assert!(store.set_parent(child, parent));

        assert!(approx(store.position_w(child).unwrap(), Vec3::new(10.0, 1.0, 0.0)));
        assert_eq!(store.update_transforms(), 2);
        assert!(store.flags(child).contains(NodeFlags::UPDATED));
        assert!(approx(
            store.cached_world_transform(child).unwrap().position,
            Vec3::new(10.0, 1.0, 0.0)
        ));

        // Nothing changed: UPDATED is cleared on the next pass.
        assert_eq!(store.update_transforms(), 0);
        assert!(!store.flags(child).intersects(NodeFlags::UPDATED | NodeFlags::DIRTY));

        // Moving the parent updates the child.
        store.translate(parent, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(store.update_transforms(), 2);
        assert!(approx(store.position_w(child).unwrap(), Vec3::new(10.0, 1.0, 5.0)));
    }

    #[test]
    fn test_set_world_position_under_rotated_parent() {
        let store = TransformComponent::new();
        let parent = store.create_node();
        store.yaw(parent, std::f32::consts::FRAC_PI_2);
        store.set_scale(parent, Vec3::splat(2.0));
        assert!(store.flags(parent).contains(NodeFlags::SCALE));

        let child = store.create_node();
        store.set_parent(child, parent);
        let target = Vec3::new(3.0, -1.0, 4.0);
        assert!(store.set_position_w(child, target));
        assert!(approx(store.position_w(child).unwrap(), target));
    }

    #[test]
    fn test_world_position_write_refreshes_flags() {
        let store = TransformComponent::new();
        let scaled = store.create_node_with(Transform {
            scale: Vec3::splat(3.0),
            ..Transform::IDENTITY
        });
        let plain = store.create_node();
        store.update_transforms();
        assert!(!store.flags(scaled).contains(NodeFlags::DIRTY));

        assert!(store.set_position_w(scaled, Vec3::new(1.0, 2.0, 3.0)));
        assert!(store.set_position_w(plain, Vec3::new(4.0, 5.0, 6.0)));
        assert!(store.flags(scaled).contains(NodeFlags::DIRTY | NodeFlags::SCALE));
        assert!(store.flags(plain).contains(NodeFlags::DIRTY));
        assert!(!store.flags(plain).contains(NodeFlags::SCALE));
        assert!(!store.set_position_w(NodeHandle::INVALID, Vec3::ZERO));
    }

    #[test]
    fn test_cycles_rejected_and_release_orphans_children() {
        let store = TransformComponent::new();
        let a = store.create_node();
        let b = store.create_node();
        assert!(store.set_parent(b, a));
        assert!(!store.set_parent(a, b));
        assert!(!store.set_parent(a, a));

        assert!(store.release_node(a));
        assert_eq!(store.parent(b), None);
        assert!(store.flags(b).contains(NodeFlags::DIRTY));
        assert!(!store.release_node(a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_world_position_fires_trigger() {
        let transforms = TransformComponent::shared();
        let triggers = TriggerComponent::shared();
        let mut go = GameObject::new();
        go.add_view(|| SceneNodeView::new(&transforms));
        let fired = Arc::new(AtomicU32::new(0));

        let f = fired.clone();
        let view = go.add_view(|| TriggerView::new(&triggers));
        view.add_slot(1, move |args| {
            if args.downcast_ref::<Vec3>().is_some() {
                f.fetch_add(1, Ordering::SeqCst);
            }
        });
        let slot = view.slot(1).unwrap();
        view.connect(TRANSFORM_CHANGED, slot);

        assert!(set_world_position(&go, Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(approx(get_world_position(&go).unwrap(), Vec3::new(1.0, 2.0, 3.0)));

        drop(go);
        assert!(transforms.is_empty());
    }

    #[test]
    fn test_update_task_is_linkable_by_id() {
        let transforms = TransformComponent::shared();
        let node = transforms.create_node();
        let pool = Arc::new(ThreadPool::new(1).unwrap());
        let mut dispatcher = UpdateDispatcher::new(pool);

        let update = queue_transform_update_task(&mut dispatcher, &transforms);
        let t = Arc::clone(&transforms);
        let seen = dispatcher.add(
            |builder, _: &mut bool| {
                builder.add_input_id(TRANSFORM_COMPONENT_ID);
            },
            move |seen, _| *seen = t.flags(node).contains(NodeFlags::UPDATED),
        );
        dispatcher.execute().unwrap();

        assert_eq!(update.data().updated, 1);
        assert!(*seen.data());
    }
}
