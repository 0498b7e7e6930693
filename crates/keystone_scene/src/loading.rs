//! # Scene Loading
//!
//! Builds scene entities from serialized component blobs.
//!
//! ```text
//! NodeBlob[] ──load_nodes──▶ SceneLoadingContext { scene, node table }
//!                                   │
//! EntityDesc { blobs } ──populate── ValueMap[SCENE_LOADING_CONTEXT_KID] ──▶ Scene
//! ```
//!
//! Component hooks find the context in the value map and resolve node
//! indices through it.

use std::any::Any;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use keystone_core::ecs::{component_id, ComponentBlob, ComponentId, GameObject, KeyValue, Registry, ValueKey, ValueMap};
use keystone_core::math::{Quaternion, Transform, Vec3};
use keystone_core::{CoreError, CoreResult};
use smallvec::SmallVec;

use crate::error::{SceneError, SceneResult};
use crate::scene::{Scene, SceneEntityHandle};
use crate::transforms::NodeHandle;

/// Value-map key of the [`SceneLoadingContext`].
pub const SCENE_LOADING_CONTEXT_KID: ValueKey = component_id("SceneLoadingContext");

/// Value-map key of the physics layer an entity is loaded into.
pub const PHYSICS_LAYER_KID: ValueKey = component_id("PhysicsLayer");

/// `NodeBlob::parent` of a root node.
pub const ROOT_PARENT: u32 = u32::MAX;

/// Reads a POD value from the front of a blob.
///
/// Trailing bytes are left for the caller.
///
/// # Errors
///
/// [`CoreError::BlobTooSmall`] if the blob is shorter than `T`.
pub fn read_blob<T: Pod>(id: ComponentId, blob: &[u8]) -> CoreResult<T> {
    let size = size_of::<T>();
    let bytes = blob.get(..size).ok_or(CoreError::BlobTooSmall {
        id,
        expected: size,
        actual: blob.len(),
    })?;
    Ok(bytemuck::pod_read_unaligned(bytes))
}

/// Reads `count` POD values stored back to back after `offset` bytes.
///
/// # Errors
///
/// [`CoreError::BlobTooSmall`] if the blob ends early.
pub fn read_blob_array<T: Pod>(
    id: ComponentId,
    blob: &[u8],
    offset: usize,
    count: usize,
) -> CoreResult<Vec<T>> {
    let size = size_of::<T>();
    let expected = offset + size * count;
    let bytes = blob.get(offset..expected).ok_or(CoreError::BlobTooSmall {
        id,
        expected,
        actual: blob.len(),
    })?;
    Ok(bytes.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
}

/// Blob of the transform component: which loaded node the entity sits on.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SceneNodeBlob {
    /// Index into the loading context's node table.
    pub node_index: u32,
}

/// One serialized scene node.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct NodeBlob {
    /// Local translation.
    pub position: [f32; 3],
    /// Local orientation, xyzw.
    pub orientation: [f32; 4],
    /// Local scale.
    pub scale: [f32; 3],
    /// Index of the parent node, [`ROOT_PARENT`] for roots.
    pub parent: u32,
}

impl NodeBlob {
    /// A root node at `position`.
    #[must_use]
    pub const fn root(position: [f32; 3]) -> Self {
        Self {
            position,
            orientation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0, 1.0, 1.0],
            parent: ROOT_PARENT,
        }
    }

    fn local(&self) -> Transform {
        let [x, y, z, w] = self.orientation;
        Transform::new(
            Vec3::from_array(self.position),
            Quaternion::new(x, y, z, w).normalized(),
            Vec3::from_array(self.scale),
        )
    }
}

/// State shared by every component hook while one scene is loading.
pub struct SceneLoadingContext {
    scene: Arc<Scene>,
    nodes: Vec<NodeHandle>,
}

impl std::fmt::Debug for SceneLoadingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneLoadingContext")
            .field("scene", &self.scene.id())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl SceneLoadingContext {
    /// Creates a context with an empty node table.
    #[must_use]
    pub fn new(scene: Arc<Scene>) -> Self {
        Self {
            scene,
            nodes: Vec::new(),
        }
    }

    /// The scene being loaded.
    #[must_use]
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// The loaded node at `index`.
    #[must_use]
    pub fn node(&self, index: u32) -> Option<NodeHandle> {
        self.nodes.get(index as usize).copied()
    }

    /// Every loaded node, in blob order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    /// Creates the scene's nodes and links parents.
    ///
    /// Parents may appear after their children in `blobs`. Indices are
    /// relative to this call's `blobs`.
    ///
    /// # Errors
    ///
    /// - [`SceneError::NodeIndexOutOfRange`] for a parent index past the batch
    /// - [`SceneError::NodeCycle`] if the parent links form a cycle
    ///
    /// Nodes created by a failing call are released.
    pub fn load_nodes(&mut self, blobs: &[NodeBlob]) -> SceneResult<()> {
        let transforms = &self.scene.stores().transforms;
        let created: Vec<NodeHandle> = blobs
            .iter()
            .map(|blob| transforms.create_node_with(blob.local()))
            .collect();

        let link = || -> SceneResult<()> {
            for (i, blob) in blobs.iter().enumerate() {
                if blob.parent == ROOT_PARENT {
                    continue;
                }
                let parent = *created.get(blob.parent as usize).ok_or(
                    SceneError::NodeIndexOutOfRange {
                        index: blob.parent,
                        count: created.len(),
                    },
                )?;
                if !transforms.set_parent(created[i], parent) {
                    return Err(SceneError::NodeCycle(u32::try_from(i).unwrap_or(u32::MAX)));
                }
            }
            Ok(())
        };

        if let Err(err) = link() {
            tracing::warn!(error = %err, nodes = blobs.len(), "node batch rejected");
            for node in created {
                transforms.release_node(node);
            }
            return Err(err);
        }

        tracing::debug!(nodes = created.len(), scene = self.scene.id(), "scene nodes loaded");
        self.nodes.extend(created);
        Ok(())
    }
}

/// One entity to load.
#[derive(Debug, Clone, Default)]
pub struct EntityDesc<'a> {
    /// Component blobs, applied in order.
    pub components: Vec<ComponentBlob<'a>>,
}

impl<'a> EntityDesc<'a> {
    /// Appends a component blob.
    #[must_use]
    pub fn with(mut self, id: ComponentId, bytes: &'a [u8]) -> Self {
        self.components.push(ComponentBlob::new(id, bytes));
        self
    }
}

/// Builds each entity through the registry and adds it to the context's scene.
///
/// # Errors
///
/// Stops at the first failing entity. Entities added before it stay in
/// the scene; the failing one is released.
pub fn load_entities(
    registry: &Registry,
    ctx: &SceneLoadingContext,
    entities: &[EntityDesc<'_>],
) -> SceneResult<Vec<SceneEntityHandle>> {
    load_entities_with(registry, ctx, &[], entities)
}

/// [`load_entities`] with extra values (for example [`PHYSICS_LAYER_KID`])
/// handed to every hook.
///
/// # Errors
///
/// See [`load_entities`].
pub fn load_entities_with(
    registry: &Registry,
    ctx: &SceneLoadingContext,
    extra: &ValueMap<'_>,
    entities: &[EntityDesc<'_>],
) -> SceneResult<Vec<SceneEntityHandle>> {
    let mut values: SmallVec<[KeyValue<'_>; 4]> = SmallVec::new();
    values.push((SCENE_LOADING_CONTEXT_KID, ctx as &dyn Any));
    values.extend_from_slice(extra);

    let mut handles = Vec::with_capacity(entities.len());
    for (i, desc) in entities.iter().enumerate() {
        let mut go = GameObject::new();
        if let Err(err) = registry.populate(&mut go, &values, &desc.components) {
            tracing::warn!(entity = i, error = %err, "entity failed to load");
            return Err(err.into());
        }
        handles.push(ctx.scene().add_game_object(go));
    }

    tracing::info!(entities = handles.len(), scene = ctx.scene().id(), "entities loaded");
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneStores;
    use crate::config::SceneSettings;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[test]
    fn test_read_blob_checks_size() {
        let bytes = [1_u8, 0, 0, 0, 2, 0, 0, 0, 9];
        let pair: Pair = read_blob(7, &bytes).unwrap();
        assert_eq!(pair, Pair { a: 1, b: 2 });

        let err = read_blob::<Pair>(7, &bytes[..5]).unwrap_err();
        assert_eq!(err, CoreError::BlobTooSmall { id: 7, expected: 8, actual: 5 });

        let values: Vec<u32> = read_blob_array(7, &bytes, 0, 2).unwrap();
        assert_eq!(values, vec![1, 2]);
        assert!(read_blob_array::<u32>(7, &bytes, 4, 2).is_err());
    }

    #[test]
    fn test_load_nodes_links_parents() {
        let scene = Scene::shared(SceneStores::new(), SceneSettings::default());
        let mut ctx = SceneLoadingContext::new(Arc::clone(&scene));

        // Child listed before its parent.
        let mut child = NodeBlob::root([0.0, 1.0, 0.0]);
        child.parent = 1;
        ctx.load_nodes(&[child, NodeBlob::root([5.0, 0.0, 0.0])]).unwrap();

        let transforms = &scene.stores().transforms;
        let child = ctx.node(0).unwrap();
        assert_eq!(transforms.parent(child), ctx.node(1));
        assert_eq!(transforms.position_w(child), Some(Vec3::new(5.0, 1.0, 0.0)));
        assert!(ctx.node(2).is_none());
    }

    #[test]
    fn test_load_nodes_rejects_bad_parents() {
        let scene = Scene::shared(SceneStores::new(), SceneSettings::default());
        let mut ctx = SceneLoadingContext::new(Arc::clone(&scene));

        let mut orphan = NodeBlob::root([0.0; 3]);
        orphan.parent = 4;
        let err = ctx.load_nodes(&[orphan]).unwrap_err();
        assert_eq!(err, SceneError::NodeIndexOutOfRange { index: 4, count: 1 });

        let mut a = NodeBlob::root([0.0; 3]);
        let mut b = NodeBlob::root([0.0; 3]);
        a.parent = 1;
        b.parent = 0;
        assert!(matches!(ctx.load_nodes(&[a, b]), Err(SceneError::NodeCycle(_))));

        assert!(ctx.nodes().is_empty());
        assert!(scene.stores().transforms.is_empty());
    }
}
