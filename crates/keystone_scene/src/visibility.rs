//! # Visibility
//!
//! Per-entity culling data: the owning entity and node, visibility flags and
//! a local-space bounding sphere.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use keystone_core::ecs::{
    component_id, BasicComponent, BasicView, ComponentData, ComponentId, GameObject, Handle,
    ValueMap, View,
};
use keystone_core::math::Vec3;
use keystone_core::CoreResult;

use crate::geometry::{Aabb, BoundingSphere};
use crate::loading::read_blob;
use crate::scene::{SceneEntityHandle, SceneId};
use crate::transforms::{NodeHandle, TransformComponent};

/// Visibility row of one scene entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityFields {
    /// Entity in its scene.
    pub entity: SceneEntityHandle,
    /// Scene the entity was added to.
    pub scene: SceneId,
    /// Node that places the bounding sphere.
    pub node: NodeHandle,
    /// Included in frustum and volume queries.
    pub visible: bool,
    /// Included in ray casts.
    pub ray_visible: bool,
    /// Drawn in the transparent pass.
    pub transparent: bool,
    /// Bounding sphere in node space.
    pub bounding_sphere: BoundingSphere,
}

impl Default for VisibilityFields {
    fn default() -> Self {
        Self {
            entity: SceneEntityHandle::INVALID,
            scene: 0,
            node: NodeHandle::INVALID,
            visible: true,
            ray_visible: true,
            transparent: false,
            bounding_sphere: BoundingSphere::new(Vec3::ZERO, 1.0),
        }
    }
}

impl VisibilityFields {
    /// Bounding sphere in world space.
    #[must_use]
    pub fn world_sphere(&self, transforms: &TransformComponent) -> BoundingSphere {
        let world = transforms.world_transform(self.node).unwrap_or_default();
        BoundingSphere::new(
            world.transform_point(self.bounding_sphere.center),
            self.bounding_sphere.radius * world.scale.abs().max_element(),
        )
    }

    /// Box around [`VisibilityFields::world_sphere`].
    #[must_use]
    pub fn world_aabb(&self, transforms: &TransformComponent) -> Aabb {
        Aabb::from_sphere(&self.world_sphere(transforms))
    }
}

/// Visibility blob flag: frustum visible.
pub const VISIBLE_FLAG: u32 = 1 << 0;
/// Visibility blob flag: ray visible.
pub const RAY_VISIBLE_FLAG: u32 = 1 << 1;
/// Visibility blob flag: transparent.
pub const TRANSPARENT_FLAG: u32 = 1 << 2;

/// Serialized visibility settings.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct VisibilityBlob {
    /// Sphere centre in node space.
    pub center: [f32; 3],
    /// Sphere radius.
    pub radius: f32,
    /// `*_FLAG` bits.
    pub flags: u32,
}

impl ComponentData for VisibilityFields {
    const ID: ComponentId = component_id("SceneVisibility");
    const NAME: &'static str = "SceneVisibility";

    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        _values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let desc: VisibilityBlob = read_blob(Self::ID, blob)?;
        let fields = VisibilityFields {
            visible: desc.flags & VISIBLE_FLAG != 0,
            ray_visible: desc.flags & RAY_VISIBLE_FLAG != 0,
            transparent: desc.flags & TRANSPARENT_FLAG != 0,
            bounding_sphere: BoundingSphere::new(Vec3::from_array(desc.center), desc.radius),
            ..VisibilityFields::default()
        };
        let view = go.add_view(|| VisibilityView::new(component, VisibilityFields::default()));
        *view.inner.get_mut() = fields;
        Ok(())
    }
}

/// Store of visibility rows.
pub type VisibilityComponent = BasicComponent<VisibilityFields>;

/// Handle to a visibility row.
pub type VisibilityHandle = Handle<VisibilityFields>;

/// A game object's visibility row.
pub struct VisibilityView {
    inner: BasicView<VisibilityFields>,
}

impl View for VisibilityView {
    const COMPONENT_ID: ComponentId = VisibilityFields::ID;
}

impl VisibilityView {
    /// Creates the row and the view.
    #[must_use]
    pub fn new(component: &Arc<VisibilityComponent>, fields: VisibilityFields) -> Self {
        Self {
            inner: BasicView::new(component, fields),
        }
    }

    /// Handle of the row.
    #[must_use]
    pub const fn handle(&self) -> VisibilityHandle {
        self.inner.handle()
    }

    /// Copy of the row.
    #[must_use]
    pub fn fields(&self) -> VisibilityFields {
        self.inner.get().clone()
    }

    /// Edits the row in place.
    pub fn modify(&self, f: impl FnOnce(&mut VisibilityFields)) {
        f(&mut self.inner.get_mut());
    }

    /// Includes or excludes the entity from culling queries.
    pub fn set_visible(&self, visible: bool) {
        self.inner.get_mut().visible = visible;
    }

    /// Includes or excludes the entity from ray casts.
    pub fn set_ray_visible(&self, visible: bool) {
        self.inner.get_mut().ray_visible = visible;
    }

    /// Marks the entity transparent.
    pub fn set_transparent(&self, transparent: bool) {
        self.inner.get_mut().transparent = transparent;
    }

    /// Replaces the node-space bounding sphere.
    pub fn set_bounding_sphere(&self, sphere: BoundingSphere) {
        self.inner.get_mut().bounding_sphere = sphere;
    }

    /// The placing node.
    #[must_use]
    pub fn node(&self) -> NodeHandle {
        self.inner.get().node
    }

    /// The entity in its scene.
    #[must_use]
    pub fn entity(&self) -> SceneEntityHandle {
        self.inner.get().entity
    }
}
