//! # Cameras
//!
//! Perspective cameras placed by scene nodes. Cameras look down their node's
//! -Z axis with +Y up.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use keystone_core::ecs::{
    component_id, find_value, BasicComponent, BasicView, ComponentData, ComponentId, GameObject,
    Handle, ValueMap, View,
};
use keystone_core::math::Vec3;
use keystone_core::{CoreError, CoreResult};

use crate::error::{SceneError, SceneResult};
use crate::geometry::Frustum;
use crate::loading::{read_blob, SceneLoadingContext, SCENE_LOADING_CONTEXT_KID};
use crate::transforms::{NodeHandle, TransformComponent};

/// Perspective camera row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Placing node.
    pub node: NodeHandle,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Width over height.
    pub aspect: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            node: NodeHandle::INVALID,
            fov: std::f32::consts::FRAC_PI_3,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Camera {
    /// World-space frustum; `None` if the node is gone.
    #[must_use]
    pub fn frustum(&self, transforms: &TransformComponent) -> Option<Frustum> {
        let world = transforms.world_transform(self.node)?;
        let forward = world.rotation.rotate(Vec3::new(0.0, 0.0, -1.0));
        let up = world.rotation.rotate(Vec3::Y);
        Some(Frustum::from_perspective(
            world.position,
            forward,
            up,
            self.fov,
            self.aspect,
            self.near,
            self.far,
        ))
    }

    /// World-space eye position.
    #[must_use]
    pub fn position(&self, transforms: &TransformComponent) -> Option<Vec3> {
        transforms.position_w(self.node)
    }
}

/// Serialized camera.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraBlob {
    /// Index into the loading context's node table.
    pub node_index: u32,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Width over height.
    pub aspect: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
}

impl ComponentData for Camera {
    const ID: ComponentId = component_id("Camera");
    const NAME: &'static str = "Camera";

    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let desc: CameraBlob = read_blob(Self::ID, blob)?;
        let ctx = find_value::<SceneLoadingContext>(values, SCENE_LOADING_CONTEXT_KID)
            .ok_or(CoreError::MissingValue(SCENE_LOADING_CONTEXT_KID))?;
        let node = ctx.node(desc.node_index).ok_or_else(|| CoreError::InvalidBlob {
            id: Self::ID,
            reason: format!("node index {} out of range", desc.node_index),
        })?;
        let camera = Camera {
            node,
            fov: desc.fov,
            aspect: desc.aspect,
            near: desc.near,
            far: desc.far,
        };
        go.add_view(|| CameraView::new(component, camera));
        Ok(())
    }
}

/// Store of cameras.
pub type CameraComponent = BasicComponent<Camera>;

/// Handle to a camera row.
pub type CameraHandle = Handle<Camera>;

/// Looks up a camera's frustum.
///
/// # Errors
///
/// [`SceneError::UnknownCamera`] for dead handles, [`SceneError::UnknownNode`]
/// when the camera's node is gone.
pub fn get_frustum(
    cameras: &CameraComponent,
    transforms: &TransformComponent,
    camera: CameraHandle,
) -> SceneResult<Frustum> {
    let data = cameras
        .get(camera)
        .map(|c| *c)
        .ok_or(SceneError::UnknownCamera(camera.to_bits()))?;
    data.frustum(transforms)
        .ok_or(SceneError::UnknownNode(data.node.to_bits()))
}

/// A game object's camera.
pub struct CameraView {
    inner: BasicView<Camera>,
}

impl View for CameraView {
    const COMPONENT_ID: ComponentId = Camera::ID;
}

impl CameraView {
    /// Creates the row and the view.
    #[must_use]
    pub fn new(component: &Arc<CameraComponent>, camera: Camera) -> Self {
        Self {
            inner: BasicView::new(component, camera),
        }
    }

    /// Handle of the row.
    #[must_use]
    pub const fn handle(&self) -> CameraHandle {
        self.inner.handle()
    }

    /// Copy of the row.
    #[must_use]
    pub fn camera(&self) -> Camera {
        *self.inner.get()
    }

    /// Sets the aspect ratio, usually after a resize.
    pub fn set_aspect(&self, aspect: f32) {
        self.inner.get_mut().aspect = aspect;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingSphere;
    use keystone_core::math::Transform;

    #[test]
    fn test_frustum_follows_node() {
        let transforms = TransformComponent::new();
        let cameras = CameraComponent::shared();
        let node = transforms.create_node_with(Transform::from_position(Vec3::new(0.0, 0.0, 10.0)));
        let handle = cameras.create(Camera {
            node,
            ..Camera::default()
        });

        let frustum = get_frustum(&cameras, &transforms, handle).unwrap();
        assert!(frustum.intersects_sphere(&BoundingSphere::new(Vec3::ZERO, 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0)));

        // Turn around: the origin is now behind.
        transforms.yaw(node, std::f32::consts::PI);
        let frustum = get_frustum(&cameras, &transforms, handle).unwrap();
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::ZERO, 1.0)));
    }

    #[test]
    fn test_unknown_camera() {
        let transforms = TransformComponent::new();
        let cameras = CameraComponent::shared();
        let err = get_frustum(&cameras, &transforms, CameraHandle::INVALID).unwrap_err();
        assert!(matches!(err, SceneError::UnknownCamera(_)));
    }
}
