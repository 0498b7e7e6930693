//! # Lights
//!
//! Point, spot and directional lights placed by scene nodes, with the shadow
//! bookkeeping that decides when a light's shadow map must be redrawn.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use keystone_core::ecs::{
    component_id, find_value, BasicComponent, BasicView, ComponentData, ComponentId, GameObject,
    Handle, ValueMap, View,
};
use keystone_core::math::Vec3;
use keystone_core::{CoreError, CoreResult};

use crate::geometry::{Aabb, Cone};
use crate::loading::{read_blob, SceneLoadingContext, SCENE_LOADING_CONTEXT_KID};
use crate::transforms::{NodeHandle, TransformComponent};
use crate::visibility::VisibilityHandle;

/// Light shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightKind {
    /// Omnidirectional, bounded by its radius.
    #[default]
    Point,
    /// Cone along the node's forward axis (-Z).
    Spot,
    /// Infinitely distant, no volume.
    Directional,
}

impl LightKind {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Point),
            1 => Some(Self::Spot),
            2 => Some(Self::Directional),
            _ => None,
        }
    }
}

/// Whether the light's shadow needs redrawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightState {
    /// Shadow map is current.
    Clean,
    /// Shadow map must be redrawn.
    #[default]
    Dirty,
}

/// Shadow bookkeeping of a light.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShadowState {
    /// Shadow map edge length in texels.
    pub shadow_map_size: u32,
    /// Sorted visibility rows inside the light volume at the last update.
    pub visible_objects: Vec<VisibilityHandle>,
}

/// Light row.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Shape.
    pub kind: LightKind,
    /// Linear RGB colour.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Range of point and spot lights.
    pub radius: f32,
    /// Spot inner half-angle in radians.
    pub inner_angle: f32,
    /// Spot outer half-angle in radians.
    pub outer_angle: f32,
    /// Placing node.
    pub node: NodeHandle,
    /// Shadow state flag.
    pub state: LightState,
    /// Created by the first light update.
    pub shadow: Option<ShadowState>,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            kind: LightKind::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
            inner_angle: 0.3,
            outer_angle: 0.5,
            node: NodeHandle::INVALID,
            state: LightState::Dirty,
            shadow: None,
        }
    }
}

impl Light {
    /// World-space box around the light's volume; `None` for directional lights.
    #[must_use]
    pub fn volume(&self, transforms: &TransformComponent) -> Option<Aabb> {
        if self.kind == LightKind::Directional {
            return None;
        }
        let position = transforms.position_w(self.node)?;
        Some(Aabb::from_center(position, Vec3::splat(self.radius)))
    }

    /// World-space cone of a spot light.
    #[must_use]
    pub fn cone(&self, transforms: &TransformComponent) -> Option<Cone> {
        if self.kind != LightKind::Spot {
            return None;
        }
        let world = transforms.world_transform(self.node)?;
        let forward = world.rotation.rotate(Vec3::new(0.0, 0.0, -1.0));
        Some(Cone::new(world.position, forward, self.outer_angle, self.radius))
    }
}

/// Serialized light.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightBlob {
    /// 0 point, 1 spot, 2 directional.
    pub kind: u32,
    /// Linear RGB colour.
    pub color: [f32; 3],
    /// Intensity multiplier.
    pub intensity: f32,
    /// Range.
    pub radius: f32,
    /// Spot inner half-angle.
    pub inner_angle: f32,
    /// Spot outer half-angle.
    pub outer_angle: f32,
    /// Index into the loading context's node table.
    pub node_index: u32,
}

impl ComponentData for Light {
    const ID: ComponentId = component_id("Light");
    const NAME: &'static str = "Light";

    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let desc: LightBlob = read_blob(Self::ID, blob)?;
        let ctx = find_value::<SceneLoadingContext>(values, SCENE_LOADING_CONTEXT_KID)
            .ok_or(CoreError::MissingValue(SCENE_LOADING_CONTEXT_KID))?;
        let invalid = |reason: String| CoreError::InvalidBlob { id: Self::ID, reason };

        let kind = LightKind::from_raw(desc.kind)
            .ok_or_else(|| invalid(format!("unknown light kind {}", desc.kind)))?;
        let node = ctx
            .node(desc.node_index)
            .ok_or_else(|| invalid(format!("node index {} out of range", desc.node_index)))?;

        let light = Light {
            kind,
            color: Vec3::from_array(desc.color),
            intensity: desc.intensity,
            radius: desc.radius,
            inner_angle: desc.inner_angle,
            outer_angle: desc.outer_angle,
            node,
            ..Light::default()
        };
        go.add_view(|| LightView::new(component, light));
        Ok(())
    }
}

/// Store of lights.
pub type LightComponent = BasicComponent<Light>;

/// Handle to a light row.
pub type LightHandle = Handle<Light>;

/// A game object's light.
pub struct LightView {
    inner: BasicView<Light>,
}

impl View for LightView {
    const COMPONENT_ID: ComponentId = Light::ID;
}

impl LightView {
    /// Creates the row and the view.
    #[must_use]
    pub fn new(component: &Arc<LightComponent>, light: Light) -> Self {
        Self {
            inner: BasicView::new(component, light),
        }
    }

    /// Handle of the row.
    #[must_use]
    pub const fn handle(&self) -> LightHandle {
        self.inner.handle()
    }

    /// Copy of the row.
    #[must_use]
    pub fn light(&self) -> Light {
        self.inner.get().clone()
    }

    /// Edits the row in place.
    pub fn modify(&self, f: impl FnOnce(&mut Light)) {
        f(&mut self.inner.get_mut());
    }

    /// Sets colour and intensity.
    pub fn set_color(&self, color: Vec3, intensity: f32) {
        let mut light = self.inner.get_mut();
        light.color = color;
        light.intensity = intensity;
        light.state = LightState::Dirty;
    }

    /// Sets the range.
    pub fn set_radius(&self, radius: f32) {
        let mut light = self.inner.get_mut();
        light.radius = radius;
        light.state = LightState::Dirty;
    }

    /// Current shadow state flag.
    #[must_use]
    pub fn state(&self) -> LightState {
        self.inner.get().state
    }
}

/// Compares a freshly gathered, sorted set of objects inside a light against
/// the previous one and updates the light's state.
///
/// The light becomes dirty when its own node moved, when the set changed, or
/// when any object in the set moved this frame.
///
/// # Returns
///
/// `true` if the light is dirty afterwards.
pub fn refresh_shadow_state(
    light: &mut Light,
    light_moved: bool,
    objects: Vec<VisibilityHandle>,
    object_moved: impl Fn(VisibilityHandle) -> bool,
    shadow_map_size: u32,
) -> bool {
    if light_moved {
        light.state = LightState::Dirty;
    }

    match &mut light.shadow {
        Some(shadow) => {
            if shadow.visible_objects != objects {
                shadow.visible_objects = objects;
                light.state = LightState::Dirty;
            } else if objects.iter().any(|&o| object_moved(o)) {
                light.state = LightState::Dirty;
            }
        }
        None => {
            light.shadow = Some(ShadowState {
                shadow_map_size,
                visible_objects: objects,
            });
            light.state = LightState::Dirty;
        }
    }
    light.state == LightState::Dirty
}
