//! # KEYSTONE Scene
//!
//! Spatial side of the runtime:
//! - Bounding volumes plus frustum, ray and cone query shapes
//! - A scene node hierarchy with cached world transforms
//! - Scenes of game objects and a Morton-ordered 4-wide BVH rebuilt per frame
//! - Lights with shadow bookkeeping, cameras, brushes and the PVS gather
//! - Loading hooks that build entities from component blobs
//!
//! ## Frame Order
//!
//! All scene work runs as update tasks with explicit edges:
//!
//! ```text
//! transforms ──▶ BVH ──┬──▶ visible lights ──▶ light update
//!                      └──▶ PVS gather
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! let scene = Scene::shared(SceneStores::new(), SceneSettings::default());
//! let entity = scene.add_game_object(GameObject::new());
//! let hits = scene.ray_cast(&Ray::new(Vec3::ZERO, Vec3::X));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bvh;
pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod lights;
pub mod loading;
pub mod render;
pub mod scene;
pub mod transforms;
pub mod visibility;

pub use bvh::{BvhElement, SceneBvh};
pub use camera::{Camera, CameraComponent, CameraHandle, CameraView};
pub use config::SceneSettings;
pub use error::{SceneError, SceneResult};
pub use geometry::{Aabb, BoundingSphere, BoundingVolumeQuery, Cone, Frustum, Ray};
pub use lights::{Light, LightComponent, LightHandle, LightKind, LightState, LightView};
pub use loading::{load_entities, EntityDesc, NodeBlob, SceneLoadingContext};
pub use render::{Brush, BrushComponent, BrushView, MeshLod, PvEntry, Pvs};
pub use scene::{RayHit, Scene, SceneEntityHandle, SceneId, SceneStores};
pub use transforms::{NodeHandle, SceneNodeView, TransformComponent};
pub use visibility::{VisibilityComponent, VisibilityFields, VisibilityView};
