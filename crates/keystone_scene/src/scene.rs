//! # Scene
//!
//! A set of game objects sharing the engine's component stores, plus the
//! spatial index rebuilt from them every frame.
//!
//! ## Frame tasks
//!
//! ```text
//! transform update ──▶ BVH build ──┬──▶ visible lights ──▶ light update
//!                                  └──▶ PVS gather
//! ```
//!
//! Every spatial query of a frame reads the BVH built from that frame's
//! post-transform positions.
//!
//! ## Locking
//!
//! The entity table is never locked while a component store lock is held.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use keystone_core::ecs::{
    Component, ComponentId, DenseStorage, GameObject, Handle, Registry, RequestSet, ViewQuery,
};
use keystone_core::components::get_string_id;
use keystone_core::tasks::{parallel_for, TaskRef, UpdateDispatcher, WorkerContext};
use keystone_core::CoreResult;
use parking_lot::{Mutex, RwLock};

use crate::bvh::{BvhElement, BvhInput, SceneBvh};
use crate::camera::{get_frustum, CameraComponent, CameraHandle, CameraView};
use crate::config::SceneSettings;
use crate::geometry::{BoundingVolumeQuery, Frustum, Ray};
use crate::lights::{refresh_shadow_state, LightComponent, LightHandle, LightKind, LightState, LightView};
use crate::render::{gather_pvs, BrushComponent, BrushHandle, BrushView, Pvs};
use crate::transforms::{
    get_node, NodeFlags, NodeHandle, SceneNodeView, TransformComponent, TransformUpdate,
};
use crate::visibility::{VisibilityComponent, VisibilityHandle, VisibilityView};

/// Process-unique scene identifier.
pub type SceneId = u32;

/// Handle of a game object inside its scene.
pub type SceneEntityHandle = Handle<GameObject>;

static NEXT_SCENE_ID: AtomicU32 = AtomicU32::new(1);

/// The component stores a scene reads and writes.
#[derive(Clone)]
pub struct SceneStores {
    /// Scene nodes.
    pub transforms: Arc<TransformComponent>,
    /// Visibility rows.
    pub visibility: Arc<VisibilityComponent>,
    /// Lights.
    pub lights: Arc<LightComponent>,
    /// Cameras.
    pub cameras: Arc<CameraComponent>,
    /// Brushes.
    pub brushes: Arc<BrushComponent>,
}

impl std::fmt::Debug for SceneStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneStores")
            .field("transforms", &self.transforms.len())
            .field("visibility", &self.visibility.len())
            .field("lights", &self.lights.len())
            .field("cameras", &self.cameras.len())
            .field("brushes", &self.brushes.len())
            .finish()
    }
}

impl Default for SceneStores {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneStores {
    /// Fresh, unregistered stores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transforms: TransformComponent::shared(),
            visibility: VisibilityComponent::shared(),
            lights: LightComponent::shared(),
            cameras: CameraComponent::shared(),
            brushes: BrushComponent::shared(),
        }
    }

    /// Registers every store so blobs can be routed to them.
    ///
    /// # Errors
    ///
    /// [`keystone_core::CoreError::AlreadyRegistered`] if any ID is taken.
    pub fn register(&self, registry: &Registry) -> CoreResult<()> {
        registry.register(Arc::clone(&self.transforms))?;
        registry.register(Arc::clone(&self.visibility))?;
        registry.register(Arc::clone(&self.lights))?;
        registry.register(Arc::clone(&self.cameras))?;
        registry.register(Arc::clone(&self.brushes))?;
        Ok(())
    }

    /// Fetches the stores already registered in `registry`.
    ///
    /// # Errors
    ///
    /// [`keystone_core::CoreError::NotInitialized`] if any store is missing.
    pub fn from_registry(registry: &Registry) -> CoreResult<Self> {
        Ok(Self {
            transforms: registry.get::<TransformComponent>()?,
            visibility: registry.get::<VisibilityComponent>()?,
            lights: registry.get::<LightComponent>()?,
            cameras: registry.get::<CameraComponent>()?,
            brushes: registry.get::<BrushComponent>()?,
        })
    }

    /// Component IDs of every store, for logging.
    #[must_use]
    pub fn ids() -> [ComponentId; 5] {
        [
            TransformComponent::ID,
            VisibilityComponent::ID,
            LightComponent::ID,
            CameraComponent::ID,
            BrushComponent::ID,
        ]
    }
}

/// One hit of [`Scene::ray_cast`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Entity hit.
    pub entity: SceneEntityHandle,
    /// Its visibility row.
    pub visibility: VisibilityHandle,
    /// Distance along the ray to the entity's bounding sphere, `0.0` from inside.
    pub distance: f32,
}

/// Payload of [`Scene::update_scene_bvh`].
#[derive(Debug, Clone, Default)]
pub struct SceneBvhBuild {
    /// The hierarchy built this frame.
    pub bvh: Arc<SceneBvh>,
}

/// Payload of the light gathering tasks.
#[derive(Debug, Clone, Default)]
pub struct LightList {
    /// Sorted light handles.
    pub lights: Vec<LightHandle>,
}

/// Payload of [`Scene::update_lights`].
#[derive(Debug, Clone, Default)]
pub struct LightUpdate {
    /// Sorted lights whose shadow must be redrawn.
    pub dirty: Vec<LightHandle>,
}

/// Payload of [`Scene::gather_scene`].
#[derive(Debug, Clone, Default)]
pub struct GatherScene {
    /// What the camera may see.
    pub pvs: Pvs,
}

/// A set of game objects and the spatial index over them.
pub struct Scene {
    id: SceneId,
    stores: SceneStores,
    settings: SceneSettings,
    entities: RwLock<DenseStorage<GameObject>>,
    bvh: RwLock<Arc<SceneBvh>>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("entities", &self.len())
            .field("bvh_elements", &self.bvh.read().len())
            .finish()
    }
}

impl Scene {
    /// Creates an empty scene over `stores`.
    #[must_use]
    pub fn new(stores: SceneStores, settings: SceneSettings) -> Self {
        let id = NEXT_SCENE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(scene = id, "scene created");
        Self {
            id,
            stores,
            settings,
            entities: RwLock::new(DenseStorage::new()),
            bvh: RwLock::new(Arc::default()),
        }
    }

    /// [`Scene::new`] behind an `Arc`, as the task methods need.
    #[must_use]
    pub fn shared(stores: SceneStores, settings: SceneSettings) -> Arc<Self> {
        Arc::new(Self::new(stores, settings))
    }

    /// Scene identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SceneId {
        self.id
    }

    /// The shared component stores.
    #[inline]
    #[must_use]
    pub const fn stores(&self) -> &SceneStores {
        &self.stores
    }

    /// Scene settings.
    #[inline]
    #[must_use]
    pub const fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// `true` if the scene holds no entity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Checks whether `entity` is still in the scene.
    #[must_use]
    pub fn contains(&self, entity: SceneEntityHandle) -> bool {
        self.entities.read().contains(entity)
    }

    /// Takes ownership of a game object.
    ///
    /// The object gets a scene node and a visibility row if it lacks them.
    /// Lights, cameras and brushes without a node are placed on the entity's
    /// node, and a light's bounding sphere is widened to its radius.
    pub fn add_game_object(&self, mut go: GameObject) -> SceneEntityHandle {
        let node = match get_node(&go) {
            Some(node) => node,
            None => go.add_view(|| SceneNodeView::new(&self.stores.transforms)).node(),
        };
        let visibility = go
            .add_view(|| VisibilityView::new(&self.stores.visibility, Default::default()))
            .handle();
        self.adopt_components(&go, node, visibility);

        let entity = self.entities.write().insert(go);
        if let Some(mut row) = self.stores.visibility.get_mut(visibility) {
            row.entity = entity;
            row.scene = self.id;
            if row.node.is_invalid() {
                row.node = node;
            }
        }

        tracing::trace!(scene = self.id, entity = ?entity, "game object added");
        entity
    }

    fn adopt_components(&self, go: &GameObject, node: NodeHandle, visibility: VisibilityHandle) {
        if let Some(view) = go.get_view::<LightView>() {
            let mut radius = 0.0;
            view.modify(|light| {
                if light.node.is_invalid() {
                    light.node = node;
                }
                radius = light.radius;
            });
            if let Some(mut row) = self.stores.visibility.get_mut(visibility) {
                row.bounding_sphere.radius = radius;
                row.node = node;
            }
        }
        if let Some(view) = go.get_view::<CameraView>() {
            if let Some(mut camera) = self.stores.cameras.get_mut(view.handle()) {
                if camera.node.is_invalid() {
                    camera.node = node;
                }
            }
        }
        if let Some(view) = go.get_view::<BrushView>() {
            if view.brush().node.is_invalid() {
                view.set_node(node);
            }
        }
    }

    /// Removes an entity and releases its views.
    ///
    /// # Returns
    ///
    /// `false` if the entity was not in the scene.
    pub fn remove_entity(&self, entity: SceneEntityHandle) -> bool {
        let removed = self.entities.write().remove(entity);
        match removed {
            Some(go) => {
                drop(go);
                true
            }
            None => {
                tracing::warn!(scene = self.id, entity = ?entity, "remove of unknown entity");
                false
            }
        }
    }

    /// Removes every entity and invalidates the BVH.
    pub fn clear_scene(&self) {
        let drained = self.entities.write().drain();
        let count = drained.len();
        drop(drained);
        *self.bvh.write() = Arc::default();
        tracing::debug!(scene = self.id, entities = count, "scene cleared");
    }

    /// Runs `f` on an entity under the scene's write lock.
    ///
    /// `f` must not call back into this scene.
    pub fn with_game_object<R>(
        &self,
        entity: SceneEntityHandle,
        f: impl FnOnce(&mut GameObject) -> R,
    ) -> Option<R> {
        let mut entities = self.entities.write();
        entities.get_mut(entity).map(f)
    }

    /// First entity whose string ID is `name`.
    #[must_use]
    pub fn find_game_object(&self, name: &str) -> Option<SceneEntityHandle> {
        self.entities
            .read()
            .iter()
            .find(|(_, go)| get_string_id(go).is_some_and(|id| id == name))
            .map(|(handle, _)| handle)
    }

    /// Entities satisfying every request of `requests`.
    #[must_use]
    pub fn query_for<S: RequestSet>(&self, requests: &S) -> Vec<SceneEntityHandle> {
        self.entities
            .read()
            .iter()
            .filter(|(_, go)| requests.is_satisfied(go))
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Entities carrying every view of `Q`.
    #[must_use]
    pub fn query_handles<Q: ViewQuery>(&self) -> Vec<SceneEntityHandle> {
        self.entities
            .read()
            .iter()
            .filter(|(_, go)| go.has_all::<Q>())
            .map(|(handle, _)| handle)
            .collect()
    }

    /// The entity's brush row.
    #[must_use]
    pub fn brush_of(&self, entity: SceneEntityHandle) -> Option<BrushHandle> {
        let entities = self.entities.read();
        entities.get(entity)?.get_view::<BrushView>().map(BrushView::handle)
    }

    /// The entity's light row.
    #[must_use]
    pub fn light_of(&self, entity: SceneEntityHandle) -> Option<LightHandle> {
        let entities = self.entities.read();
        entities.get(entity)?.get_view::<LightView>().map(LightView::handle)
    }

    /// Rebuilds the BVH from every visible entity's current world bounds.
    pub fn build_bvh(&self) -> Arc<SceneBvh> {
        let inputs: Vec<BvhInput> = {
            let rows = self.stores.visibility.read();
            rows.iter()
                .filter(|(_, row)| row.scene == self.id && row.visible)
                .map(|(handle, row)| {
                    let sphere = row.world_sphere(&self.stores.transforms);
                    BvhInput {
                        entity: row.entity,
                        visibility: handle,
                        node: row.node,
                        position: sphere.center,
                        sphere,
                        ray_visible: row.ray_visible,
                    }
                })
                .collect()
        };
        let bvh = Arc::new(SceneBvh::build(&inputs));
        *self.bvh.write() = Arc::clone(&bvh);
        tracing::debug!(scene = self.id, elements = bvh.len(), nodes = bvh.nodes().len(), "scene BVH rebuilt");
        bvh
    }

    /// The last built BVH; invalid before the first build.
    #[must_use]
    pub fn bvh(&self) -> Arc<SceneBvh> {
        Arc::clone(&self.bvh.read())
    }

    fn current_bvh(&self) -> Arc<SceneBvh> {
        let bvh = self.bvh();
        if bvh.is_valid() {
            bvh
        } else {
            self.build_bvh()
        }
    }

    /// Elements of the current BVH intersecting `shape`.
    #[must_use]
    pub fn spatial_query<Q: BoundingVolumeQuery>(&self, shape: &Q) -> Vec<BvhElement> {
        self.current_bvh().query(shape)
    }

    /// Ray-visible entities along `ray`, nearest first.
    #[must_use]
    pub fn ray_cast(&self, ray: &Ray) -> Vec<RayHit> {
        let bvh = self.current_bvh();
        let mut hits = Vec::new();
        bvh.traverse(ray, |element, _| {
            if !element.ray_visible {
                return;
            }
            if let Some(distance) = ray.intersect_sphere(&element.sphere) {
                hits.push(RayHit {
                    entity: element.entity,
                    visibility: element.visibility,
                    distance,
                });
            }
        });
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Every light attached to an entity of this scene, sorted.
    #[must_use]
    pub fn scene_lights(&self) -> Vec<LightHandle> {
        let mut lights: Vec<LightHandle> = self
            .entities
            .read()
            .iter()
            .filter_map(|(_, go)| go.get_view::<LightView>().map(LightView::handle))
            .collect();
        lights.sort_unstable();
        lights
    }

    /// Number of lights in the scene.
    #[must_use]
    pub fn light_count(&self) -> usize {
        self.scene_lights().len()
    }

    /// Lights whose volume intersects `frustum`; directional lights always.
    #[must_use]
    pub fn find_lights(&self, frustum: &Frustum) -> Vec<LightHandle> {
        self.scene_lights()
            .into_iter()
            .filter(|&handle| {
                let Some(light) = self.stores.lights.get(handle).map(|l| l.clone()) else {
                    return false;
                };
                match light.volume(&self.stores.transforms) {
                    Some(volume) => frustum.intersects_aabb(&volume),
                    None => light.kind == LightKind::Directional,
                }
            })
            .collect()
    }

    /// Marks lights clean once their shadow maps were redrawn.
    pub fn mark_lights_clean(&self, lights: &[LightHandle]) {
        for &handle in lights {
            if let Some(mut light) = self.stores.lights.get_mut(handle) {
                light.state = LightState::Clean;
            }
        }
    }

    /// Schedules the BVH rebuild after the transform update.
    pub fn update_scene_bvh(
        self: &Arc<Self>,
        dispatcher: &mut UpdateDispatcher,
        transforms: &TaskRef<TransformUpdate>,
    ) -> TaskRef<SceneBvhBuild> {
        let scene = Arc::clone(self);
        dispatcher.add(
            |builder, _: &mut SceneBvhBuild| {
                builder.set_debug_string("Update Scene BVH").add_input(transforms);
            },
            move |data, _| data.bvh = scene.build_bvh(),
        )
    }

    /// Schedules a task listing every light of the scene.
    pub fn get_lights(self: &Arc<Self>, dispatcher: &mut UpdateDispatcher) -> TaskRef<LightList> {
        let scene = Arc::clone(self);
        dispatcher.add(
            |builder, _: &mut LightList| {
                builder.set_debug_string("Get Lights");
            },
            move |data, _| data.lights = scene.scene_lights(),
        )
    }

    /// Schedules a task listing the lights a camera may see, from the BVH.
    ///
    /// Directional lights are always included. An unknown camera yields an
    /// empty list.
    pub fn get_visible_lights(
        self: &Arc<Self>,
        dispatcher: &mut UpdateDispatcher,
        camera: CameraHandle,
        bvh: &TaskRef<SceneBvhBuild>,
    ) -> TaskRef<LightList> {
        let scene = Arc::clone(self);
        let built = bvh.shared_data();
        dispatcher.add(
            |builder, _: &mut LightList| {
                builder.set_debug_string("Get Visible Lights").add_input(bvh);
            },
            move |data, _| {
                let bvh = Arc::clone(&built.lock().bvh);
                data.lights = scene.visible_lights(&bvh, camera);
            },
        )
    }

    fn visible_lights(&self, bvh: &SceneBvh, camera: CameraHandle) -> Vec<LightHandle> {
        let frustum = match get_frustum(&self.stores.cameras, &self.stores.transforms, camera) {
            Ok(frustum) => frustum,
            Err(err) => {
                tracing::warn!(scene = self.id, error = %err, "no frustum for light gather");
                return Vec::new();
            }
        };

        let mut lights: Vec<LightHandle> = bvh
            .query(&frustum)
            .iter()
            .filter_map(|element| self.light_of(element.entity))
            .collect();
        lights.extend(self.scene_lights().into_iter().filter(|&handle| {
            self.stores
                .lights
                .get(handle)
                .is_some_and(|l| l.kind == LightKind::Directional)
        }));
        lights.sort_unstable();
        lights.dedup();
        lights
    }

    /// Schedules the shadow bookkeeping of the visible lights, one
    /// [`parallel_for`] item per light.
    pub fn update_lights(
        self: &Arc<Self>,
        dispatcher: &mut UpdateDispatcher,
        bvh: &TaskRef<SceneBvhBuild>,
        visible: &TaskRef<LightList>,
    ) -> TaskRef<LightUpdate> {
        let scene = Arc::clone(self);
        let built = bvh.shared_data();
        let lights = visible.shared_data();
        dispatcher.add(
            |builder, _: &mut LightUpdate| {
                builder
                    .set_debug_string("Update Lights")
                    .add_input(bvh)
                    .add_input(visible);
            },
            move |data, ctx| {
                let bvh = Arc::clone(&built.lock().bvh);
                let lights = lights.lock().lights.clone();
                data.dirty = scene.refresh_lights(ctx, bvh, lights);
            },
        )
    }

    fn refresh_lights(
        self: &Arc<Self>,
        ctx: &WorkerContext,
        bvh: Arc<SceneBvh>,
        lights: Vec<LightHandle>,
    ) -> Vec<LightHandle> {
        let dirty = Arc::new(Mutex::new(Vec::new()));
        let scene = Arc::clone(self);
        let out = Arc::clone(&dirty);
        let result = parallel_for(ctx, lights, move |handle: LightHandle, ctx: &WorkerContext| {
            if scene.refresh_light(ctx, &bvh, handle) {
                out.lock().push(handle);
            }
        });
        if let Err(err) = result {
            tracing::error!(scene = self.id, error = %err, "light update incomplete");
        }

        let mut dirty = std::mem::take(&mut *dirty.lock());
        dirty.sort_unstable();
        tracing::trace!(scene = self.id, dirty = dirty.len(), "lights updated");
        dirty
    }

    fn refresh_light(&self, ctx: &WorkerContext, bvh: &SceneBvh, handle: LightHandle) -> bool {
        let transforms = &self.stores.transforms;
        let moved = |node: NodeHandle| transforms.flags(node).intersects(NodeFlags::DIRTY | NodeFlags::UPDATED);

        let Some(mut light) = self.stores.lights.get(handle).map(|l| l.clone()) else {
            return false;
        };
        let hits = light.volume(transforms).map(|volume| bvh.query(&volume)).unwrap_or_default();
        // Lives for this item only; charged to the worker's scratch budget.
        let mut objects: Vec<(VisibilityHandle, bool)> = ctx.scratch().vec_with_capacity(hits.len());
        objects.extend(
            hits.iter()
                .filter(|element| element.node != light.node)
                .map(|element| (element.visibility, moved(element.node))),
        );
        objects.sort_unstable_by_key(|(visibility, _)| *visibility);

        let light_moved = moved(light.node);
        let handles = objects.iter().map(|(visibility, _)| *visibility).collect();
        let dirty = refresh_shadow_state(
            &mut light,
            light_moved,
            handles,
            |visibility| {
                objects
                    .binary_search_by_key(&visibility, |(v, _)| *v)
                    .is_ok_and(|i| objects[i].1)
            },
            self.settings.shadow_map_size,
        );

        // Other items only read their own row; write back state and shadow only.
        if let Some(mut row) = self.stores.lights.get_mut(handle) {
            row.state = light.state;
            row.shadow = light.shadow;
        }
        dirty
    }

    /// Schedules the PVS gather for `camera` after the BVH build.
    ///
    /// An unknown camera yields an empty PVS.
    pub fn gather_scene(
        self: &Arc<Self>,
        dispatcher: &mut UpdateDispatcher,
        camera: CameraHandle,
        bvh: &TaskRef<SceneBvhBuild>,
    ) -> TaskRef<GatherScene> {
        let scene = Arc::clone(self);
        let built = bvh.shared_data();
        dispatcher.add(
            |builder, _: &mut GatherScene| {
                builder.set_debug_string("Gather Scene").add_input(bvh);
            },
            move |data, _| {
                let bvh = Arc::clone(&built.lock().bvh);
                data.pvs = scene.gather(&bvh, camera);
            },
        )
    }

    /// Gathers the PVS of `camera` against `bvh` on the calling thread.
    #[must_use]
    pub fn gather(&self, bvh: &SceneBvh, camera: CameraHandle) -> Pvs {
        let transforms = &self.stores.transforms;
        let frustum = get_frustum(&self.stores.cameras, transforms, camera);
        let position = self
            .stores
            .cameras
            .get(camera)
            .and_then(|c| c.position(transforms));
        match (frustum, position) {
            (Ok(frustum), Some(position)) => gather_pvs(self, bvh, &frustum, position),
            (Err(err), _) => {
                tracing::warn!(scene = self.id, error = %err, "no frustum for PVS gather");
                Pvs::default()
            }
            (Ok(_), None) => Pvs::default(),
        }
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        let entities = self.entities.get_mut().drain();
        tracing::trace!(scene = self.id, entities = entities.len(), "scene dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::geometry::{Aabb, BoundingSphere};
    use crate::lights::Light;
    use crate::render::{Brush, MeshLod};
    use crate::transforms::queue_transform_update_task;
    use keystone_core::components::{set_string_id, StringIdComponent};
    use keystone_core::ecs::{Has, Read};
    use keystone_core::math::{Transform, Vec3};
    use keystone_core::ThreadPool;
    use smallvec::smallvec;

    fn scene() -> Arc<Scene> {
        Scene::shared(SceneStores::new(), SceneSettings::default())
    }

    fn entity_at(scene: &Scene, position: Vec3, radius: f32) -> SceneEntityHandle {
        let stores = scene.stores();
        let mut go = GameObject::new();
        let node = stores.transforms.create_node_with(Transform::from_position(position));
        go.add_view(|| SceneNodeView::attach(&stores.transforms, node));
        go.add_view(|| {
            VisibilityView::new(
                &stores.visibility,
                crate::visibility::VisibilityFields {
                    bounding_sphere: BoundingSphere::new(Vec3::ZERO, radius),
                    ..Default::default()
                },
            )
        });
        scene.add_game_object(go)
    }

    #[test]
    fn test_add_fills_visibility_row() {
        let scene = scene();
        let entity = scene.add_game_object(GameObject::new());
        assert!(scene.contains(entity));

        let rows = scene.stores().visibility.elements_copy();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity, entity);
        assert_eq!(rows[0].scene, scene.id());
        assert!(scene.stores().transforms.contains(rows[0].node));
    }

    #[test]
    fn test_remove_and_clear_release_views() {
        let scene = scene();
        let a = entity_at(&scene, Vec3::ZERO, 1.0);
        let _b = entity_at(&scene, Vec3::X, 1.0);

        assert!(scene.remove_entity(a));
        assert!(!scene.remove_entity(a));
        assert_eq!(scene.stores().visibility.len(), 1);

        scene.clear_scene();
        assert!(scene.is_empty());
        assert!(scene.stores().visibility.is_empty());
        assert!(scene.stores().transforms.is_empty());
        assert!(!scene.bvh().is_valid());
    }

    #[test]
    fn test_find_and_query() {
        let scene = scene();
        let names = StringIdComponent::shared();
        let mut go = GameObject::new();
        set_string_id(&mut go, &names, "lamp");
        go.add_view(|| LightView::new(&scene.stores().lights, Light::default()));
        let lamp = scene.add_game_object(go);
        let plain = entity_at(&scene, Vec3::ZERO, 1.0);

        assert_eq!(scene.find_game_object("lamp"), Some(lamp));
        assert_eq!(scene.find_game_object("nope"), None);
        assert_eq!(scene.query_handles::<(Read<LightView>,)>(), vec![lamp]);
        let mut with_node = scene.query_for(&(Has::<Read<SceneNodeView>>::new(),));
        with_node.sort_unstable();
        assert_eq!(with_node.len(), 2);
        assert!(with_node.contains(&plain));

        let renamed = scene.with_game_object(lamp, |go| {
            set_string_id(go, &names, "sun");
            go.len()
        });
        assert!(renamed.is_some());
        assert_eq!(scene.find_game_object("sun"), Some(lamp));
    }

    #[test]
    fn test_light_takes_entity_node_and_radius() {
        let scene = scene();
        let mut go = GameObject::new();
        let light = Light {
            radius: 7.0,
            ..Light::default()
        };
        go.add_view(|| LightView::new(&scene.stores().lights, light));
        scene.add_game_object(go);

        let row = &scene.stores().visibility.elements_copy()[0];
        assert!((row.bounding_sphere.radius - 7.0).abs() < f32::EPSILON);
        let light = &scene.stores().lights.elements_copy()[0];
        assert_eq!(light.node, row.node);
        assert_eq!(scene.light_count(), 1);
    }

    #[test]
    fn test_ray_cast_sorted_and_filtered() {
        let scene = scene();
        let far = entity_at(&scene, Vec3::new(20.0, 0.0, 0.0), 1.0);
        let near = entity_at(&scene, Vec3::new(5.0, 0.0, 0.0), 1.0);
        let hidden = entity_at(&scene, Vec3::new(10.0, 0.0, 0.0), 1.0);
        scene.with_game_object(hidden, |go| {
            go.get_view::<VisibilityView>().unwrap().set_ray_visible(false);
        });

        let hits = scene.ray_cast(&Ray::new(Vec3::ZERO, Vec3::X));
        let order: Vec<_> = hits.iter().map(|h| h.entity).collect();
        assert_eq!(order, vec![near, far]);
        assert!((hits[0].distance - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_ray_cast_misses_box_corner() {
        let scene = scene();
        entity_at(&scene, Vec3::new(5.0, 0.0, 0.0), 1.0);

        // Inside the bounding box, outside the sphere.
        assert!(scene.ray_cast(&Ray::new(Vec3::new(0.0, 0.9, 0.9), Vec3::X)).is_empty());
        assert_eq!(scene.ray_cast(&Ray::new(Vec3::new(0.0, 0.5, 0.0), Vec3::X)).len(), 1);
    }

    #[test]
    fn test_gather_culls_box_corner() {
        let scene = scene();
        let stores = scene.stores().clone();
        let spawn = |position: Vec3| {
            let mut go = GameObject::new();
            let node = stores.transforms.create_node_with(Transform::from_position(position));
            go.add_view(|| SceneNodeView::attach(&stores.transforms, node));
            go.add_view(|| {
                VisibilityView::new(
                    &stores.visibility,
                    crate::visibility::VisibilityFields {
                        bounding_sphere: BoundingSphere::new(Vec3::ZERO, 1.0),
                        ..Default::default()
                    },
                )
            });
            go.add_view(|| {
                BrushView::new(
                    &stores.brushes,
                    Brush {
                        meshes: smallvec![MeshLod::resident(1)],
                        ..Brush::default()
                    },
                )
            });
            scene.add_game_object(go)
        };
        let inside = spawn(Vec3::new(0.0, 0.0, -10.0));
        // Sphere clear of the left plane, box corner across it.
        spawn(Vec3::new(-11.8, 0.0, -10.0));

        let bvh = scene.build_bvh();
        let frustum = Frustum::from_perspective(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        );
        assert_eq!(bvh.query(&frustum).len(), 2);

        let pvs = gather_pvs(&scene, &bvh, &frustum, Vec3::ZERO);
        let entities: Vec<_> = pvs.solid.iter().map(|entry| entry.entity).collect();
        assert_eq!(entities, vec![inside]);
    }

    #[test]
    fn test_frame_tasks() {
        let scene = scene();
        let stores = scene.stores().clone();
        for i in 0..8 {
            let mut go = GameObject::new();
            let node = stores.transforms.create_node_with(Transform::from_position(Vec3::new(0.0, 0.0, -(i as f32) * 4.0 - 5.0)));
            go.add_view(|| SceneNodeView::attach(&stores.transforms, node));
            go.add_view(|| {
                BrushView::new(
                    &stores.brushes,
                    Brush {
                        meshes: smallvec![MeshLod::resident(3)],
                        ..Brush::default()
                    },
                )
            });
            scene.add_game_object(go);
        }
        let mut lamp = GameObject::new();
        lamp.add_view(|| LightView::new(&stores.lights, Light::default()));
        let lamp = scene.add_game_object(lamp);

        let camera_node = stores.transforms.create_node();
        let camera = stores.cameras.create(Camera {
            node: camera_node,
            ..Camera::default()
        });

        let pool = Arc::new(ThreadPool::new(2).unwrap());
        let mut dispatcher = UpdateDispatcher::new(pool);
        let transforms = queue_transform_update_task(&mut dispatcher, &stores.transforms);
        let bvh = scene.update_scene_bvh(&mut dispatcher, &transforms);
        let visible = scene.get_visible_lights(&mut dispatcher, camera, &bvh);
        let update = scene.update_lights(&mut dispatcher, &bvh, &visible);
        let gather = scene.gather_scene(&mut dispatcher, camera, &bvh);
        let all = scene.get_lights(&mut dispatcher);
        dispatcher.execute().unwrap();

        assert_eq!(bvh.data().bvh.len(), 9);
        assert_eq!(all.data().lights.len(), 1);
        let light = scene.light_of(lamp).unwrap();
        assert_eq!(update.data().dirty, vec![light]);
        let pvs = gather.data().pvs.clone();
        assert_eq!(pvs.solid.len(), 8);
        assert!(pvs.solid.windows(2).all(|w| w[0].sort_key <= w[1].sort_key));

        // Nothing moved: after the renderer consumed the shadow, the light stays clean.
        scene.mark_lights_clean(&update.data().dirty);
        let transforms = queue_transform_update_task(&mut dispatcher, &stores.transforms);
        let bvh = scene.update_scene_bvh(&mut dispatcher, &transforms);
        let visible = scene.get_visible_lights(&mut dispatcher, camera, &bvh);
        let update = scene.update_lights(&mut dispatcher, &bvh, &visible);
        dispatcher.execute().unwrap();
        assert!(update.data().dirty.is_empty());
        assert!(!scene
            .spatial_query(&Aabb::new(Vec3::splat(-1.0), Vec3::ONE))
            .is_empty());
    }
}
