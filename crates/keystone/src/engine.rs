//! # Engine Bootstrap
//!
//! The [`Engine`] owns everything that outlives a scene: the worker pool,
//! the component registry and one store per standard component. Scenes
//! created from it share those stores, so blob loading routes through the
//! same registry the frame loop reads from.

use std::sync::Arc;

use keystone_core::math::Transform;
use keystone_core::{Registry, StringIdComponent, ThreadPool, TriggerComponent};
use keystone_scene::loading::load_entities;
use keystone_scene::{
    Camera, CameraHandle, CameraView, EntityDesc, NodeBlob, Scene, SceneEntityHandle,
    SceneLoadingContext, SceneStores,
};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::frame::FrameLoop;

/// Pool, registry and standard component stores.
pub struct Engine {
    config: EngineConfig,
    pool: Arc<ThreadPool>,
    registry: Registry,
    stores: SceneStores,
    string_ids: Arc<StringIdComponent>,
    triggers: Arc<TriggerComponent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("workers", &self.pool.worker_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Validates `config`, spawns the pool and registers every store.
    ///
    /// # Errors
    ///
    /// Returns the validation error of the offending layer, or
    /// [`keystone_core::CoreError`] if the pool cannot start or a store ID
    /// collides.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let pool = Arc::new(ThreadPool::from_config(&config.core)?);

        let registry = Registry::new();
        let stores = SceneStores::new();
        stores.register(&registry)?;
        let string_ids = registry.register(StringIdComponent::shared())?;
        let triggers = registry.register(TriggerComponent::shared())?;

        tracing::info!(
            workers = pool.worker_count(),
            components = registry.component_list().len(),
            "engine started"
        );

        Ok(Self {
            config,
            pool,
            registry,
            stores,
            string_ids,
            triggers,
        })
    }

    /// Engine with default settings.
    ///
    /// # Errors
    ///
    /// See [`Engine::new`].
    pub fn with_defaults() -> EngineResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared worker pool.
    #[inline]
    #[must_use]
    pub const fn pool(&self) -> &Arc<ThreadPool> {
        &self.pool
    }

    /// Registry holding every standard store.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Scene stores shared by all scenes of this engine.
    #[inline]
    #[must_use]
    pub const fn stores(&self) -> &SceneStores {
        &self.stores
    }

    /// Name store.
    #[inline]
    #[must_use]
    pub const fn string_ids(&self) -> &Arc<StringIdComponent> {
        &self.string_ids
    }

    /// Signal/slot store.
    #[inline]
    #[must_use]
    pub const fn triggers(&self) -> &Arc<TriggerComponent> {
        &self.triggers
    }

    /// New empty scene over the engine's stores.
    #[must_use]
    pub fn create_scene(&self) -> Arc<Scene> {
        Scene::shared(self.stores.clone(), self.config.scene.clone())
    }

    /// Creates a scene, loads its node table, then builds `entities` from
    /// their component blobs.
    ///
    /// # Errors
    ///
    /// Any node table or entity error; the partly built scene is dropped.
    pub fn load_scene(
        &self,
        nodes: &[NodeBlob],
        entities: &[EntityDesc<'_>],
    ) -> EngineResult<(Arc<Scene>, Vec<SceneEntityHandle>)> {
        let scene = self.create_scene();
        let mut ctx = SceneLoadingContext::new(Arc::clone(&scene));
        ctx.load_nodes(nodes)?;
        let handles = load_entities(&self.registry, &ctx, entities)?;
        Ok((scene, handles))
    }

    /// Adds a free camera placed at `transform`, outside any scene.
    #[must_use]
    pub fn add_camera(&self, transform: Transform, camera: Camera) -> CameraHandle {
        let node = self.stores.transforms.create_node_with(transform);
        self.stores.cameras.create(Camera { node, ..camera })
    }

    /// Camera carried by a scene entity.
    #[must_use]
    pub fn camera_of(scene: &Scene, entity: SceneEntityHandle) -> Option<CameraHandle> {
        scene
            .with_game_object(entity, |go| go.get_view::<CameraView>().map(CameraView::handle))
            .flatten()
    }

    /// Frame driver bound to this engine's pool.
    #[must_use]
    pub fn frame_loop(&self) -> FrameLoop {
        FrameLoop::new(Arc::clone(&self.pool), self.stores.clone())
    }
}
