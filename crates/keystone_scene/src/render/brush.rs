//! Drawable brushes: a node plus the LOD state of each of its meshes.

use std::mem::size_of;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use keystone_core::ecs::{
    component_id, find_value, BasicComponent, BasicView, ComponentData, ComponentId, GameObject,
    Handle, ValueMap, View,
};
use keystone_core::math::Vec3;
use keystone_core::{CoreError, CoreResult};
use smallvec::SmallVec;

use crate::loading::{read_blob, read_blob_array, SceneLoadingContext, SCENE_LOADING_CONTEXT_KID};
use crate::transforms::{NodeHandle, TransformComponent};

/// LOD availability of one mesh. LOD 0 is the most detailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshLod {
    /// Number of LODs the mesh has.
    pub lod_count: u8,
    /// Most detailed LOD currently resident.
    pub highest_loaded: u8,
}

impl MeshLod {
    /// A mesh with every LOD resident.
    #[must_use]
    pub const fn resident(lod_count: u8) -> Self {
        Self {
            lod_count,
            highest_loaded: 0,
        }
    }

    /// Least detailed LOD index.
    #[inline]
    #[must_use]
    pub const fn max_lod(&self) -> u8 {
        self.lod_count.saturating_sub(1)
    }
}

/// Brush row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brush {
    /// Placing node.
    pub node: NodeHandle,
    /// Meshes drawn by the brush.
    pub meshes: SmallVec<[MeshLod; 4]>,
    /// Skinned or otherwise animated.
    pub animated: bool,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            node: NodeHandle::INVALID,
            meshes: SmallVec::new(),
            animated: false,
        }
    }
}

/// Brush blob header, followed by `mesh_count` [`MeshLodBlob`]s.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BrushBlob {
    /// Index into the loading context's node table.
    pub node_index: u32,
    /// Number of mesh entries after the header.
    pub mesh_count: u32,
    /// Bit 0: animated.
    pub flags: u32,
}

/// One mesh entry of a brush blob.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MeshLodBlob {
    /// Number of LODs.
    pub lod_count: u32,
    /// Most detailed LOD resident at load time.
    pub highest_loaded: u32,
}

/// `BrushBlob::flags` bit of animated brushes.
pub const ANIMATED_FLAG: u32 = 1;

impl ComponentData for Brush {
    const ID: ComponentId = component_id("Brush");
    const NAME: &'static str = "Brush";

    fn add_component_view(
        component: &Arc<BasicComponent<Self>>,
        go: &mut GameObject,
        values: &ValueMap<'_>,
        blob: &[u8],
    ) -> CoreResult<()> {
        let header: BrushBlob = read_blob(Self::ID, blob)?;
        let entries: Vec<MeshLodBlob> = read_blob_array(
            Self::ID,
            blob,
            size_of::<BrushBlob>(),
            header.mesh_count as usize,
        )?;
        let ctx = find_value::<SceneLoadingContext>(values, SCENE_LOADING_CONTEXT_KID)
            .ok_or(CoreError::MissingValue(SCENE_LOADING_CONTEXT_KID))?;
        let invalid = |reason: String| CoreError::InvalidBlob { id: Self::ID, reason };

        let node = ctx
            .node(header.node_index)
            .ok_or_else(|| invalid(format!("node index {} out of range", header.node_index)))?;
        let meshes = entries
            .iter()
            .map(|e| -> CoreResult<MeshLod> {
                let lod_count = u8::try_from(e.lod_count)
                    .ok()
                    .filter(|&c| c > 0)
                    .ok_or_else(|| invalid(format!("bad LOD count {}", e.lod_count)))?;
                let highest_loaded = u8::try_from(e.highest_loaded)
                    .unwrap_or(u8::MAX)
                    .min(lod_count - 1);
                Ok(MeshLod {
                    lod_count,
                    highest_loaded,
                })
            })
            .collect::<CoreResult<SmallVec<[MeshLod; 4]>>>()?;

        let brush = Brush {
            node,
            meshes,
            animated: header.flags & ANIMATED_FLAG != 0,
        };
        go.add_view(|| BrushView::new(component, brush));
        Ok(())
    }
}

/// Store of brushes.
pub type BrushComponent = BasicComponent<Brush>;

/// Handle to a brush row.
pub type BrushHandle = Handle<Brush>;

/// A game object's brush.
pub struct BrushView {
    inner: BasicView<Brush>,
}

impl View for BrushView {
    const COMPONENT_ID: ComponentId = Brush::ID;
}

impl BrushView {
    /// Creates the row and the view.
    #[must_use]
    pub fn new(component: &Arc<BrushComponent>, brush: Brush) -> Self {
        Self {
            inner: BasicView::new(component, brush),
        }
    }

    /// Handle of the row.
    #[must_use]
    pub const fn handle(&self) -> BrushHandle {
        self.inner.handle()
    }

    /// Copy of the row.
    #[must_use]
    pub fn brush(&self) -> Brush {
        self.inner.get().clone()
    }

    /// Records that a mesh's resident LODs changed.
    ///
    /// # Returns
    ///
    /// `false` if the brush has no mesh at `mesh`.
    pub fn set_highest_loaded(&self, mesh: usize, lod: u8) -> bool {
        let mut brush = self.inner.get_mut();
        match brush.meshes.get_mut(mesh) {
            Some(m) => {
                m.highest_loaded = lod.min(m.max_lod());
                true
            }
            None => false,
        }
    }

    /// Attaches the brush to another node.
    pub fn set_node(&self, node: NodeHandle) {
        self.inner.get_mut().node = node;
    }

    /// World position of the brush's node.
    #[must_use]
    pub fn position_w(&self, transforms: &TransformComponent) -> Option<Vec3> {
        transforms.position_w(self.inner.get().node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneSettings;
    use crate::loading::NodeBlob;
    use crate::scene::{Scene, SceneStores};
    use std::any::Any;

    fn brush_blob(node_index: u32, meshes: &[(u32, u32)]) -> Vec<u8> {
        let header = BrushBlob {
            node_index,
            mesh_count: u32::try_from(meshes.len()).unwrap(),
            flags: ANIMATED_FLAG,
        };
        let mut bytes = bytemuck::bytes_of(&header).to_vec();
        for &(lod_count, highest_loaded) in meshes {
            bytes.extend_from_slice(bytemuck::bytes_of(&MeshLodBlob {
                lod_count,
                highest_loaded,
            }));
        }
        bytes
    }

    #[test]
    fn test_blob_reads_meshes() {
        let stores = SceneStores::new();
        let brushes = Arc::clone(&stores.brushes);
        let scene = Scene::shared(stores, SceneSettings::default());
        let mut ctx = SceneLoadingContext::new(scene);
        ctx.load_nodes(&[NodeBlob::root([0.0; 3])]).unwrap();
        let values = [(SCENE_LOADING_CONTEXT_KID, &ctx as &dyn Any)];

        let mut go = GameObject::new();
        Brush::add_component_view(&brushes, &mut go, &values, &brush_blob(0, &[(4, 9), (2, 0)]))
            .unwrap();
        let brush = go.get_view::<BrushView>().unwrap().brush();
        assert!(brush.animated);
        assert_eq!(brush.meshes.as_slice(), &[
            MeshLod { lod_count: 4, highest_loaded: 3 },
            MeshLod { lod_count: 2, highest_loaded: 0 },
        ]);

        // Truncated mesh table.
        let mut short = brush_blob(0, &[(4, 0)]);
        short.truncate(short.len() - 1);
        let mut go = GameObject::new();
        assert!(matches!(
            Brush::add_component_view(&brushes, &mut go, &values, &short),
            Err(CoreError::BlobTooSmall { .. })
        ));

        // Zero LODs.
        assert!(matches!(
            Brush::add_component_view(&brushes, &mut go, &values, &brush_blob(0, &[(0, 0)])),
            Err(CoreError::InvalidBlob { .. })
        ));
        assert!(!go.has::<BrushView>());
    }
}
