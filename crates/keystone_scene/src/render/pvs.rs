//! # Potentially Visible Set
//!
//! The per-frame list of brushes a camera may see, with the LOD to draw each
//! mesh at and a sort key for the render passes.

use keystone_core::math::Vec3;
use smallvec::SmallVec;

use super::brush::{BrushHandle, MeshLod};
use crate::bvh::SceneBvh;
use crate::config::SceneSettings;
use crate::geometry::Frustum;
use crate::scene::{Scene, SceneEntityHandle};
use crate::visibility::VisibilityHandle;

/// LOD chosen for one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodSelection {
    /// LOD the distance asks for.
    pub requested: u8,
    /// LOD to draw now: never more detailed than what is resident.
    pub recommended: u8,
}

impl LodSelection {
    /// `true` if a more detailed LOD should be streamed in.
    #[must_use]
    pub const fn needs_load(&self) -> bool {
        self.requested != self.recommended
    }
}

/// Picks a mesh LOD from the view distance.
///
/// `requested = (distance / max_z)^(1 / falloff) * max_lod`, rounded down.
#[must_use]
pub fn compute_lod(mesh: &MeshLod, distance: f32, max_z: f32, falloff: f32) -> LodSelection {
    let max_lod = mesh.max_lod();
    let t = if max_z > 0.0 { (distance / max_z).clamp(0.0, 1.0) } else { 1.0 };
    let scaled = t.powf(1.0 / falloff) * f32::from(max_lod);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let requested = (scaled as u8).min(max_lod);
    LodSelection {
        requested,
        recommended: requested.max(mesh.highest_loaded).min(max_lod),
    }
}

const TRANSPARENT_BIT: u64 = 1 << 63;
const ANIMATED_BIT: u64 = 1 << 62;
const DEPTH_MASK: u64 = ANIMATED_BIT - 1;

/// Packs pass flags and view depth into one ordering key.
///
/// Transparent entries sort after solid ones, animated after static ones,
/// then by depth.
#[must_use]
pub const fn sort_key(transparent: bool, animated: bool, depth: u64) -> u64 {
    let mut key = depth & DEPTH_MASK;
    if transparent {
        key |= TRANSPARENT_BIT;
    }
    if animated {
        key |= ANIMATED_BIT;
    }
    key
}

/// One potentially visible brush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvEntry {
    /// See [`sort_key`].
    pub sort_key: u64,
    /// Entity in its scene.
    pub entity: SceneEntityHandle,
    /// The brush row.
    pub brush: BrushHandle,
    /// Recommended LOD per mesh, in mesh order.
    pub lod_levels: SmallVec<[u8; 4]>,
}

/// Solid and transparent draws of one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pvs {
    /// Front to back.
    pub solid: Vec<PvEntry>,
    /// Back to front.
    pub transparent: Vec<PvEntry>,
}

impl Pvs {
    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.solid.len() + self.transparent.len()
    }

    /// `true` if nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solid.is_empty() && self.transparent.is_empty()
    }

    /// Sorts both lists into draw order.
    pub fn sort(&mut self) {
        self.solid.sort_by_key(|e| (e.sort_key, e.entity));
        self.transparent
            .sort_by(|a, b| (b.sort_key, b.entity).cmp(&(a.sort_key, a.entity)));
    }

    /// Iterates solid entries, then transparent ones.
    pub fn iter(&self) -> impl Iterator<Item = &PvEntry> {
        self.solid.iter().chain(self.transparent.iter())
    }
}

/// Collects every visible brush inside `frustum` from a built hierarchy.
///
/// Entities further than [`SceneSettings::pvs_max_distance`] are skipped.
#[must_use]
pub fn gather_pvs(scene: &Scene, bvh: &SceneBvh, frustum: &Frustum, camera_position: Vec3) -> Pvs {
    let settings: &SceneSettings = scene.settings();
    let stores = scene.stores();

    let mut candidates: Vec<(SceneEntityHandle, VisibilityHandle, f32)> = Vec::new();
    bvh.traverse(frustum, |element, ()| {
        if !frustum.intersects_sphere(&element.sphere) {
            return;
        }
        let distance = element.sphere.center.distance(camera_position) - element.sphere.radius;
        let distance = distance.max(0.0);
        if distance <= settings.pvs_max_distance {
            candidates.push((element.entity, element.visibility, distance));
        }
    });

    let mut pvs = Pvs::default();
    for (entity, visibility, distance) in candidates {
        let Some(brush_handle) = scene.brush_of(entity) else {
            continue;
        };
        let Some(brush) = stores.brushes.get(brush_handle).map(|b| b.clone()) else {
            continue;
        };
        let transparent = stores
            .visibility
            .get(visibility)
            .is_some_and(|v| v.transparent);

        let lod_levels = brush
            .meshes
            .iter()
            .map(|mesh| {
                compute_lod(mesh, distance, settings.pvs_max_distance, settings.lod_falloff)
                    .recommended
            })
            .collect();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let depth = (distance * 1000.0) as u64;
        let entry = PvEntry {
            sort_key: sort_key(transparent, brush.animated, depth),
            entity,
            brush: brush_handle,
            lod_levels,
        };
        if transparent {
            pvs.transparent.push(entry);
        } else {
            pvs.solid.push(entry);
        }
    }

    pvs.sort();
    tracing::trace!(
        solid = pvs.solid.len(),
        transparent = pvs.transparent.len(),
        "PVS gathered"
    );
    pvs
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::ecs::Handle;

    #[test]
    fn test_lod_grows_with_distance() {
        let mesh = MeshLod::resident(5);
        assert_eq!(compute_lod(&mesh, 0.0, 10_000.0, 5.0).requested, 0);
        assert_eq!(compute_lod(&mesh, 10_000.0, 10_000.0, 5.0).requested, 4);
        assert_eq!(compute_lod(&mesh, 1e9, 10_000.0, 5.0).requested, 4);

        // (0.5)^(1/5) * 4 ≈ 3.48
        assert_eq!(compute_lod(&mesh, 5_000.0, 10_000.0, 5.0).requested, 3);
    }

    #[test]
    fn test_lod_clamped_to_resident() {
        let mesh = MeshLod {
            lod_count: 4,
            highest_loaded: 2,
        };
        let lod = compute_lod(&mesh, 0.0, 100.0, 5.0);
        assert_eq!(lod, LodSelection { requested: 0, recommended: 2 });
        assert!(lod.needs_load());

        let single = MeshLod::resident(1);
        assert_eq!(compute_lod(&single, 50.0, 100.0, 5.0).recommended, 0);
    }

    #[test]
    fn test_sort_key_orders_passes() {
        let near_solid = sort_key(false, false, 10);
        let far_solid = sort_key(false, false, 500);
        let animated = sort_key(false, true, 0);
        let transparent = sort_key(true, false, 0);
        assert!(near_solid < far_solid);
        assert!(far_solid < animated);
        assert!(animated < transparent);
        assert_eq!(sort_key(false, false, u64::MAX), DEPTH_MASK);
    }

    #[test]
    fn test_transparent_back_to_front() {
        let entry = |key: u64, index: u32| PvEntry {
            sort_key: key,
            entity: Handle::new(index, 0),
            brush: Handle::new(index, 0),
            lod_levels: SmallVec::new(),
        };
        let mut pvs = Pvs {
            solid: vec![entry(30, 0), entry(10, 1)],
            transparent: vec![entry(sort_key(true, false, 1), 2), entry(sort_key(true, false, 9), 3)],
        };
        pvs.sort();
        assert_eq!(pvs.solid[0].sort_key, 10);
        assert_eq!(pvs.transparent[0].entity, Handle::new(3, 0));
        assert_eq!(pvs.iter().count(), 4);
    }
}
