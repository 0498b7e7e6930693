//! # Geometry
//!
//! Bounding volumes and the query shapes the BVH can be traversed with.

mod bounds;
mod frustum;
mod ray;

pub use bounds::{Aabb, BoundingSphere};
pub use frustum::{Frustum, Plane};
pub use ray::{Cone, Ray};

/// A shape the BVH can be traversed with.
///
/// The same test prunes interior nodes and accepts leaf elements.
pub trait BoundingVolumeQuery {
    /// Per-hit payload handed to the visitor.
    type Hit: Copy;

    /// Tests the shape against a box.
    fn intersects(&self, aabb: &Aabb) -> Option<Self::Hit>;
}

impl BoundingVolumeQuery for Aabb {
    type Hit = ();

    #[inline]
    fn intersects(&self, aabb: &Aabb) -> Option<()> {
        Aabb::intersects(self, aabb).then_some(())
    }
}

impl BoundingVolumeQuery for BoundingSphere {
    type Hit = ();

    #[inline]
    fn intersects(&self, aabb: &Aabb) -> Option<()> {
        self.intersects_aabb(aabb).then_some(())
    }
}

impl BoundingVolumeQuery for Frustum {
    type Hit = ();

    #[inline]
    fn intersects(&self, aabb: &Aabb) -> Option<()> {
        self.intersects_aabb(aabb).then_some(())
    }
}

impl BoundingVolumeQuery for Cone {
    type Hit = ();

    #[inline]
    fn intersects(&self, aabb: &Aabb) -> Option<()> {
        self.intersects_aabb(aabb).then_some(())
    }
}

/// Ray hits carry the entry distance.
impl BoundingVolumeQuery for Ray {
    type Hit = f32;

    #[inline]
    fn intersects(&self, aabb: &Aabb) -> Option<f32> {
        self.intersect_aabb(aabb)
    }
}
