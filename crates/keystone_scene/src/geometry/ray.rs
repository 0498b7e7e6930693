//! Rays and cones.

use keystone_core::math::Vec3;

use super::bounds::{Aabb, BoundingSphere};

/// Half-line from `origin` along a unit `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray; the direction is normalized.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
        }
    }

    /// Point at distance `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Slab test.
    ///
    /// # Returns
    ///
    /// Distance to the entry point, `0.0` when the origin is inside the box,
    /// or `None` on a miss.
    #[must_use]
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f32> {
        if aabb.is_empty() {
            return None;
        }
        let origin = self.origin.to_array();
        let direction = self.direction.to_array();
        let min = aabb.min.to_array();
        let max = aabb.max.to_array();

        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            if direction[axis].abs() < f32::EPSILON {
                if origin[axis] < min[axis] || origin[axis] > max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction[axis];
            let mut t0 = (min[axis] - origin[axis]) * inv;
            let mut t1 = (max[axis] - origin[axis]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }

    /// Ray-sphere test returning the entry distance, `0.0` from inside.
    #[must_use]
    pub fn intersect_sphere(&self, sphere: &BoundingSphere) -> Option<f32> {
        let to_center = sphere.center - self.origin;
        let r2 = sphere.radius * sphere.radius;
        let c2 = to_center.length_squared();
        if c2 <= r2 {
            return Some(0.0);
        }
        let along = to_center.dot(self.direction);
        if along < 0.0 {
            return None;
        }
        let perp2 = c2 - along * along;
        if perp2 > r2 {
            return None;
        }
        Some(along - (r2 - perp2).sqrt())
    }
}

/// Finite cone from `origin` along `direction` with half-angle `angle`.
///
/// Used for spot light volumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cone {
    /// Apex.
    pub origin: Vec3,
    /// Unit axis.
    pub direction: Vec3,
    /// Half-angle in radians.
    pub angle: f32,
    /// Axis length.
    pub length: f32,
}

impl Cone {
    /// Creates a cone; the direction is normalized.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3, angle: f32, length: f32) -> Self {
        Self {
            origin,
            direction: direction.normalized(),
            angle,
            length,
        }
    }

    /// Cone-sphere test, exact for the infinite cone and capped by length.
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let v = sphere.center - self.origin;
        let along = v.dot(self.direction);
        if along < -sphere.radius || along > self.length + sphere.radius {
            return false;
        }
        let perp = (v.length_squared() - along * along).max(0.0).sqrt();
        let (sin, cos) = self.angle.sin_cos();
        perp * cos - along * sin <= sphere.radius
    }

    /// Conservative cone-box test through the box's bounding sphere.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        let sphere = BoundingSphere::new(aabb.center(), aabb.half_extents().length());
        self.intersects_sphere(&sphere)
    }
}
