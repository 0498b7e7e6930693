//! View frustum built from camera parameters or a view-projection matrix.
//!
//! Plane normals point into the frustum; a volume is culled when it lies
//! entirely behind any one plane.

use bytemuck::{Pod, Zeroable};
use keystone_core::math::Vec3;

use super::bounds::{Aabb, BoundingSphere};

/// A plane in 3D space (Ax + By + Cz + D = 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Normal X component.
    pub a: f32,
    /// Normal Y component.
    pub b: f32,
    /// Normal Z component.
    pub c: f32,
    /// Distance from origin.
    pub d: f32,
}

impl Plane {
    /// Creates a new plane.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self { a, b, c, d }
    }

    /// Plane through `point` facing `normal`.
    #[must_use]
    pub fn from_normal_point(normal: Vec3, point: Vec3) -> Self {
        let n = normal.normalized();
        Self::new(n.x, n.y, n.z, -n.dot(point))
    }

    /// Normalizes the plane.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        if len > 0.0 {
            Self {
                a: self.a / len,
                b: self.b / len,
                c: self.c / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Plane normal.
    #[inline]
    #[must_use]
    pub const fn normal(&self) -> Vec3 {
        Vec3::new(self.a, self.b, self.c)
    }

    /// Signed distance from a point to the plane.
    #[inline]
    #[must_use]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.a * p.x + self.b * p.y + self.c * p.z + self.d
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Perspective frustum from an eye position and basis.
    ///
    /// # Arguments
    ///
    /// * `fov_y` - Vertical field of view in radians
    /// * `aspect` - Width over height
    #[must_use]
    pub fn from_perspective(
        position: Vec3,
        forward: Vec3,
        up: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let f = forward.normalized();
        let right = f.cross(up).normalized();
        let u = right.cross(f);

        let half_v = (fov_y * 0.5).tan();
        let half_h = half_v * aspect;

        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = Plane::from_normal_point((f - right * half_h).cross(u), position);
        planes[Self::RIGHT] = Plane::from_normal_point(u.cross(f + right * half_h), position);
        planes[Self::BOTTOM] = Plane::from_normal_point(right.cross(f - u * half_v), position);
        planes[Self::TOP] = Plane::from_normal_point((f + u * half_v).cross(right), position);
        planes[Self::NEAR] = Plane::from_normal_point(f, position + f * near);
        planes[Self::FAR] = Plane::from_normal_point(-f, position + f * far);

        Self { planes }
    }

    /// Extracts frustum planes from a view-projection matrix.
    ///
    /// The matrix should be in column-major order.
    #[must_use]
    pub fn from_view_projection(m: &[[f32; 4]; 4]) -> Self {
        let row = |r: usize, sign: f32| {
            Plane::new(
                m[0][3] + sign * m[0][r],
                m[1][3] + sign * m[1][r],
                m[2][3] + sign * m[2][r],
                m[3][3] + sign * m[3][r],
            )
            .normalized()
        };

        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = row(0, 1.0);
        planes[Self::RIGHT] = row(0, -1.0);
        planes[Self::BOTTOM] = row(1, 1.0);
        planes[Self::TOP] = row(1, -1.0);
        planes[Self::NEAR] = row(2, 1.0);
        planes[Self::FAR] = row(2, -1.0);
        Self { planes }
    }

    /// Tests if a sphere intersects the frustum.
    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance(sphere.center) >= -sphere.radius)
    }

    /// Tests if an AABB intersects the frustum.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return false;
        }
        let center = aabb.center();
        let half = aabb.half_extents();

        self.planes.iter().all(|plane| {
            // Projection interval radius of the box onto the plane normal.
            let r = half.x * plane.a.abs() + half.y * plane.b.abs() + half.z * plane.c.abs();
            plane.distance(center) >= -r
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_z() -> Frustum {
        Frustum::from_perspective(
            Vec3::ZERO,
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::Y,
            std::f32::consts::FRAC_PI_2,
            1.0,
            0.1,
            100.0,
        )
    }

    #[test]
    fn test_plane_normalization() {
        let plane = Plane::new(3.0, 4.0, 0.0, 10.0);
        let normalized = plane.normalized();

        // 3-4-5 triangle, so length is 5
        assert!((normalized.a - 0.6).abs() < 0.001);
        assert!((normalized.b - 0.8).abs() < 0.001);
    }

    #[test]
    fn test_perspective_planes_face_inward() {
        let frustum = looking_down_z();
        let inside = Vec3::new(0.0, 0.0, -10.0);
        for plane in &frustum.planes {
            assert!(plane.distance(inside) > 0.0);
        }
    }

    #[test]
    fn test_sphere_and_box_culling() {
        let frustum = looking_down_z();
        assert!(frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -5.0), 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 5.0), 1.0)));
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -200.0), 1.0)));
        // 90 degree fov: x = 20 at z = -10 is well outside the right plane.
        assert!(!frustum.intersects_sphere(&BoundingSphere::new(Vec3::new(20.0, 0.0, -10.0), 1.0)));

        let straddling = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&straddling));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 2.0), Vec3::new(1.0, 1.0, 4.0));
        assert!(!frustum.intersects_aabb(&behind));
        assert!(!frustum.intersects_aabb(&Aabb::EMPTY));
    }

    #[test]
    fn test_identity_view_projection() {
        let identity = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let frustum = Frustum::from_view_projection(&identity);
        let unit = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
        assert!(frustum.intersects_aabb(&unit));
        let outside = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(!frustum.intersects_aabb(&outside));
    }
}
