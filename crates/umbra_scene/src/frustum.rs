//! Frustum planes for receiver culling

use glam::{Mat4, Vec3, Vec4};

use crate::bounds::{Aabb, Sphere};

/// Plane in 3D space (n·p + d = 0)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Plane normal (unit vector)
    pub normal: Vec3,
    /// Distance from origin along normal
    pub distance: f32,
}

impl Plane {
    /// Build from an unnormalized `(a, b, c, d)` row
    fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let len = normal.length();
        if len > 1e-10 {
            Self {
                normal: normal / len,
                distance: row.w / len,
            }
        } else {
            Self {
                normal: Vec3::Y,
                distance: 0.0,
            }
        }
    }

    /// Signed distance, positive in front of the plane
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six clip planes (left, right, bottom, top, near, far)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract planes from a right-handed, zero-to-one depth view-projection
    /// matrix (Gribb/Hartmann).
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        Self {
            planes: [
                Plane::from_row(r3 + r0),
                Plane::from_row(r3 - r0),
                Plane::from_row(r3 + r1),
                Plane::from_row(r3 - r1),
                // Depth is [0, 1] so the near plane is row 2 alone
                Plane::from_row(r2),
                Plane::from_row(r3 - r2),
            ],
        }
    }

    /// Conservative test: true if the box might be visible
    pub fn is_aabb_visible(&self, aabb: &Aabb) -> bool {
        if aabb.is_null() {
            return false;
        }
        self.planes.iter().all(|plane| {
            let p = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.distance_to_point(p) >= 0.0
        })
    }

    pub fn is_sphere_visible(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_neg_z() -> Frustum {
        let proj = Mat4::perspective_rh(core::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&proj)
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = looking_down_neg_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
        assert!(frustum.is_aabb_visible(&aabb));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let frustum = looking_down_neg_z();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
        assert!(!frustum.is_aabb_visible(&aabb));
        assert!(!frustum.is_aabb_visible(&Aabb::NULL));
    }

    #[test]
    fn test_sphere_beyond_far_is_culled() {
        let frustum = looking_down_neg_z();
        assert!(frustum.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 0.0, -50.0), 1.0)));
        assert!(!frustum.is_sphere_visible(&Sphere::new(Vec3::new(0.0, 0.0, -200.0), 1.0)));
    }
}
