//! Bounding volumes used by shadow receivers, casters and lights

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
///
/// A box whose `min` is greater than its `max` on any axis is *null*: it
/// contains nothing and merging it into another box is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The null (inverted) box
    pub const NULL: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create from center and half-extents
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Create from a set of points
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::NULL;
        for &point in points {
            aabb.merge_point(point);
        }
        aabb
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Reset to the null box
    #[inline]
    pub fn set_null(&mut self) {
        *self = Self::NULL;
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Grow to include a point
    #[inline]
    pub fn merge_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow to include another box. Null boxes are ignored.
    pub fn merge(&mut self, other: &Aabb) {
        if other.is_null() {
            return;
        }
        if self.is_null() {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Overlapping region of two boxes, null when they are disjoint
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        if self.is_null() || other.is_null() {
            return Self::NULL;
        }
        let result = Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        };
        if result.is_null() {
            Self::NULL
        } else {
            result
        }
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        !self.intersection(other).is_null()
    }

    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Transform by a matrix (result is still axis-aligned)
    pub fn transform(&self, matrix: &Mat4) -> Self {
        if self.is_null() {
            return Self::NULL;
        }
        let mut result = Self::NULL;
        for corner in self.corners() {
            result.merge_point(matrix.transform_point3(corner));
        }
        result
    }

    /// The 8 corners of the box
    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::NULL
    }
}

/// Bounding sphere
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    #[inline]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Signed distance from `point` to the sphere surface
    #[inline]
    pub fn distance_to_surface(&self, point: Vec3) -> f32 {
        point.distance(self.center) - self.radius
    }

    #[inline]
    pub fn to_aabb(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0)
    }
}
