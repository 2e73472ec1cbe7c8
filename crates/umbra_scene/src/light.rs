//! Lights and the per-frame global light list
//!
//! The global light list is kept as a struct of arrays: the visibility masks
//! and bounding spheres that shadow-caster selection scans every frame live
//! in their own contiguous arrays, parallel to the light array.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bounds::Sphere;

/// Visibility bit set on every object that casts shadows
pub const LAYER_SHADOW_CASTER: u32 = 1 << 31;

/// Visibility bit set on every visible object
pub const LAYER_VISIBILITY: u32 = 1 << 30;

/// Bits reserved by the engine; user flags must not overlap them
pub const RESERVED_VISIBILITY_FLAGS: u32 = LAYER_SHADOW_CASTER | LAYER_VISIBILITY;

/// Unique identifier for a light
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LightId(pub u64);

/// Kind of light source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightType {
    Point,
    Directional,
    Spot,
}

/// A scene light
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Light {
    id: LightId,
    pub name: String,
    pub light_type: LightType,
    /// Derived (world space) position. Ignored for directional lights.
    pub position: Vec3,
    /// Derived (world space) direction. Ignored for point lights.
    pub direction: Vec3,
    /// Attenuation range, used as bounding radius for point and spot lights
    pub range: f32,
    /// Spot outer cone angle in radians (full angle)
    pub spot_outer_angle: f32,
    pub cast_shadows: bool,
    pub visible: bool,
    /// User visibility bits (reserved bits are masked off)
    visibility_flags: u32,
    /// Slot in the global light list, assigned each frame
    global_index: usize,
}

impl Light {
    pub(crate) fn new(id: LightId, name: impl Into<String>, light_type: LightType) -> Self {
        Self {
            id,
            name: name.into(),
            light_type,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            range: 100.0,
            spot_outer_angle: 40.0f32.to_radians(),
            cast_shadows: true,
            visible: true,
            visibility_flags: !RESERVED_VISIBILITY_FLAGS,
            global_index: usize::MAX,
        }
    }

    #[inline]
    pub fn id(&self) -> LightId {
        self.id
    }

    #[inline]
    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn set_visibility_flags(&mut self, flags: u32) {
        self.visibility_flags = flags & !RESERVED_VISIBILITY_FLAGS;
    }

    #[inline]
    pub fn visibility_flags(&self) -> u32 {
        self.visibility_flags
    }

    /// Full mask including the engine layer bits
    pub fn visibility_mask(&self) -> u32 {
        let mut mask = self.visibility_flags;
        if self.visible {
            mask |= LAYER_VISIBILITY;
        }
        if self.cast_shadows {
            mask |= LAYER_SHADOW_CASTER;
        }
        mask
    }

    /// World space bounding sphere; infinite for directional lights
    pub fn bounding_sphere(&self) -> Sphere {
        match self.light_type {
            LightType::Directional => Sphere::new(Vec3::ZERO, f32::INFINITY),
            LightType::Point | LightType::Spot => Sphere::new(self.position, self.range),
        }
    }

    /// Distance from `point` to the edge of the light's influence.
    ///
    /// Directional lights are everywhere, so their distance is negative
    /// infinity. It is produced directly rather than from the infinite
    /// sphere, which would yield NaN.
    pub fn distance_from(&self, point: Vec3) -> f32 {
        match self.light_type {
            LightType::Directional => f32::NEG_INFINITY,
            LightType::Point | LightType::Spot => self.bounding_sphere().distance_to_surface(point),
        }
    }
}

/// A light as seen by one renderable: its global slot and its distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightClosest {
    pub light: LightId,
    pub global_index: usize,
    pub distance: f32,
}

/// Per-frame list of visible lights in struct-of-arrays layout
#[derive(Clone, Debug, Default)]
pub struct GlobalLightList {
    pub lights: Vec<Light>,
    pub visibility_masks: Vec<u32>,
    pub bounding_spheres: Vec<Sphere>,
}

impl GlobalLightList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.lights.clear();
        self.visibility_masks.clear();
        self.bounding_spheres.clear();
    }

    /// Append a light, assigning its global index
    pub fn push(&mut self, light: &Light) {
        let mut light = light.clone();
        light.global_index = self.lights.len();
        self.visibility_masks.push(light.visibility_mask());
        self.bounding_spheres.push(light.bounding_sphere());
        self.lights.push(light);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    #[inline]
    pub fn get(&self, global_index: usize) -> Option<&Light> {
        self.lights.get(global_index)
    }

    /// Lights sorted by distance to `point`, closest first, at most `max`.
    ///
    /// This is what a renderable stores as its closest-light list.
    pub fn closest_to(&self, point: Vec3, max: usize) -> Vec<LightClosest> {
        let mut closest: Vec<LightClosest> = self
            .lights
            .iter()
            .map(|light| LightClosest {
                light: light.id(),
                global_index: light.global_index(),
                distance: light.distance_from(point),
            })
            .collect();

        // Stable so equally distant lights keep their global order
        closest.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        closest.truncate(max);
        closest
    }
}
