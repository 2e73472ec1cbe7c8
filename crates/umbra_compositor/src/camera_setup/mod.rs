//! Shadow Camera Setups
//!
//! A shadow camera setup places and projects the camera a shadow map is
//! rendered from. Each shadow map gets its own setup, picked from the map's
//! [`ShadowMapTechnique`] when the node is built and never switched after.
//!
//! All setups work in right-handed space with a zero-to-one depth range and
//! report the linear depth range the map covers, which shaders use to
//! normalize stored depth.

mod default;
mod focused;
mod lispsm;
mod pssm;

pub use default::DefaultShadowCameraSetup;
pub use focused::FocusedShadowCameraSetup;
pub use lispsm::LiSpsmShadowCameraSetup;
pub use pssm::{calculate_split_points, PssmShadowCameraSetup};

use core::fmt::Debug;

use glam::{Mat4, Vec3};
use umbra_scene::{Aabb, Camera, Light, SceneConfig};

use crate::definition::{CameraSetupSettings, ShadowMapTechnique};
use crate::error::{CompositorError, CompositorResult};

/// Depth range used when a map was never set up
pub const DEFAULT_MIN_DISTANCE: f32 = 0.0;
pub const DEFAULT_MAX_DISTANCE: f32 = 100_000.0;

/// Linear depth range covered by a shadow camera
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

impl Default for DepthRange {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DISTANCE, DEFAULT_MAX_DISTANCE)
    }
}

/// Scene state a setup reads while fitting a shadow camera
#[derive(Clone, Copy, Debug)]
pub struct ShadowSetupContext<'a> {
    pub scene: &'a SceneConfig,
    /// Merged bounds of the shadow receivers seen by the viewer
    pub receiver_box: &'a Aabb,
    /// Bounds of every shadow caster in the node's render queue range
    pub casters_box: &'a Aabb,
    /// Shadow map resolution in texels
    pub texture_size: (u32, u32),
}

/// Strategy fitting a shadow camera to a light and a viewer
pub trait ShadowCameraSetup: Debug + Send + Sync {
    /// Configure `out` to render the shadow map of `light` as seen by
    /// `viewer`. `split` selects the cascade for split-based setups.
    ///
    /// On entry `out` already looks along the light direction (except for
    /// point lights) and sits at the light position (except for directional
    /// lights).
    fn shadow_camera(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        split: usize,
    ) -> DepthRange;

    fn technique(&self) -> ShadowMapTechnique;

    /// Split distances for split-based setups
    fn split_points(&self, _viewer: &Camera, _scene: &SceneConfig) -> Option<Vec<f32>> {
        None
    }
}

/// Build the setup for a technique with the tunables it captures
pub fn create_shadow_camera_setup(
    technique: ShadowMapTechnique,
    settings: &CameraSetupSettings,
) -> CompositorResult<Box<dyn ShadowCameraSetup>> {
    let setup: Box<dyn ShadowCameraSetup> = match technique {
        ShadowMapTechnique::Default => Box::new(DefaultShadowCameraSetup::new()),
        ShadowMapTechnique::Focused => Box::new(FocusedShadowCameraSetup::new()),
        ShadowMapTechnique::Pssm => Box::new(PssmShadowCameraSetup::new(settings.pssm.clone())),
        ShadowMapTechnique::LiSpsm => {
            Box::new(LiSpsmShadowCameraSetup::new(settings.lispsm.clone()))
        }
        ShadowMapTechnique::PlaneOptimal => {
            return Err(CompositorError::NotImplemented(format!(
                "Shadow map technique '{}' has no camera setup",
                technique
            )))
        }
    };
    Ok(setup)
}

/// How far shadows reach from the viewer, falling back to its far plane
pub(crate) fn shadow_far_distance(viewer: &Camera, scene: &SceneConfig) -> f32 {
    if scene.shadow_far_distance > 0.0 {
        scene.shadow_far_distance.min(viewer.far_clip_distance())
    } else {
        viewer.far_clip_distance()
    }
}

/// Up vector for a camera looking along `direction`: `preferred` projected
/// onto the plane perpendicular to it, or any perpendicular axis
pub(crate) fn perpendicular_up(direction: Vec3, preferred: Vec3) -> Vec3 {
    let up = preferred - direction * direction.dot(preferred);
    if up.length_squared() > 1e-6 {
        return up.normalize();
    }
    let fallback = if direction.y.abs() > 0.9 { Vec3::Z } else { Vec3::Y };
    (fallback - direction * direction.dot(fallback)).normalize()
}

/// Snap a light space offset to whole texels to keep shadows from swimming
pub(crate) fn snap_to_texel(value: f32, texel_size: f32) -> f32 {
    if texel_size > 0.0 && texel_size.is_finite() {
        (value / texel_size).floor() * texel_size
    } else {
        value
    }
}

/// Light space bounds of `points` under `view`
pub(crate) fn light_space_bounds(view: &Mat4, points: &[Vec3]) -> Aabb {
    let mut bounds = Aabb::NULL;
    for point in points {
        bounds.merge_point(view.transform_point3(*point));
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_mapping() {
        let settings = CameraSetupSettings::default();
        for technique in [
            ShadowMapTechnique::Default,
            ShadowMapTechnique::Focused,
            ShadowMapTechnique::Pssm,
            ShadowMapTechnique::LiSpsm,
        ] {
            let setup = create_shadow_camera_setup(technique, &settings).unwrap();
            assert_eq!(setup.technique(), technique);
        }
    }

    #[test]
    fn test_plane_optimal_not_implemented() {
        let err = create_shadow_camera_setup(
            ShadowMapTechnique::PlaneOptimal,
            &CameraSetupSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompositorError::NotImplemented(_)));
    }

    #[test]
    fn test_perpendicular_up() {
        let up = perpendicular_up(Vec3::NEG_Y, Vec3::NEG_Y);
        assert!(up.dot(Vec3::NEG_Y).abs() < 1e-5);
        assert!((up.length() - 1.0).abs() < 1e-5);

        let up = perpendicular_up(Vec3::X, Vec3::new(1.0, 1.0, 0.0));
        assert!((up - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_depth_range_default() {
        assert_eq!(DepthRange::default(), DepthRange::new(0.0, 100_000.0));
    }
}
