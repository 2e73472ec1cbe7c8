//! Light space perspective shadow camera setup

use glam::{Mat4, Vec3, Vec4};
use umbra_scene::{Aabb, Camera, Light, LightType};

use super::focused::{fit_directional, focus_volume, FocusedShadowCameraSetup, LightSpaceFit};
use super::{shadow_far_distance, DepthRange, ShadowCameraSetup, ShadowSetupContext};
use crate::definition::{LiSpsmSettings, ShadowMapTechnique};

/// Light space perspective shadow maps
///
/// Starts from the focused fit and warps it with a perspective frustum
/// looking along the viewer's direction as seen from the light, giving
/// texels close to the viewer more room. The warp degenerates when the
/// viewer looks along the light, so below the direction threshold the plain
/// focused projection is kept. Spot and point lights always use it.
#[derive(Clone, Debug)]
pub struct LiSpsmShadowCameraSetup {
    settings: LiSpsmSettings,
    focused: FocusedShadowCameraSetup,
}

impl LiSpsmShadowCameraSetup {
    pub fn new(settings: LiSpsmSettings) -> Self {
        Self {
            settings,
            focused: FocusedShadowCameraSetup::new(),
        }
    }

    pub fn optimal_adjust_factor(&self) -> f32 {
        self.settings.optimal_adjust_factor
    }

    pub fn set_optimal_adjust_factor(&mut self, factor: f32) {
        self.settings.optimal_adjust_factor = factor;
    }

    pub fn use_simple_optimal_adjust(&self) -> bool {
        self.settings.use_simple_optimal_adjust
    }

    pub fn set_use_simple_optimal_adjust(&mut self, simple: bool) {
        self.settings.use_simple_optimal_adjust = simple;
    }

    /// Threshold in degrees
    pub fn set_camera_light_direction_threshold(&mut self, degrees: f32) {
        self.settings.camera_light_direction_threshold = degrees;
    }

    /// Distance from the warp frustum's eye to the near side of the focus
    /// volume, before the adjust factor
    ///
    /// `depth` is the extent of the focus volume along the warp axis.
    pub fn optimal_near(&self, z_near: f32, z_far: f32, depth: f32, sin_gamma: f32) -> f32 {
        if self.settings.use_simple_optimal_adjust {
            (z_near + (z_near * z_far).sqrt()) / sin_gamma
        } else {
            // Far distance measured along the warp axis instead of the view
            let z_far = z_near + depth * sin_gamma;
            (z_near + (z_near * z_far).sqrt()) / sin_gamma
        }
    }

    /// Perspective warp along the fit's +Y axis followed by a crop of the
    /// warped volume to the unit cube. Light depth stays on Z.
    fn warp(&self, fit: &LightSpaceFit, z_near: f32, z_far: f32, sin_gamma: f32) -> Option<Mat4> {
        let b = &fit.bounds;
        let depth = b.max.y - b.min.y;
        if depth <= f32::EPSILON {
            return None;
        }

        let n = self.optimal_near(z_near, z_far, depth, sin_gamma)
            * self.settings.optimal_adjust_factor;
        if !n.is_finite() || n <= 0.0 {
            return None;
        }
        let f = n + depth;

        // Eye on the viewer side of the volume, n away from it
        let center = b.center();
        let eye = Vec3::new(center.x, b.min.y - n, center.z);

        // y' = ((f + n) y - 2fn) / (f - n), w' = y
        let a = (f + n) / (f - n);
        let c = -2.0 * f * n / (f - n);
        let perspective = Mat4::from_cols(
            Vec4::new(1.0, 0.0, 0.0, 0.0),
            Vec4::new(0.0, a, 0.0, 1.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(0.0, c, 0.0, 0.0),
        );
        let warp = perspective * Mat4::from_translation(-eye);

        let mut warped = Aabb::NULL;
        for corner in b.corners() {
            warped.merge_point(warp.project_point3(corner));
        }
        let extent = warped.max - warped.min;
        if extent.min_element() <= f32::EPSILON {
            return None;
        }

        // X and Y to [-1, 1]; Z to [0, 1] with the light side at 0
        let scale = Vec3::new(2.0 / extent.x, 2.0 / extent.y, -1.0 / extent.z);
        let offset = Vec3::new(
            -(warped.max.x + warped.min.x) / extent.x,
            -(warped.max.y + warped.min.y) / extent.y,
            warped.max.z / extent.z,
        );
        let crop = Mat4::from_translation(offset) * Mat4::from_scale(scale);

        Some(crop * warp)
    }
}

impl Default for LiSpsmShadowCameraSetup {
    fn default() -> Self {
        Self::new(LiSpsmSettings::default())
    }
}

impl ShadowCameraSetup for LiSpsmShadowCameraSetup {
    fn shadow_camera(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        split: usize,
    ) -> DepthRange {
        if light.light_type != LightType::Directional {
            return self.focused.shadow_camera(ctx, viewer, light, out, split);
        }
        let Some(direction) = light.direction.try_normalize() else {
            return self.focused.shadow_camera(ctx, viewer, light, out, split);
        };

        let cos_gamma = viewer.direction().dot(direction).clamp(-1.0, 1.0);
        let gamma = cos_gamma.abs().acos().to_degrees();
        if gamma < self.settings.camera_light_direction_threshold {
            log::trace!("LiSPSM skipped for '{}': view and light almost parallel", light.name);
            return self.focused.shadow_camera(ctx, viewer, light, out, split);
        }
        let sin_gamma = (1.0 - cos_gamma * cos_gamma).sqrt();

        let z_near = viewer.near_clip_distance();
        let z_far = shadow_far_distance(viewer, ctx.scene);
        let volume = focus_volume(ctx, viewer, z_near, z_far);

        let warped = fit_directional(ctx, viewer, direction, &volume)
            .and_then(|fit| self.warp(&fit, z_near, z_far, sin_gamma).map(|m| (fit, m)));
        match warped {
            Some((fit, projection)) => fit.apply(out, projection),
            None => self.focused.shadow_camera(ctx, viewer, light, out, split),
        }
    }

    fn technique(&self) -> ShadowMapTechnique {
        ShadowMapTechnique::LiSpsm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_scene::SceneManager;

    fn setup_scene(direction: Vec3) -> (SceneManager, Light, Camera, Camera) {
        let mut scene = SceneManager::new();
        let sun = scene.create_light("sun", LightType::Directional);
        scene.light_mut(sun).unwrap().direction = direction;
        let light = scene.light(sun).unwrap().clone();
        let viewer = scene.create_camera("viewer");
        let out = scene.create_camera("shadow");
        (scene, light, viewer, out)
    }

    #[test]
    fn test_defaults() {
        let setup = LiSpsmShadowCameraSetup::default();
        assert_eq!(setup.optimal_adjust_factor(), 5.0);
        assert!(!setup.use_simple_optimal_adjust());
    }

    #[test]
    fn test_optimal_near_simple() {
        let mut setup = LiSpsmShadowCameraSetup::default();
        setup.set_use_simple_optimal_adjust(true);
        let n = setup.optimal_near(1.0, 100.0, 50.0, 1.0);
        assert!((n - 11.0).abs() < 1e-4);
    }

    #[test]
    fn test_warped_projection_contains_receivers() {
        let (scene, light, viewer, mut out) = setup_scene(Vec3::NEG_Y);
        let receivers = Aabb::new(Vec3::new(-20.0, -1.0, -150.0), Vec3::new(20.0, 0.0, -2.0));
        let null = Aabb::NULL;
        let ctx = ShadowSetupContext {
            scene: scene.config(),
            receiver_box: &receivers,
            casters_box: &null,
            texture_size: (1024, 1024),
        };

        let range = LiSpsmShadowCameraSetup::default()
            .shadow_camera(&ctx, &viewer, &light, &mut out, 0);
        assert!(range.max > range.min);

        let vp = out.view_projection_matrix();
        let volume = focus_volume(&ctx, &viewer, viewer.near_clip_distance(), 200.0);
        for corner in volume.corners() {
            let p = vp.project_point3(corner);
            assert!(p.x.abs() <= 1.0 + 1e-3, "{:?}", p);
            assert!(p.y.abs() <= 1.0 + 1e-3, "{:?}", p);
        }

        // Near receivers get more of the map than far ones
        let near = vp.project_point3(Vec3::new(0.0, 0.0, -5.0));
        let near_step = vp.project_point3(Vec3::new(0.0, 0.0, -10.0));
        let far = vp.project_point3(Vec3::new(0.0, 0.0, -140.0));
        let far_step = vp.project_point3(Vec3::new(0.0, 0.0, -145.0));
        assert!((near.y - near_step.y).abs() > (far.y - far_step.y).abs());
    }

    #[test]
    fn test_parallel_light_uses_focused() {
        let (scene, light, viewer, mut out) = setup_scene(Vec3::NEG_Z);
        let receivers = Aabb::new(Vec3::new(-5.0, -5.0, -50.0), Vec3::new(5.0, 5.0, -10.0));
        let null = Aabb::NULL;
        let ctx = ShadowSetupContext {
            scene: scene.config(),
            receiver_box: &receivers,
            casters_box: &null,
            texture_size: (1024, 1024),
        };

        let mut focused_out = out.clone();
        LiSpsmShadowCameraSetup::default().shadow_camera(&ctx, &viewer, &light, &mut out, 0);
        FocusedShadowCameraSetup::new()
            .shadow_camera(&ctx, &viewer, &light, &mut focused_out, 0);
        assert_eq!(out.projection_matrix(), focused_out.projection_matrix());
    }
}
