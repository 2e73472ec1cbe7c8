//! Uniform shadow camera setup

use glam::Vec3;
use umbra_scene::{Camera, Light, LightType, ProjectionType};

use super::{shadow_far_distance, snap_to_texel, DepthRange, ShadowCameraSetup, ShadowSetupContext};
use crate::definition::ShadowMapTechnique;

/// Point lights get a wide perspective shadow camera
const POINT_LIGHT_FOV_DEGREES: f32 = 120.0;
/// Spot shadow frusta are a bit wider than the cone to hide the edges
const SPOT_FOV_SCALE: f32 = 1.2;
const MIN_NEAR_CLIP: f32 = 0.01;

/// Fixed-size shadow cameras that ignore scene content
///
/// Directional lights get an orthographic window twice the shadow far
/// distance wide, centred ahead of the viewer and pulled back along the
/// light. Spot and point lights get a perspective camera at the light.
#[derive(Clone, Debug, Default)]
pub struct DefaultShadowCameraSetup;

impl DefaultShadowCameraSetup {
    pub fn new() -> Self {
        Self
    }

    fn directional(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
    ) -> DepthRange {
        let shadow_dist = shadow_far_distance(viewer, ctx.scene);
        let offset = shadow_dist * ctx.scene.shadow_dir_light_texture_offset;
        let extrusion = ctx.scene.shadow_dir_light_extrusion_distance;
        let direction = light.direction.try_normalize().unwrap_or(Vec3::NEG_Y);
        let window = shadow_dist * 2.0;

        out.set_projection_type(ProjectionType::Orthographic);
        out.set_ortho_window(window, window);
        out.set_direction(direction);

        let center = viewer.position() + viewer.direction() * offset;

        // Snap the centre in the light's image plane to whole texels
        let texel = window / ctx.texture_size.0.max(1) as f32;
        let right = out.right();
        let up = out.up();
        let snapped = right * snap_to_texel(center.dot(right), texel)
            + up * snap_to_texel(center.dot(up), texel)
            + direction * center.dot(direction);

        out.set_position(snapped - direction * extrusion);

        let near = 1.0;
        let far = extrusion + shadow_dist * 2.0;
        out.set_near_clip_distance(near);
        out.set_far_clip_distance(far);
        DepthRange::new(near, far)
    }

    fn spot(&self, viewer: &Camera, light: &Light, out: &mut Camera) -> DepthRange {
        out.set_projection_type(ProjectionType::Perspective);
        out.set_fov_y((light.spot_outer_angle * SPOT_FOV_SCALE).min(179f32.to_radians()));
        out.set_position(light.position);
        if let Some(direction) = light.direction.try_normalize() {
            out.set_direction(direction);
        }
        self.perspective_range(viewer, light, out)
    }

    fn point(&self, viewer: &Camera, light: &Light, out: &mut Camera) -> DepthRange {
        out.set_projection_type(ProjectionType::Perspective);
        out.set_fov_y(POINT_LIGHT_FOV_DEGREES.to_radians());
        out.set_position(light.position);

        let to_viewer = viewer.position() - light.position;
        let direction = to_viewer.try_normalize().unwrap_or(viewer.direction());
        out.set_direction(direction);
        self.perspective_range(viewer, light, out)
    }

    fn perspective_range(&self, viewer: &Camera, light: &Light, out: &mut Camera) -> DepthRange {
        let near = viewer.near_clip_distance().max(MIN_NEAR_CLIP);
        let far = light.range.max(near * 2.0);
        out.set_aspect_ratio(1.0);
        out.set_near_clip_distance(near);
        out.set_far_clip_distance(far);
        DepthRange::new(near, far)
    }
}

impl ShadowCameraSetup for DefaultShadowCameraSetup {
    fn shadow_camera(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        _split: usize,
    ) -> DepthRange {
        out.set_custom_view_matrix(None);
        out.set_custom_projection_matrix(None);

        match light.light_type {
            LightType::Directional => self.directional(ctx, viewer, light, out),
            LightType::Spot => self.spot(viewer, light, out),
            LightType::Point => self.point(viewer, light, out),
        }
    }

    fn technique(&self) -> ShadowMapTechnique {
        ShadowMapTechnique::Default
    }
}
