//! Receiver-focused shadow camera setup

use glam::{Mat3, Mat4, Quat, Vec3};
use umbra_scene::{Aabb, Camera, Light, LightType, ProjectionType};

use super::default::DefaultShadowCameraSetup;
use super::{
    light_space_bounds, perpendicular_up, shadow_far_distance, snap_to_texel, DepthRange,
    ShadowCameraSetup, ShadowSetupContext,
};
use crate::definition::ShadowMapTechnique;

/// Gap left between the shadow camera and the closest caster
const NEAR_PADDING: f32 = 1.0;
const MIN_NEAR_CLIP: f32 = 0.01;

/// A directional shadow camera fitted around a focus volume
#[derive(Clone, Debug)]
pub(crate) struct LightSpaceFit {
    pub position: Vec3,
    pub orientation: Quat,
    /// Focus volume in the fitted camera's view space. The camera looks
    /// down -Z and the viewer's forward direction maps to +Y.
    pub bounds: Aabb,
}

impl LightSpaceFit {
    pub fn depth_range(&self) -> DepthRange {
        DepthRange::new(-self.bounds.max.z, -self.bounds.min.z)
    }

    /// Place `out` at the fitted pose and give it `projection`
    pub fn apply(&self, out: &mut Camera, projection: Mat4) -> DepthRange {
        let range = self.depth_range();
        out.set_projection_type(ProjectionType::Orthographic);
        out.set_position(self.position);
        out.set_orientation(self.orientation);
        out.set_custom_view_matrix(None);
        out.set_custom_projection_matrix(Some(projection));
        out.set_near_clip_distance(range.min);
        out.set_far_clip_distance(range.max);
        range
    }

    pub fn orthographic(&self) -> Mat4 {
        let b = &self.bounds;
        Mat4::orthographic_rh(b.min.x, b.max.x, b.min.y, b.max.y, -b.max.z, -b.min.z)
    }
}

/// Part of the viewer's frustum between `near` and `far` that holds
/// receivers, null when nothing is visible
pub(crate) fn focus_volume(
    ctx: &ShadowSetupContext<'_>,
    viewer: &Camera,
    near: f32,
    far: f32,
) -> Aabb {
    let corners = viewer.world_frustum_corners(near, far);
    Aabb::from_points(&corners).intersection(ctx.receiver_box)
}

/// Fit a camera looking along `direction` around `volume`, pulled back
/// towards the light far enough to see every caster in front of it.
pub(crate) fn fit_directional(
    ctx: &ShadowSetupContext<'_>,
    viewer: &Camera,
    direction: Vec3,
    volume: &Aabb,
) -> Option<LightSpaceFit> {
    if volume.is_null() {
        return None;
    }

    let up = perpendicular_up(direction, viewer.direction());
    let back = -direction;
    let right = up.cross(back);
    let orientation = Quat::from_mat3(&Mat3::from_cols(right, up, back)).normalize();

    let center = volume.center();
    let view = Mat4::from_rotation_translation(orientation, center).inverse();

    let mut bounds = light_space_bounds(&view, &volume.corners());
    if !ctx.casters_box.is_null() {
        let casters = light_space_bounds(&view, &ctx.casters_box.corners());
        // Only towards the light: casters behind the receivers cast nothing
        bounds.max.z = bounds.max.z.max(casters.max.z);
    }

    let (width, height) = ctx.texture_size;
    let texel_x = (bounds.max.x - bounds.min.x) / width.max(1) as f32;
    let texel_y = (bounds.max.y - bounds.min.y) / height.max(1) as f32;
    bounds.min.x = snap_to_texel(bounds.min.x, texel_x);
    bounds.min.y = snap_to_texel(bounds.min.y, texel_y);
    bounds.max.x = snap_to_texel(bounds.max.x, texel_x) + texel_x;
    bounds.max.y = snap_to_texel(bounds.max.y, texel_y) + texel_y;

    // Move the eye to just behind the closest caster
    let pull_back = bounds.max.z + NEAR_PADDING;
    bounds.min.z -= pull_back;
    bounds.max.z -= pull_back;

    Some(LightSpaceFit {
        position: center + back * pull_back,
        orientation,
        bounds,
    })
}

/// Shadow cameras fitted to the visible shadow receivers
///
/// Directional lights get an orthographic projection tightly enclosing the
/// receivers inside the viewer's frustum, extended towards the light to keep
/// every caster in range. Spot and point lights keep their perspective
/// camera but get near and far planes fitted to the same volume. When no
/// receiver is visible the default setup is used.
#[derive(Clone, Debug, Default)]
pub struct FocusedShadowCameraSetup {
    fallback: DefaultShadowCameraSetup,
}

impl FocusedShadowCameraSetup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Focus on the part of the viewer's frustum between `near` and `far`
    pub(crate) fn focus(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        near: f32,
        far: f32,
    ) -> Option<DepthRange> {
        let volume = focus_volume(ctx, viewer, near, far);
        if volume.is_null() {
            return None;
        }

        match light.light_type {
            LightType::Directional => {
                let direction = light.direction.try_normalize()?;
                let fit = fit_directional(ctx, viewer, direction, &volume)?;
                Some(fit.apply(out, fit.orthographic()))
            }
            LightType::Spot | LightType::Point => {
                self.fallback.shadow_camera(ctx, viewer, light, out, 0);
                if light.light_type == LightType::Point {
                    if let Some(direction) = (volume.center() - light.position).try_normalize() {
                        out.set_direction(direction);
                    }
                }
                self.fit_perspective_depth(ctx, &volume, out)
            }
        }
    }

    fn fit_perspective_depth(
        &self,
        ctx: &ShadowSetupContext<'_>,
        volume: &Aabb,
        out: &mut Camera,
    ) -> Option<DepthRange> {
        let view = out.view_matrix();
        let receivers = light_space_bounds(&view, &volume.corners());
        let mut closest = receivers.max.z;
        if !ctx.casters_box.is_null() {
            closest = closest.max(light_space_bounds(&view, &ctx.casters_box.corners()).max.z);
        }

        let near = (-closest).max(MIN_NEAR_CLIP);
        let far = -receivers.min.z;
        if far <= near {
            // Everything is behind the light
            return None;
        }

        out.set_near_clip_distance(near);
        out.set_far_clip_distance(far);
        Some(DepthRange::new(near, far))
    }
}

impl ShadowCameraSetup for FocusedShadowCameraSetup {
    fn shadow_camera(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        split: usize,
    ) -> DepthRange {
        let near = viewer.near_clip_distance();
        let far = shadow_far_distance(viewer, ctx.scene);
        match self.focus(ctx, viewer, light, out, near, far) {
            Some(range) => range,
            None => {
                log::trace!("Nothing to focus on for light '{}', using default setup", light.name);
                self.fallback.shadow_camera(ctx, viewer, light, out, split)
            }
        }
    }

    fn technique(&self) -> ShadowMapTechnique {
        ShadowMapTechnique::Focused
    }
}
