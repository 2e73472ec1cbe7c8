//! Parallel split shadow camera setup
//!
//! The viewer's frustum is cut into `num_splits` slices along its view
//! direction and every slice gets its own focused shadow map. Slices near
//! the viewer are short, so close shadows get more texels.

use umbra_scene::{Camera, Light, SceneConfig};

use super::focused::FocusedShadowCameraSetup;
use super::{shadow_far_distance, DepthRange, ShadowCameraSetup, ShadowSetupContext};
use crate::definition::{PssmSettings, ShadowMapTechnique};

/// Split distances using the practical split scheme
///
/// Blends logarithmic and linear placement:
/// - lambda = 0: linear splits (uniform in view space)
/// - lambda = 1: logarithmic splits (uniform in screen space)
///
/// Returns `num_splits + 1` distances, the first being `near` and the last
/// `far`.
pub fn calculate_split_points(near: f32, far: f32, num_splits: usize, lambda: f32) -> Vec<f32> {
    let count = num_splits.max(1);
    let lambda = lambda.clamp(0.0, 1.0);
    let near = near.max(f32::EPSILON);

    let mut splits = Vec::with_capacity(count + 1);
    splits.push(near);
    for i in 1..count {
        let p = i as f32 / count as f32;
        let log_split = near * (far / near).powf(p);
        let lin_split = near + (far - near) * p;
        splits.push(lambda * log_split + (1.0 - lambda) * lin_split);
    }
    splits.push(far);
    splits
}

/// One focused shadow map per slice of the viewer's frustum
#[derive(Clone, Debug)]
pub struct PssmShadowCameraSetup {
    settings: PssmSettings,
    focused: FocusedShadowCameraSetup,
}

impl PssmShadowCameraSetup {
    pub fn new(settings: PssmSettings) -> Self {
        Self {
            settings,
            focused: FocusedShadowCameraSetup::new(),
        }
    }

    pub fn settings(&self) -> &PssmSettings {
        &self.settings
    }

    /// View distance range covered by `split`, padded on both sides
    pub fn split_range(&self, viewer: &Camera, scene: &SceneConfig, split: usize) -> (f32, f32) {
        let splits = self.points(viewer, scene);
        let last = splits.len().saturating_sub(2);
        let split = split.min(last);
        let padding = self.settings.split_padding;

        let near = (splits[split] - padding).max(viewer.near_clip_distance());
        let far = splits[split + 1] + padding;
        (near, far)
    }

    fn points(&self, viewer: &Camera, scene: &SceneConfig) -> Vec<f32> {
        calculate_split_points(
            viewer.near_clip_distance(),
            shadow_far_distance(viewer, scene),
            self.settings.num_splits,
            self.settings.lambda,
        )
    }
}

impl ShadowCameraSetup for PssmShadowCameraSetup {
    fn shadow_camera(
        &self,
        ctx: &ShadowSetupContext<'_>,
        viewer: &Camera,
        light: &Light,
        out: &mut Camera,
        split: usize,
    ) -> DepthRange {
        let (near, far) = self.split_range(viewer, ctx.scene, split);
        log::trace!("PSSM split {} covers [{}, {}]", split, near, far);

        match self.focused.focus(ctx, viewer, light, out, near, far) {
            Some(range) => range,
            // Nothing to receive in this slice
            None => self.focused.shadow_camera(ctx, viewer, light, out, split),
        }
    }

    fn technique(&self) -> ShadowMapTechnique {
        ShadowMapTechnique::Pssm
    }

    fn split_points(&self, viewer: &Camera, scene: &SceneConfig) -> Option<Vec<f32>> {
        Some(self.points(viewer, scene))
    }
}
