//! Skeletal animations
//!
//! Keyframes are relative to the binding pose: translations add to it,
//! rotations and scales multiply it. Each instance keeps its own playback
//! state and per-bone weights.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::definition::BoneTransform;

/// Pose offset of one bone at one point in time
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneKeyframe {
    pub time: f32,
    #[serde(default = "zero")]
    pub translation: Vec3,
    #[serde(default = "identity")]
    pub rotation: Quat,
    #[serde(default = "one")]
    pub scale: Vec3,
}

fn zero() -> Vec3 {
    Vec3::ZERO
}

fn identity() -> Quat {
    Quat::IDENTITY
}

fn one() -> Vec3 {
    Vec3::ONE
}

impl BoneKeyframe {
    pub fn new(time: f32) -> Self {
        Self {
            time,
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            time: self.time + (other.time - self.time) * t,
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
        }
    }
}

/// Keyframes of one bone, sorted by time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    pub bone: usize,
    pub keyframes: Vec<BoneKeyframe>,
}

impl BoneTrack {
    pub fn new(bone: usize) -> Self {
        Self {
            bone,
            keyframes: Vec::new(),
        }
    }

    pub fn add_keyframe(&mut self, keyframe: BoneKeyframe) {
        self.keyframes.push(keyframe);
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// Interpolated offset at `time`, `None` without keyframes
    pub fn sample(&self, time: f32) -> Option<BoneKeyframe> {
        let last = self.keyframes.len().checked_sub(1)?;
        let idx = self.keyframes.partition_point(|k| k.time <= time);
        let prev = &self.keyframes[idx.saturating_sub(1)];
        let next = &self.keyframes[idx.min(last)];

        let span = next.time - prev.time;
        let t = if span.abs() < 1e-4 {
            0.0
        } else {
            ((time - prev.time) / span).clamp(0.0, 1.0)
        };
        Some(prev.lerp(next, t))
    }
}

/// Animation data shared between instances
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkeletonAnimationDef {
    pub name: String,
    /// Length in seconds
    pub length: f32,
    pub tracks: Vec<BoneTrack>,
}

/// Playback state of an animation on one skeleton instance
#[derive(Clone, Debug)]
pub struct SkeletonAnimation {
    name: String,
    /// Index into the definition's animations
    definition: usize,
    length: f32,
    time: f32,
    /// Blend weight of the whole animation
    pub weight: f32,
    /// Playback speed multiplier
    pub speed: f32,
    pub looping: bool,
    enabled: bool,
    /// One weight per bone, zero stops the bone from being animated
    bone_weights: Vec<f32>,
}

impl SkeletonAnimation {
    pub(crate) fn new(definition: usize, def: &SkeletonAnimationDef, num_bones: usize) -> Self {
        Self {
            name: def.name.clone(),
            definition,
            length: def.length,
            time: 0.0,
            weight: 1.0,
            speed: 1.0,
            looping: true,
            enabled: false,
            bone_weights: vec![1.0; num_bones],
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn definition(&self) -> usize {
        self.definition
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Jump to `time`, wrapping when looping and clamping otherwise
    pub fn set_time(&mut self, time: f32) {
        self.time = if self.length <= 0.0 {
            0.0
        } else if self.looping {
            time.rem_euclid(self.length)
        } else {
            time.clamp(0.0, self.length)
        };
    }

    pub fn add_time(&mut self, delta: f32) {
        self.set_time(self.time + delta * self.speed);
    }

    /// Whether a non-looping animation reached its end
    pub fn has_ended(&self) -> bool {
        !self.looping && self.time >= self.length
    }

    pub fn bone_weight(&self, bone: usize) -> f32 {
        self.bone_weights.get(bone).copied().unwrap_or(0.0)
    }

    pub fn set_bone_weight(&mut self, bone: usize, weight: f32) {
        if let Some(w) = self.bone_weights.get_mut(bone) {
            *w = weight.clamp(0.0, 1.0);
        }
    }

    /// Apply the animation at the current time to bone local transforms.
    /// `slots` maps bone indices to positions in `locals`.
    pub(crate) fn apply(&self, def: &SkeletonAnimationDef, locals: &mut [BoneTransform], slots: &[usize]) {
        for track in &def.tracks {
            let weight = self.weight * self.bone_weight(track.bone);
            if weight <= 0.0 {
                continue;
            }
            let slot = slots.get(track.bone).copied().unwrap_or(usize::MAX);
            let (Some(key), Some(local)) = (track.sample(self.time), locals.get_mut(slot)) else {
                continue;
            };
            local.position += key.translation * weight;
            local.orientation = Quat::IDENTITY.slerp(key.rotation, weight) * local.orientation;
            local.scale *= Vec3::ONE.lerp(key.scale, weight);
        }
    }
}
