//! Skeleton definitions
//!
//! A [`SkeletonDef`] is immutable once built and shared between every
//! instance animating it.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::SkeletonAnimationDef;
use crate::error::{SkeletonError, SkeletonResult};

/// Local transform of a bone relative to its parent
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneTransform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl BoneTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    #[inline]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A bone of the binding pose
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneDef {
    pub name: String,
    /// Index of the parent bone, `None` for roots
    #[serde(default)]
    pub parent: Option<usize>,
    /// Transform in the binding pose
    #[serde(default)]
    pub binding: BoneTransform,
}

impl BoneDef {
    pub fn root(name: impl Into<String>, binding: BoneTransform) -> Self {
        Self {
            name: name.into(),
            parent: None,
            binding,
        }
    }

    pub fn child(name: impl Into<String>, parent: usize, binding: BoneTransform) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
            binding,
        }
    }
}

/// Bone hierarchy with its animations
#[derive(Clone, Debug)]
pub struct SkeletonDef {
    name: String,
    bones: Vec<BoneDef>,
    /// Bone indices per hierarchy depth, roots first
    depth_levels: Vec<Vec<usize>>,
    animations: Vec<SkeletonAnimationDef>,
}

impl SkeletonDef {
    /// Build a definition, checking parents exist and the hierarchy has no
    /// cycles
    pub fn new(
        name: impl Into<String>,
        bones: Vec<BoneDef>,
        animations: Vec<SkeletonAnimationDef>,
    ) -> SkeletonResult<Self> {
        let name = name.into();
        let depths = bone_depths(&name, &bones)?;

        let max_depth = depths.iter().copied().max().unwrap_or(0);
        let mut depth_levels = vec![Vec::new(); if bones.is_empty() { 0 } else { max_depth + 1 }];
        for (bone, depth) in depths.iter().enumerate() {
            depth_levels[*depth].push(bone);
        }

        for animation in &animations {
            if let Some(track) = animation.tracks.iter().find(|t| t.bone >= bones.len()) {
                return Err(SkeletonError::InvalidHierarchy(format!(
                    "Animation '{}' animates bone {} but '{}' has {} bones",
                    animation.name,
                    track.bone,
                    name,
                    bones.len()
                )));
            }
        }

        log::debug!(
            "Skeleton '{}': {} bones in {} depth levels, {} animations",
            name,
            bones.len(),
            depth_levels.len(),
            animations.len()
        );

        Ok(Self {
            name,
            bones,
            depth_levels,
            animations,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bones(&self) -> &[BoneDef] {
        &self.bones
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn depth_levels(&self) -> &[Vec<usize>] {
        &self.depth_levels
    }

    #[inline]
    pub fn animations(&self) -> &[SkeletonAnimationDef] {
        &self.animations
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }
}

fn bone_depths(skeleton: &str, bones: &[BoneDef]) -> SkeletonResult<Vec<usize>> {
    let mut depths = Vec::with_capacity(bones.len());
    for (index, bone) in bones.iter().enumerate() {
        let mut depth = 0;
        let mut parent = bone.parent;
        while let Some(p) = parent {
            if p >= bones.len() {
                return Err(SkeletonError::InvalidHierarchy(format!(
                    "Bone '{}' of '{}' has missing parent {}",
                    bone.name, skeleton, p
                )));
            }
            depth += 1;
            // Deeper than the bone count means we walked in a circle
            if depth > bones.len() || p == index {
                return Err(SkeletonError::InvalidHierarchy(format!(
                    "Bone '{}' of '{}' is its own ancestor",
                    bone.name, skeleton
                )));
            }
            parent = bones[p].parent;
        }
        depths.push(depth);
    }
    Ok(depths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_levels() {
        let bones = vec![
            BoneDef::root("root", BoneTransform::IDENTITY),
            BoneDef::child("spine", 0, BoneTransform::IDENTITY),
            BoneDef::child("head", 1, BoneTransform::IDENTITY),
            BoneDef::child("leg", 0, BoneTransform::IDENTITY),
        ];
        let def = SkeletonDef::new("biped", bones, Vec::new()).unwrap();
        assert_eq!(def.depth_levels(), &[vec![0], vec![1, 3], vec![2]]);
        assert_eq!(def.find_bone("head"), Some(2));
        assert_eq!(def.find_bone("tail"), None);
    }

    #[test]
    fn test_cycle_rejected() {
        let bones = vec![
            BoneDef::child("a", 1, BoneTransform::IDENTITY),
            BoneDef::child("b", 0, BoneTransform::IDENTITY),
        ];
        assert!(matches!(
            SkeletonDef::new("loop", bones, Vec::new()),
            Err(SkeletonError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let bones = vec![BoneDef::child("orphan", 4, BoneTransform::IDENTITY)];
        assert!(SkeletonDef::new("broken", bones, Vec::new()).is_err());
    }

    #[test]
    fn test_bone_def_json() {
        let json = r#"{ "name": "hip", "parent": 0 }"#;
        let bone: BoneDef = serde_json::from_str(json).unwrap();
        assert_eq!(bone.parent, Some(0));
        assert_eq!(bone.binding, BoneTransform::IDENTITY);
    }
}
