//! Skeleton instances
//!
//! Bones live in one arena ordered by hierarchy depth. Every depth level
//! starts on a lane boundary and is padded to a whole number of lanes, so
//! derived transforms are computed [`LANE_WIDTH`] bones at a time with every
//! parent finished before its children. Padding slots hold identity
//! transforms and are never read back.

use std::sync::Arc;

use glam::Mat4;

use crate::animation::SkeletonAnimation;
use crate::definition::{BoneTransform, SkeletonDef};
use crate::error::{SkeletonError, SkeletonResult};

/// Bones processed together
pub const LANE_WIDTH: usize = 4;

/// A bone of a [`SkeletonInstance`], by index in its definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoneHandle(usize);

impl BoneHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// An animated copy of a [`SkeletonDef`]
#[derive(Debug)]
pub struct SkeletonInstance {
    definition: Arc<SkeletonDef>,
    /// Arena slot of each bone
    bone_slots: Vec<usize>,
    /// First slot of each depth level, plus the arena length
    level_starts: Vec<usize>,
    /// Parent slot per slot, `None` for roots and padding
    parent_slots: Vec<Option<usize>>,
    locals: Vec<BoneTransform>,
    derived: Vec<Mat4>,
    manual: Vec<bool>,
    animations: Vec<SkeletonAnimation>,
    /// Indices into `animations`, in enable order
    active: Vec<usize>,
    parent_node: Option<Mat4>,
}

impl SkeletonInstance {
    pub fn new(definition: Arc<SkeletonDef>) -> Self {
        let num_bones = definition.num_bones();
        let mut bone_slots = vec![0; num_bones];
        let mut level_starts = Vec::with_capacity(definition.depth_levels().len() + 1);

        let mut next = 0;
        for level in definition.depth_levels() {
            level_starts.push(next);
            for (i, bone) in level.iter().enumerate() {
                bone_slots[*bone] = next + i;
            }
            next += level.len().div_ceil(LANE_WIDTH) * LANE_WIDTH;
        }
        level_starts.push(next);

        let mut parent_slots = vec![None; next];
        let mut locals = vec![BoneTransform::IDENTITY; next];
        for (bone, def) in definition.bones().iter().enumerate() {
            let slot = bone_slots[bone];
            parent_slots[slot] = def.parent.map(|p| bone_slots[p]);
            locals[slot] = def.binding;
        }

        let animations = definition
            .animations()
            .iter()
            .enumerate()
            .map(|(i, anim)| SkeletonAnimation::new(i, anim, num_bones))
            .collect();

        let mut instance = Self {
            definition,
            bone_slots,
            level_starts,
            parent_slots,
            locals,
            derived: vec![Mat4::IDENTITY; next],
            manual: vec![false; next],
            animations,
            active: Vec::new(),
            parent_node: None,
        };
        instance.update_derived();
        instance
    }

    #[inline]
    pub fn definition(&self) -> &Arc<SkeletonDef> {
        &self.definition
    }

    /// Arena slots including padding
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.locals.len()
    }

    /// Reset bones to the binding pose, apply the enabled animations and
    /// recompute derived transforms.
    ///
    /// Manual bones keep their local transform; if they are also animated
    /// the caller resets them before every update.
    pub fn update(&mut self) {
        self.reset_to_pose();
        let definition = Arc::clone(&self.definition);
        for &index in &self.active {
            let animation = &self.animations[index];
            let def = &definition.animations()[animation.definition()];
            animation.apply(def, &mut self.locals, &self.bone_slots);
        }
        self.update_derived();
    }

    /// Restore the binding pose of every bone that isn't manual
    pub fn reset_to_pose(&mut self) {
        for (bone, def) in self.definition.bones().iter().enumerate() {
            let slot = self.bone_slots[bone];
            if !self.manual[slot] {
                self.locals[slot] = def.binding;
            }
        }
    }

    fn update_derived(&mut self) {
        let root = self.parent_node.unwrap_or(Mat4::IDENTITY);
        for level in self.level_starts.windows(2) {
            for lane_start in (level[0]..level[1]).step_by(LANE_WIDTH) {
                let mut lanes = [Mat4::IDENTITY; LANE_WIDTH];
                for (lane, out) in lanes.iter_mut().enumerate() {
                    let slot = lane_start + lane;
                    let parent = self.parent_slots[slot].map_or(root, |p| self.derived[p]);
                    *out = parent * self.locals[slot].to_matrix();
                }
                self.derived[lane_start..lane_start + LANE_WIDTH].copy_from_slice(&lanes);
            }
        }
    }

    /// Bone by name
    pub fn get_bone(&self, name: &str) -> SkeletonResult<BoneHandle> {
        self.definition.find_bone(name).map(BoneHandle).ok_or_else(|| {
            SkeletonError::ItemNotFound(format!(
                "Bone '{}' in skeleton '{}'",
                name,
                self.definition.name()
            ))
        })
    }

    /// Local transform of a bone, for manual control
    pub fn bone_transform(&self, bone: BoneHandle) -> &BoneTransform {
        &self.locals[self.bone_slots[bone.0]]
    }

    pub fn bone_transform_mut(&mut self, bone: BoneHandle) -> &mut BoneTransform {
        &mut self.locals[self.bone_slots[bone.0]]
    }

    /// Exclude a bone from [`SkeletonInstance::reset_to_pose`]
    pub fn set_manual_bone(&mut self, bone: BoneHandle, manual: bool) {
        let slot = self.bone_slots[bone.0];
        self.manual[slot] = manual;
    }

    pub fn is_manual_bone(&self, bone: BoneHandle) -> bool {
        self.manual[self.bone_slots[bone.0]]
    }

    /// Transform of a bone including its ancestors and the parent node
    pub fn full_transform(&self, bone: BoneHandle) -> Mat4 {
        self.derived[self.bone_slots[bone.0]]
    }

    /// Full transforms of `used_bones`, in that order
    pub fn transforms(&self, used_bones: &[u16]) -> SkeletonResult<Vec<Mat4>> {
        used_bones
            .iter()
            .map(|&bone| {
                self.bone_slots
                    .get(bone as usize)
                    .map(|&slot| self.derived[slot])
                    .ok_or_else(|| {
                        SkeletonError::ItemNotFound(format!(
                            "Bone {} in skeleton '{}'",
                            bone,
                            self.definition.name()
                        ))
                    })
            })
            .collect()
    }

    /// Place the skeleton under a node so bones end up in world space;
    /// `None` detaches it
    pub fn set_parent_node(&mut self, transform: Option<Mat4>) {
        self.parent_node = transform;
        self.update_derived();
    }

    #[inline]
    pub fn parent_node(&self) -> Option<Mat4> {
        self.parent_node
    }

    // ========================================================================
    // Animations
    // ========================================================================

    pub fn has_animation(&self, name: &str) -> bool {
        self.animations.iter().any(|a| a.name() == name)
    }

    fn animation_index(&self, name: &str) -> SkeletonResult<usize> {
        self.animations
            .iter()
            .position(|a| a.name() == name)
            .ok_or_else(|| SkeletonError::ItemNotFound(format!("Animation '{}'", name)))
    }

    pub fn animation(&self, name: &str) -> SkeletonResult<&SkeletonAnimation> {
        let index = self.animation_index(name)?;
        Ok(&self.animations[index])
    }

    pub fn animation_mut(&mut self, name: &str) -> SkeletonResult<&mut SkeletonAnimation> {
        let index = self.animation_index(name)?;
        Ok(&mut self.animations[index])
    }

    pub fn enable_animation(&mut self, name: &str) -> SkeletonResult<()> {
        let index = self.animation_index(name)?;
        if self.animations[index].is_enabled() {
            return Err(SkeletonError::AlreadyEnabled(name.to_string()));
        }
        self.animations[index].set_enabled(true);
        self.active.push(index);
        log::trace!("Enabled animation '{}' on '{}'", name, self.definition.name());
        Ok(())
    }

    pub fn disable_animation(&mut self, name: &str) -> SkeletonResult<()> {
        let index = self.animation_index(name)?;
        if !self.animations[index].is_enabled() {
            return Err(SkeletonError::NotEnabled(name.to_string()));
        }
        self.animations[index].set_enabled(false);
        self.active.retain(|&i| i != index);
        log::trace!("Disabled animation '{}' on '{}'", name, self.definition.name());
        Ok(())
    }

    /// Names of the enabled animations, in enable order
    pub fn active_animations(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(|&i| self.animations[i].name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::BoneDef;
    use glam::Vec3;

    fn chain() -> Arc<SkeletonDef> {
        let bones = vec![
            BoneDef::root("root", BoneTransform::from_position(Vec3::new(0.0, 1.0, 0.0))),
            BoneDef::child("a", 0, BoneTransform::from_position(Vec3::X)),
            BoneDef::child("b", 0, BoneTransform::from_position(Vec3::Y)),
            BoneDef::child("c", 0, BoneTransform::from_position(Vec3::Z)),
            BoneDef::child("d", 0, BoneTransform::from_position(Vec3::NEG_X)),
            BoneDef::child("e", 0, BoneTransform::from_position(Vec3::NEG_Y)),
            BoneDef::child("tip", 5, BoneTransform::from_position(Vec3::NEG_Y)),
        ];
        Arc::new(SkeletonDef::new("chain", bones, Vec::new()).unwrap())
    }

    #[test]
    fn test_levels_padded_to_lanes() {
        let skeleton = SkeletonInstance::new(chain());
        // 1 root -> 4 slots, 5 children -> 8 slots, 1 grandchild -> 4 slots
        assert_eq!(skeleton.num_slots(), 16);
        assert_eq!(skeleton.level_starts, vec![0, 4, 12, 16]);
    }

    #[test]
    fn test_derived_transforms() {
        let skeleton = SkeletonInstance::new(chain());
        let tip = skeleton.get_bone("tip").unwrap();
        let position = skeleton.full_transform(tip).transform_point3(Vec3::ZERO);
        assert!(position.abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_parent_node() {
        let mut skeleton = SkeletonInstance::new(chain());
        skeleton.set_parent_node(Some(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))));
        let root = skeleton.get_bone("root").unwrap();
        let position = skeleton.full_transform(root).transform_point3(Vec3::ZERO);
        assert!(position.abs_diff_eq(Vec3::new(10.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_manual_bone_survives_reset() {
        let mut skeleton = SkeletonInstance::new(chain());
        let a = skeleton.get_bone("a").unwrap();
        let b = skeleton.get_bone("b").unwrap();
        skeleton.set_manual_bone(a, true);
        assert!(skeleton.is_manual_bone(a));

        skeleton.bone_transform_mut(a).position = Vec3::splat(5.0);
        skeleton.bone_transform_mut(b).position = Vec3::splat(5.0);
        skeleton.reset_to_pose();

        assert_eq!(skeleton.bone_transform(a).position, Vec3::splat(5.0));
        assert_eq!(skeleton.bone_transform(b).position, Vec3::Y);
    }

    #[test]
    fn test_unknown_bone() {
        let skeleton = SkeletonInstance::new(chain());
        assert!(matches!(skeleton.get_bone("wing"), Err(SkeletonError::ItemNotFound(_))));
        assert!(skeleton.transforms(&[0, 99]).is_err());
        assert_eq!(skeleton.transforms(&[6, 0]).unwrap().len(), 2);
    }
}
