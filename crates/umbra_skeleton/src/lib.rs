//! # umbra_skeleton - Skeleton Instances
//!
//! Bones of a skeleton are grouped by their depth in the hierarchy and laid
//! out in one arena per instance. Each depth level is padded to a multiple of
//! [`LANE_WIDTH`] so a level is processed in fixed-width lanes, parents always
//! before children.
//!
//! ## Example
//!
//! ```ignore
//! use umbra_skeleton::*;
//!
//! let def = Arc::new(SkeletonDef::new("biped", bones, animations)?);
//! let mut skeleton = SkeletonInstance::new(def);
//!
//! skeleton.enable_animation("walk")?;
//! skeleton.animation_mut("walk")?.add_time(dt);
//! skeleton.update();
//!
//! let palette = skeleton.transforms(&used_bones);
//! ```

pub mod animation;
pub mod definition;
pub mod error;
pub mod instance;

pub use animation::{BoneKeyframe, BoneTrack, SkeletonAnimation, SkeletonAnimationDef};
pub use definition::{BoneDef, BoneTransform, SkeletonDef};
pub use error::{SkeletonError, SkeletonResult};
pub use instance::{BoneHandle, SkeletonInstance, LANE_WIDTH};
