//! # umbra_scene - Scene Collaborators for Shadow Rendering
//!
//! The parts of a scene manager the shadow-node pipeline reads from:
//!
//! - Lights and the per-frame global light list (struct-of-arrays)
//! - Cameras and viewports
//! - Per-camera, per-render-queue shadow receiver bounds
//! - Shadow caster bounds
//! - The illumination render stage, switched through an RAII scope
//!
//! ## Example
//!
//! ```ignore
//! use umbra_scene::*;
//!
//! let mut scene = SceneManager::new();
//! let sun = scene.create_light("sun", LightType::Directional);
//! scene.light_mut(sun)?.direction = Vec3::new(-1.0, -1.0, 0.0).normalize();
//!
//! let mut camera = scene.create_camera("main");
//! camera.notify_viewport(Viewport::new(ViewportId(0)));
//!
//! scene.begin_frame();
//! {
//!     let mut stage = scene.scoped_render_stage(IlluminationRenderStage::RenderToTexture);
//!     // render shadow casters through `stage`
//! }
//! ```

extern crate alloc;

pub mod bounds;
pub mod camera;
pub mod error;
pub mod frustum;
pub mod light;
pub mod scene_manager;

pub use bounds::{Aabb, Sphere};
pub use camera::{Camera, CameraId, ProjectionType, Viewport, ViewportId};
pub use error::{SceneError, SceneResult};
pub use frustum::{Frustum, Plane};
pub use light::{
    GlobalLightList, Light, LightClosest, LightId, LightType,
    LAYER_SHADOW_CASTER, LAYER_VISIBILITY, RESERVED_VISIBILITY_FLAGS,
};
pub use scene_manager::{
    FrameStats, IlluminationRenderStage, ObjectId, RenderStageScope, SceneConfig, SceneManager,
    SceneObject,
};

pub use glam::{Mat4, Quat, Vec2, Vec3};
