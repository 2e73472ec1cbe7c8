//! # umbra_compositor - Compositor Shadow Nodes
//!
//! A shadow node renders the shadow maps a viewer camera needs and binds
//! them to the passes that receive shadows:
//! - Declarative node definitions loaded from JSON
//! - Closest shadow caster selection, memoized per camera and frame
//! - Shadow camera setups: default, focused, PSSM and LiSPSM
//! - Shadow map binding for lit passes, with blank textures for missing lights
//! - A low level shading backend for shader-only materials
//!
//! ## Architecture
//!
//! 1. **Definitions**: [`ShadowNodeDef`] describes shadow maps and the scene
//!    passes rendering them. It is shared read-only between node instances.
//! 2. **Manager**: [`CompositorManager`] owns textures shared between nodes
//!    and instantiates registered definitions.
//! 3. **Nodes**: [`ShadowNode`] owns one camera and camera setup per shadow
//!    map and drives them every frame.
//!
//! ## Example
//!
//! ```ignore
//! use umbra_compositor::prelude::*;
//!
//! let compositor = CompositorManager::new();
//! compositor.load_shadow_node_definition(include_str!("shadows.json"))?;
//! let mut node = compositor.create_shadow_node("ShadowNode", &mut scene)?;
//!
//! scene.begin_frame();
//! node.update(&viewer, &mut scene, &mut renderer)?;
//!
//! // For every lit renderable
//! let lights = node.set_shadow_maps_to_pass(
//!     &renderable_lights, &mut pass, &mut params, 0, &compositor,
//! )?;
//! ```

pub mod camera_setup;
pub mod definition;
pub mod error;
pub mod gpu;
pub mod light_selection;
pub mod low_level;
pub mod manager;
pub mod material;
pub mod receivers;
pub mod shadow_node;
pub mod slot;
pub mod texture;

pub use camera_setup::{
    create_shadow_camera_setup, DepthRange, ShadowCameraSetup, ShadowSetupContext,
};
pub use definition::{
    AtlasRegion, CameraSetupSettings, LiSpsmSettings, PassSceneDef, PssmSettings,
    ShadowMapTechnique, ShadowMapTexDef, ShadowNodeDef,
};
pub use error::{CompositorError, CompositorResult};
pub use manager::CompositorManager;
pub use shadow_node::{NodeState, ScenePassRenderer, ShadowNode};

/// Prelude for common imports
pub mod prelude {
    pub use crate::camera_setup::{
        DefaultShadowCameraSetup, DepthRange, FocusedShadowCameraSetup, LiSpsmShadowCameraSetup,
        PssmShadowCameraSetup, ShadowCameraSetup,
    };
    pub use crate::definition::{PassSceneDef, ShadowMapTechnique, ShadowMapTexDef, ShadowNodeDef};
    pub use crate::error::{CompositorError, CompositorResult};
    pub use crate::gpu::GpuShadowMap;
    pub use crate::low_level::{LowLevelBackend, RenderSystem, Renderable};
    pub use crate::manager::CompositorManager;
    pub use crate::material::{
        AutoParamDataSource, AutoParamSink, ContentType, Material, Pass, TextureProjector,
        TextureUnitState,
    };
    pub use crate::shadow_node::{ScenePassRenderer, ShadowNode};
    pub use crate::texture::{PixelFormat, RenderTarget, TextureFactory, TextureHandle, TextureManager};
}
