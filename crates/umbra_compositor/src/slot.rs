//! Shadow map slots
//!
//! One slot per shadow map definition: the render target the map is drawn
//! into, the camera it is drawn from and the setup that places that camera.

use umbra_scene::{Camera, SceneManager};

use crate::camera_setup::{create_shadow_camera_setup, DepthRange, ShadowCameraSetup};
use crate::definition::{ShadowMapTexDef, ShadowNodeDef};
use crate::error::{CompositorError, CompositorResult};
use crate::texture::{RenderTarget, TextureDesc, TextureFactory, TextureHandle};

/// Textures backing one shadow map
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureChannel {
    /// `None` for atlas entries, which draw into their source's target
    pub target: Option<RenderTarget>,
    /// One texture per format
    pub textures: Vec<TextureHandle>,
    /// Slot whose target an atlas entry shares
    pub atlas_source: Option<usize>,
}

/// A shadow map with its camera and camera setup
#[derive(Debug)]
pub struct ShadowMapSlot {
    pub camera: Camera,
    pub setup: Box<dyn ShadowCameraSetup>,
    /// Depth range of the last setup, reset on construction only
    pub range: DepthRange,
    pub channel: TextureChannel,
}

/// Create the render target(s) of one shadow map.
///
/// One format gives a plain render texture named after the definition and
/// node id; several give a multi render target with one surface per format.
/// Atlas entries create nothing.
pub fn create_channel(
    node_id: u32,
    map: &ShadowMapTexDef,
    def: &ShadowNodeDef,
    factory: &mut dyn TextureFactory,
) -> CompositorResult<TextureChannel> {
    let texture_name = format!("{}{}", map.name, node_id);
    let desc = |name: String, format| TextureDesc {
        name,
        width: map.width,
        height: map.height,
        format,
        fsaa: map.fsaa,
        hw_gamma_write: map.hw_gamma_write,
    };

    match map.formats.as_slice() {
        [] => {
            let source = map
                .atlas
                .as_ref()
                .and_then(|region| def.find_shadow_map(&region.source))
                .ok_or_else(|| {
                    CompositorError::ItemNotFound(format!(
                        "Atlas source of shadow map '{}'",
                        map.name
                    ))
                })?;
            Ok(TextureChannel {
                target: None,
                textures: Vec::new(),
                atlas_source: Some(source),
            })
        }
        [format] => {
            let texture = factory.create_render_texture(&desc(texture_name, *format))?;
            let target = RenderTarget::Texture(texture);
            factory.set_depth_buffer_pool(target, map.depth_buffer_id)?;
            Ok(TextureChannel {
                target: Some(target),
                textures: vec![texture],
                atlas_source: None,
            })
        }
        formats => {
            let textures = formats
                .iter()
                .enumerate()
                .map(|(i, format)| {
                    let name = format!("{}{}", texture_name, i);
                    factory.create_render_texture(&desc(name, *format))
                })
                .collect::<CompositorResult<Vec<_>>>()?;
            let mrt = factory.create_multi_render_target(&texture_name, &textures)?;
            let target = RenderTarget::Multi(mrt);
            factory.set_depth_buffer_pool(target, map.depth_buffer_id)?;
            Ok(TextureChannel {
                target: Some(target),
                textures,
                atlas_source: None,
            })
        }
    }
}

/// Build every slot of a node, in definition order
pub fn create_slots(
    node_id: u32,
    def: &ShadowNodeDef,
    factory: &mut dyn TextureFactory,
    scene: &mut SceneManager,
) -> CompositorResult<Vec<ShadowMapSlot>> {
    def.shadow_maps
        .iter()
        .enumerate()
        .map(|(idx, map)| {
            let channel = create_channel(node_id, map, def, factory)?;
            let camera_name = format!("ShadowNode Camera ID {} Map {}", node_id, idx);
            let camera = scene.create_camera(camera_name);
            let setup = create_shadow_camera_setup(map.technique, &def.camera_setup)?;
            log::trace!(
                "Shadow map {} '{}' of node {}: {} setup, light rank {}",
                idx,
                map.name,
                node_id,
                map.technique,
                map.light
            );
            Ok(ShadowMapSlot {
                camera,
                setup,
                range: DepthRange::default(),
                channel,
            })
        })
        .collect()
}
