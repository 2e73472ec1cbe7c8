//! GPU Shadow Map Data
//!
//! Per shadow map uniform data, `bytemuck` Pod/Zeroable for direct upload.

use serde::{Deserialize, Serialize};

use crate::shadow_node::ShadowNode;

/// Maximum shadow maps uploaded per node
pub const MAX_SHADOW_MAPS: usize = 16;

/// One shadow map as shaders see it
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuShadowMap {
    /// View-projection matrix of the shadow camera
    pub view_projection: [[f32; 4]; 4],

    /// Min and max depth the shadow camera covers
    pub depth_range: [f32; 2],

    /// 1 / resolution
    pub texel_size: [f32; 2],

    /// Non-zero if the map was rendered this frame
    pub enabled: u32,

    /// Global index of the light casting into the map
    pub light_index: u32,

    pub _pad: [u32; 2],
}

impl GpuShadowMap {
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

impl ShadowNode {
    /// Pack the node's shadow maps, at most [`MAX_SHADOW_MAPS`]. Maps
    /// without a light this frame are packed disabled.
    pub fn gpu_data(&self) -> Vec<GpuShadowMap> {
        let definition = self.definition();
        self.slots()
            .iter()
            .zip(&definition.shadow_maps)
            .enumerate()
            .take(MAX_SHADOW_MAPS)
            .map(|(idx, (slot, map))| {
                let (width, height) = definition.map_size(idx);
                let light = self.shadow_map_light_indices().get(map.light).copied();
                GpuShadowMap {
                    view_projection: slot.camera.view_projection_matrix().to_cols_array_2d(),
                    depth_range: [slot.range.min, slot.range.max],
                    texel_size: [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32],
                    enabled: u32::from(light.is_some()),
                    light_index: light.map_or(u32::MAX, |l| l as u32),
                    _pad: [0; 2],
                }
            })
            .collect()
    }
}

/// Byte view of packed shadow maps for uniform upload
pub fn shadow_maps_as_bytes(maps: &[GpuShadowMap]) -> &[u8] {
    bytemuck::cast_slice(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::definition::{ShadowMapTexDef, ShadowNodeDef};
    use crate::texture::{PixelFormat, TextureManager};
    use umbra_scene::{LightType, SceneManager};

    #[test]
    fn test_gpu_shadow_map_size() {
        assert_eq!(std::mem::size_of::<GpuShadowMap>(), 96);
        assert_eq!(std::mem::size_of::<GpuShadowMap>() % 16, 0);
    }

    #[test]
    fn test_bytes() {
        let maps = [GpuShadowMap::default(); 3];
        assert_eq!(shadow_maps_as_bytes(&maps).len(), 3 * 96);
    }

    #[test]
    fn test_unlit_maps_disabled() {
        let mut def = ShadowNodeDef::new("node", 2);
        def.add_shadow_map(ShadowMapTexDef::new("near", 1024, 512, PixelFormat::R32Float));
        def.add_shadow_map(ShadowMapTexDef::new("far", 256, 256, PixelFormat::R32Float).with_light(1));

        let mut scene = SceneManager::new();
        scene.create_light("sun", LightType::Directional);
        scene.begin_frame();
        let viewer = scene.create_camera("viewer");

        let mut textures = TextureManager::new();
        let mut node = ShadowNode::new(0, Arc::new(def), &mut textures, &mut scene).unwrap();
        node.build_closest_light_list(&viewer, &mut scene);

        let data = node.gpu_data();
        assert_eq!(data.len(), 2);
        assert!(data[0].is_enabled());
        assert_eq!(data[0].light_index, 0);
        assert_eq!(data[0].texel_size, [1.0 / 1024.0, 1.0 / 512.0]);
        assert!(!data[1].is_enabled());
        assert_eq!(data[1].light_index, u32::MAX);
    }
}
