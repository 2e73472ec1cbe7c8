//! Shadow Node
//!
//! A compositor node rendering the shadow maps one viewer camera needs.
//!
//! Every update runs through the same stages:
//!
//! 1. Pick the closest shadow casting lights (memoized per camera and frame)
//!    and gather receiver and caster bounds.
//! 2. Place every shadow map's camera for the light of its rank.
//! 3. Render each scene pass from its shadow map's camera with the scene in
//!    the render-to-texture stage.
//!
//! Shadow maps whose rank has no light are skipped and read as blank.

use std::sync::Arc;

use umbra_scene::{
    Aabb, Camera, CameraId, IlluminationRenderStage, LightClosest, LightType, SceneManager,
    Viewport, ViewportId,
};

use crate::camera_setup::{DepthRange, ShadowSetupContext};
use crate::definition::{PassSceneDef, ShadowNodeDef};
use crate::error::{CompositorError, CompositorResult};
use crate::light_selection::LightVisibilityIndex;
use crate::receivers::merge_receivers_boxes;
use crate::slot::{create_slots, ShadowMapSlot};
use crate::texture::{RenderTarget, TextureFactory, TextureHandle};

mod projector;

/// Renders the scene for one scene pass of a shadow node
pub trait ScenePassRenderer {
    /// Render render queues `[pass.first_rq, pass.last_rq)` from `camera`
    /// into `target`
    fn render_scene(
        &mut self,
        scene: &mut SceneManager,
        camera: &Camera,
        target: RenderTarget,
        pass: &PassSceneDef,
    ) -> CompositorResult<()>;
}

/// Where a node is within [`ShadowNode::update`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NodeState {
    #[default]
    Idle,
    LightListBuilt,
    CamerasConfigured,
    Rendering,
}

/// A shadow node instance
#[derive(Debug)]
pub struct ShadowNode {
    id: u32,
    definition: Arc<ShadowNodeDef>,
    slots: Vec<ShadowMapSlot>,
    lights: LightVisibilityIndex,
    receiver_box: Aabb,
    casters_box: Aabb,
    /// Lights of the last projected renderable, affected ones first
    current_lights: Vec<LightClosest>,
    state: NodeState,
}

impl ShadowNode {
    /// Create the node's shadow maps and cameras and bind its scene passes.
    ///
    /// Fails if the definition is invalid, a technique has no camera setup,
    /// or the texture factory rejects a target.
    pub fn new(
        id: u32,
        definition: Arc<ShadowNodeDef>,
        factory: &mut dyn TextureFactory,
        scene: &mut SceneManager,
    ) -> CompositorResult<Self> {
        definition.validate()?;
        let slots = create_slots(id, &definition, factory, scene)?;

        let mut node = Self {
            id,
            definition,
            slots,
            lights: LightVisibilityIndex::new(),
            receiver_box: Aabb::NULL,
            casters_box: Aabb::NULL,
            current_lights: Vec::new(),
            state: NodeState::Idle,
        };

        // Passes drawing to the same map with the same rectangle share a
        // viewport
        let mut viewports: Vec<(usize, [f32; 4])> = Vec::new();
        let definition = Arc::clone(&node.definition);
        for pass in &definition.passes {
            let key = (pass.shadow_map_idx, pass.viewport_rect);
            let index = match viewports.iter().position(|v| *v == key) {
                Some(index) => index,
                None => {
                    viewports.push(key);
                    viewports.len() - 1
                }
            };
            let mut viewport = Viewport::new(ViewportId(index as u32));
            viewport.visibility_mask = pass.visibility_mask;
            node.post_initialize_pass_scene(pass, &viewport)?;
        }

        log::debug!(
            "Created shadow node '{}' (id {}) with {} shadow maps for up to {} lights",
            node.definition.name,
            id,
            node.slots.len(),
            node.definition.num_lights
        );
        Ok(node)
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn definition(&self) -> &Arc<ShadowNodeDef> {
        &self.definition
    }

    #[inline]
    pub fn state(&self) -> NodeState {
        self.state
    }

    #[inline]
    pub fn slots(&self) -> &[ShadowMapSlot] {
        &self.slots
    }

    /// Camera shadow map `idx` is rendered from
    pub fn shadow_map_camera(&self, idx: usize) -> Option<&Camera> {
        self.slots.get(idx).map(|slot| &slot.camera)
    }

    /// Global light indices of the shadow casting lights, closest first
    #[inline]
    pub fn shadow_map_light_indices(&self) -> &[usize] {
        self.lights.selected()
    }

    /// Per global light: whether it casts a shadow this frame
    #[inline]
    pub fn affected_lights(&self) -> &[bool] {
        self.lights.affected()
    }

    #[inline]
    pub fn receiver_box(&self) -> &Aabb {
        &self.receiver_box
    }

    #[inline]
    pub fn casters_box(&self) -> &Aabb {
        &self.casters_box
    }

    /// Texture a shader samples for shadow map `idx`. Atlas entries return
    /// their source's texture.
    pub fn shadow_map_texture(&self, idx: usize) -> Option<TextureHandle> {
        let channel = &self.slots.get(idx)?.channel;
        match channel.atlas_source {
            Some(source) => self.slots.get(source)?.channel.textures.first().copied(),
            None => channel.textures.first().copied(),
        }
    }

    /// Render target shadow map `idx` is drawn into
    pub fn shadow_map_target(&self, idx: usize) -> Option<RenderTarget> {
        let channel = &self.slots.get(idx)?.channel;
        match channel.atlas_source {
            Some(source) => self.slots.get(source)?.channel.target,
            None => channel.target,
        }
    }

    /// Split distances of shadow map `idx` for split-based setups
    pub fn split_points(&self, idx: usize, viewer: &Camera, scene: &SceneManager) -> Option<Vec<f32>> {
        self.slots.get(idx)?.setup.split_points(viewer, scene.config())
    }

    /// Update the shadow maps for `viewer` and render them
    pub fn update(
        &mut self,
        viewer: &Camera,
        scene: &mut SceneManager,
        renderer: &mut dyn ScenePassRenderer,
    ) -> CompositorResult<()> {
        self.build_closest_light_list(viewer, scene);
        self.state = NodeState::LightListBuilt;

        self.configure_cameras(viewer, scene);
        self.state = NodeState::CamerasConfigured;

        self.state = NodeState::Rendering;
        let result = self.render_passes(scene, renderer);
        self.state = NodeState::Idle;
        result
    }

    /// Select the shadow casting lights for `camera` unless already done
    /// this frame, then refresh the receiver and caster bounds
    pub fn build_closest_light_list(&mut self, camera: &Camera, scene: &mut SceneManager) {
        let frame = scene.frame_count();
        if self.lights.is_current(camera.id(), frame) {
            return;
        }

        self.receiver_box =
            merge_receivers_boxes(scene, camera, self.definition.min_rq, self.definition.max_rq);

        self.lights.build(
            camera,
            frame,
            scene.global_light_list(),
            scene.visibility_mask(),
            self.definition.num_lights,
        );

        self.casters_box = scene.calculate_current_casters_box(
            camera.viewport_visibility_mask(),
            self.definition.min_rq,
            self.definition.max_rq,
        );
    }

    fn configure_cameras(&mut self, viewer: &Camera, scene: &SceneManager) {
        let global_lights = scene.global_light_list();
        let scheme = viewer.viewport().map(|vp| vp.material_scheme.clone());

        for (idx, (map, slot)) in self.definition.shadow_maps.iter().zip(&mut self.slots).enumerate() {
            let Some(light) = self
                .lights
                .light_for_rank(map.light)
                .and_then(|global| global_lights.get(global))
            else {
                // Nth closest light doesn't exist, the map reads as blank
                log::trace!("Shadow map {} has no light of rank {}", idx, map.light);
                continue;
            };

            let camera = &mut slot.camera;
            if let (Some(scheme), Some(viewport)) = (&scheme, camera.viewport_mut()) {
                viewport.material_scheme.clone_from(scheme);
            }
            camera.set_lod_camera(Some(viewer.id()));

            if light.light_type != LightType::Point {
                camera.set_direction(light.direction);
            }
            if light.light_type != LightType::Directional {
                camera.set_position(light.position);
            }

            let ctx = ShadowSetupContext {
                scene: scene.config(),
                receiver_box: &self.receiver_box,
                casters_box: &self.casters_box,
                texture_size: self.definition.map_size(idx),
            };
            slot.range = slot.setup.shadow_camera(&ctx, viewer, light, camera, map.split);

            log::trace!(
                "Shadow map {} follows light '{}', depth range [{}, {}]",
                idx,
                light.name,
                slot.range.min,
                slot.range.max
            );
        }
    }

    fn render_passes(
        &self,
        scene: &mut SceneManager,
        renderer: &mut dyn ScenePassRenderer,
    ) -> CompositorResult<()> {
        let mut stage = scene.scoped_render_stage(IlluminationRenderStage::RenderToTexture);

        for pass in &self.definition.passes {
            let idx = pass.shadow_map_idx;
            let map = &self.definition.shadow_maps[idx];
            if self.lights.light_for_rank(map.light).is_none() {
                log::trace!("Skipping pass for shadow map {}: no light of rank {}", idx, map.light);
                continue;
            }

            let target = self.shadow_map_target(idx).ok_or_else(|| {
                CompositorError::ItemNotFound(format!("Render target of shadow map {}", idx))
            })?;
            log::trace!(
                "Rendering shadow map {} queues [{}, {})",
                idx,
                pass.first_rq,
                pass.last_rq
            );
            renderer.render_scene(&mut stage, &self.slots[idx].camera, target, pass)?;
        }
        Ok(())
    }

    /// Bind a scene pass to its shadow map's camera and return that camera.
    ///
    /// Passes drawing to the same shadow map must share their viewport.
    pub fn post_initialize_pass_scene(
        &mut self,
        pass: &PassSceneDef,
        viewport: &Viewport,
    ) -> CompositorResult<CameraId> {
        let slot = self.slots.get_mut(pass.shadow_map_idx).ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "Shadow map {} in node '{}'",
                pass.shadow_map_idx, self.definition.name
            ))
        })?;

        if let Some(current) = slot.camera.viewport() {
            if current.id != viewport.id {
                return Err(CompositorError::InvalidState(format!(
                    "Two scene passes to shadow map {} have different viewports",
                    pass.shadow_map_idx
                )));
            }
        }

        slot.camera.notify_viewport(viewport.clone());
        Ok(slot.camera.id())
    }

    /// Depth range of the shadow map rendered by `camera`, or the default
    /// range if no shadow map of this node uses it
    pub fn min_max_depth_range(&self, camera: CameraId) -> DepthRange {
        self.slots
            .iter()
            .find(|slot| slot.camera.id() == camera)
            .map_or_else(DepthRange::default, |slot| slot.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ShadowMapTexDef;
    use crate::texture::{PixelFormat, TextureManager};
    use glam::Vec3;

    fn node_def() -> Arc<ShadowNodeDef> {
        let mut def = ShadowNodeDef::new("ShadowNode", 2);
        def.add_shadow_map(ShadowMapTexDef::new("map0", 256, 256, PixelFormat::R32Float));
        def.add_shadow_map(ShadowMapTexDef::new("map1", 256, 256, PixelFormat::R32Float).with_light(1));
        Arc::new(def)
    }

    #[test]
    fn test_passes_bound_on_creation() {
        let mut scene = SceneManager::new();
        let mut textures = TextureManager::new();
        let node = ShadowNode::new(0, node_def(), &mut textures, &mut scene).unwrap();
        assert!(node.shadow_map_camera(0).unwrap().viewport().is_some());
        assert_eq!(node.state(), NodeState::Idle);
    }

    #[test]
    fn test_conflicting_viewports() {
        let mut scene = SceneManager::new();
        let mut textures = TextureManager::new();
        let mut node = ShadowNode::new(0, node_def(), &mut textures, &mut scene).unwrap();

        let pass = PassSceneDef::new(0);
        let err = node
            .post_initialize_pass_scene(&pass, &Viewport::new(ViewportId(42)))
            .unwrap_err();
        assert!(matches!(err, CompositorError::InvalidState(_)));

        let err = node
            .post_initialize_pass_scene(&PassSceneDef::new(9), &Viewport::new(ViewportId(0)))
            .unwrap_err();
        assert!(matches!(err, CompositorError::ItemNotFound(_)));
    }

    #[test]
    fn test_same_map_different_rect_fails() {
        let mut def = (*node_def()).clone();
        let mut pass = PassSceneDef::new(0);
        pass.viewport_rect = [0.0, 0.0, 0.5, 0.5];
        def.passes.push(pass);

        let mut scene = SceneManager::new();
        let mut textures = TextureManager::new();
        let err = ShadowNode::new(0, Arc::new(def), &mut textures, &mut scene).unwrap_err();
        assert!(matches!(err, CompositorError::InvalidState(_)));
    }

    #[test]
    fn test_unknown_camera_depth_range() {
        let mut scene = SceneManager::new();
        let mut textures = TextureManager::new();
        let node = ShadowNode::new(0, node_def(), &mut textures, &mut scene).unwrap();
        let stranger = scene.create_camera("stranger");
        assert_eq!(node.min_max_depth_range(stranger.id()), DepthRange::new(0.0, 100_000.0));
    }

    #[test]
    fn test_light_list_memoized() {
        let mut scene = SceneManager::new();
        let lamp = scene.create_light("lamp", LightType::Point);
        scene.light_mut(lamp).unwrap().position = Vec3::new(0.0, 0.0, -5.0);
        let mut textures = TextureManager::new();
        let mut node = ShadowNode::new(0, node_def(), &mut textures, &mut scene).unwrap();
        let mut viewer = scene.create_camera("viewer");
        viewer.notify_viewport(Viewport::new(ViewportId(0)));

        scene.begin_frame();
        node.build_closest_light_list(&viewer, &mut scene);
        node.build_closest_light_list(&viewer, &mut scene);
        assert_eq!(scene.stats().caster_box_queries, 1);
        assert_eq!(node.shadow_map_light_indices(), &[0]);

        scene.begin_frame();
        node.build_closest_light_list(&viewer, &mut scene);
        assert_eq!(scene.stats().caster_box_queries, 1);
        assert_eq!(scene.frame_count(), 2);
    }
}
