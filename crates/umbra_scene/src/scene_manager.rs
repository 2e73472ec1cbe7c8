//! Scene manager
//!
//! Owns the lights and shadow-relevant scene objects, builds the global
//! light list once per frame, and answers the receiver/caster bounds queries
//! the shadow pipeline issues. The illumination render stage is only ever
//! changed through [`RenderStageScope`], which restores the previous stage
//! when dropped.

use alloc::collections::BTreeMap;
use core::ops::{Deref, DerefMut, Range};

use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::camera::{Camera, CameraId};
use crate::error::{SceneError, SceneResult};
use crate::light::{GlobalLightList, Light, LightId, LightType, LAYER_SHADOW_CASTER};

/// Scene-wide settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Number of render queues objects can be sorted into
    pub render_queue_count: usize,
    /// Scene visibility mask, combined with each viewport's mask
    pub visibility_mask: u32,
    /// Maximum distance from the viewer at which shadows are rendered
    pub shadow_far_distance: f32,
    /// How far back directional shadow cameras are pulled along the light
    pub shadow_dir_light_extrusion_distance: f32,
    /// Fraction of the shadow far distance the directional shadow
    /// frustum is moved ahead of the viewer
    pub shadow_dir_light_texture_offset: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            render_queue_count: 8,
            visibility_mask: u32::MAX,
            shadow_far_distance: 200.0,
            shadow_dir_light_extrusion_distance: 10000.0,
            shadow_dir_light_texture_offset: 0.6,
        }
    }
}

/// What the scene is currently being rendered for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IlluminationRenderStage {
    #[default]
    None,
    /// Rendering shadow casters into shadow maps
    RenderToTexture,
}

/// Identifier of a scene object
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub usize);

/// A bounded object taking part in shadow casting and/or receiving
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    /// World space bounds
    pub bounds: Aabb,
    pub render_queue: usize,
    pub visibility_flags: u32,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, bounds: Aabb, render_queue: usize) -> Self {
        Self {
            name: name.into(),
            bounds,
            render_queue,
            visibility_flags: u32::MAX & !LAYER_SHADOW_CASTER,
            cast_shadows: true,
            receive_shadows: true,
        }
    }
}

/// Bookkeeping for the current frame
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    /// Render queue ranges culled for shadow receivers on demand
    pub receiver_culls: Vec<Range<usize>>,
    /// Number of casters box queries
    pub caster_box_queries: u32,
}

/// The scene manager
#[derive(Debug)]
pub struct SceneManager {
    config: SceneConfig,
    lights: Vec<Light>,
    global_lights: GlobalLightList,
    objects: Vec<SceneObject>,
    receivers: BTreeMap<CameraId, Vec<Aabb>>,
    frame: u64,
    render_stage: IlluminationRenderStage,
    next_camera_id: u64,
    next_light_id: u64,
    stats: FrameStats,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            config,
            lights: Vec::new(),
            global_lights: GlobalLightList::new(),
            objects: Vec::new(),
            receivers: BTreeMap::new(),
            frame: 0,
            render_stage: IlluminationRenderStage::None,
            next_camera_id: 0,
            next_light_id: 0,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SceneConfig {
        &mut self.config
    }

    /// Start a new frame: advance the frame counter, rebuild the global
    /// light list and drop last frame's receiver boxes.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.receivers.clear();
        self.stats = FrameStats::default();
        self.rebuild_global_light_list();
        log::trace!(
            "Scene frame {} with {} visible lights",
            self.frame,
            self.global_lights.len()
        );
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    #[inline]
    pub fn visibility_mask(&self) -> u32 {
        self.config.visibility_mask
    }

    // ------------------------------------------------------------------
    // Cameras
    // ------------------------------------------------------------------

    /// Create a camera with a unique id
    pub fn create_camera(&mut self, name: impl Into<String>) -> Camera {
        let id = CameraId(self.next_camera_id);
        self.next_camera_id += 1;
        Camera::new(id, name)
    }

    // ------------------------------------------------------------------
    // Lights
    // ------------------------------------------------------------------

    pub fn create_light(&mut self, name: impl Into<String>, light_type: LightType) -> LightId {
        let id = LightId(self.next_light_id);
        self.next_light_id += 1;
        self.lights.push(Light::new(id, name, light_type));
        id
    }

    pub fn light(&self, id: LightId) -> SceneResult<&Light> {
        self.lights
            .iter()
            .find(|l| l.id() == id)
            .ok_or(SceneError::LightNotFound(id))
    }

    pub fn light_mut(&mut self, id: LightId) -> SceneResult<&mut Light> {
        self.lights
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(SceneError::LightNotFound(id))
    }

    pub fn destroy_light(&mut self, id: LightId) -> SceneResult<()> {
        let index = self
            .lights
            .iter()
            .position(|l| l.id() == id)
            .ok_or(SceneError::LightNotFound(id))?;
        self.lights.remove(index);
        Ok(())
    }

    /// Rebuild the global light list from the visible lights
    pub fn rebuild_global_light_list(&mut self) {
        self.global_lights.clear();
        for light in self.lights.iter().filter(|l| l.visible) {
            self.global_lights.push(light);
        }
    }

    #[inline]
    pub fn global_light_list(&self) -> &GlobalLightList {
        &self.global_lights
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn add_object(&mut self, object: SceneObject) -> SceneResult<ObjectId> {
        if object.render_queue >= self.config.render_queue_count {
            return Err(SceneError::InvalidRenderQueue {
                queue: object.render_queue,
                count: self.config.render_queue_count,
            });
        }
        self.objects.push(object);
        Ok(ObjectId(self.objects.len() - 1))
    }

    pub fn object(&self, id: ObjectId) -> SceneResult<&SceneObject> {
        self.objects.get(id.0).ok_or(SceneError::ObjectNotFound(id.0))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> SceneResult<&mut SceneObject> {
        self.objects.get_mut(id.0).ok_or(SceneError::ObjectNotFound(id.0))
    }

    // ------------------------------------------------------------------
    // Shadow receivers and casters
    // ------------------------------------------------------------------

    #[inline]
    pub fn render_queue_count(&self) -> usize {
        self.config.render_queue_count
    }

    /// Receiver bounds per render queue as culled for `camera` this frame.
    /// Empty if nothing was culled for that camera yet.
    pub fn receivers_boxes_per_rq(&self, camera: CameraId) -> &[Aabb] {
        self.receivers.get(&camera).map_or(&[], Vec::as_slice)
    }

    /// Cull shadow receivers visible from `camera` for queues `[first, last)`
    /// and store their bounds per queue.
    pub fn cull_receivers_box(&mut self, camera: &Camera, first: usize, last: usize) {
        self.stats.receiver_culls.push(first..last);
        self.cull_receivers(camera, first, last);
    }

    /// Regular scene pass culling: computes the receiver boxes as a side
    /// effect and marks the queues as rendered for the camera.
    pub fn cull_frustum(&mut self, camera: &mut Camera, rqs: Range<usize>) {
        self.cull_receivers(camera, rqs.start, rqs.end);
        camera.mark_rendered_rqs(rqs);
    }

    fn cull_receivers(&mut self, camera: &Camera, first: usize, last: usize) {
        let count = self.config.render_queue_count;
        let last = last.min(count);
        if first >= last {
            return;
        }

        let frustum = camera.frustum();
        let mask = camera.viewport_visibility_mask() & self.config.visibility_mask;

        let boxes = self
            .receivers
            .entry(camera.id())
            .or_insert_with(|| vec![Aabb::NULL; count]);

        for rq_box in &mut boxes[first..last] {
            rq_box.set_null();
        }

        for object in &self.objects {
            if !object.receive_shadows
                || object.render_queue < first
                || object.render_queue >= last
                || object.visibility_flags & mask == 0
            {
                continue;
            }
            if frustum.is_aabb_visible(&object.bounds) {
                boxes[object.render_queue].merge(&object.bounds);
            }
        }
    }

    /// Bounds of every shadow caster in queues `[min_rq, max_rq)` whose
    /// flags intersect `visibility_mask`.
    pub fn calculate_current_casters_box(
        &mut self,
        visibility_mask: u32,
        min_rq: usize,
        max_rq: usize,
    ) -> Aabb {
        self.stats.caster_box_queries += 1;
        let mask = visibility_mask & self.config.visibility_mask;
        let mut casters = Aabb::NULL;
        for object in &self.objects {
            if object.cast_shadows
                && object.render_queue >= min_rq
                && object.render_queue < max_rq
                && object.visibility_flags & mask != 0
            {
                casters.merge(&object.bounds);
            }
        }
        casters
    }

    // ------------------------------------------------------------------
    // Render stage
    // ------------------------------------------------------------------

    #[inline]
    pub fn current_render_stage(&self) -> IlluminationRenderStage {
        self.render_stage
    }

    /// Switch the render stage until the returned scope is dropped
    pub fn scoped_render_stage(&mut self, stage: IlluminationRenderStage) -> RenderStageScope<'_> {
        let previous = self.render_stage;
        self.render_stage = stage;
        RenderStageScope { scene: self, previous }
    }
}

impl Default for SceneManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the previous illumination render stage on drop, including when
/// a sub-render bails out early with an error.
#[derive(Debug)]
pub struct RenderStageScope<'a> {
    scene: &'a mut SceneManager,
    previous: IlluminationRenderStage,
}

impl RenderStageScope<'_> {
    /// Stage that will be restored
    pub fn previous(&self) -> IlluminationRenderStage {
        self.previous
    }
}

impl Deref for RenderStageScope<'_> {
    type Target = SceneManager;

    fn deref(&self) -> &SceneManager {
        self.scene
    }
}

impl DerefMut for RenderStageScope<'_> {
    fn deref_mut(&mut self) -> &mut SceneManager {
        self.scene
    }
}

impl Drop for RenderStageScope<'_> {
    fn drop(&mut self) {
        self.scene.render_stage = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Viewport;
    use crate::camera::ViewportId;
    use glam::Vec3;

    fn unit_box_at(z: f32) -> Aabb {
        Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, z), Vec3::ONE)
    }

    #[test]
    fn test_render_stage_scope_restores() {
        let mut scene = SceneManager::new();
        {
            let scope = scene.scoped_render_stage(IlluminationRenderStage::RenderToTexture);
            assert_eq!(scope.current_render_stage(), IlluminationRenderStage::RenderToTexture);
            assert_eq!(scope.previous(), IlluminationRenderStage::None);
        }
        assert_eq!(scene.current_render_stage(), IlluminationRenderStage::None);
    }

    #[test]
    fn test_render_stage_restored_on_error_path() {
        fn failing(scene: &mut SceneManager) -> Result<(), &'static str> {
            let _scope = scene.scoped_render_stage(IlluminationRenderStage::RenderToTexture);
            Err("sub-render failed")
        }

        let mut scene = SceneManager::new();
        assert!(failing(&mut scene).is_err());
        assert_eq!(scene.current_render_stage(), IlluminationRenderStage::None);
    }

    #[test]
    fn test_global_light_list_skips_invisible() {
        let mut scene = SceneManager::new();
        let a = scene.create_light("a", LightType::Point);
        let b = scene.create_light("b", LightType::Point);
        scene.light_mut(a).unwrap().visible = false;
        scene.begin_frame();

        let list = scene.global_light_list();
        assert_eq!(list.len(), 1);
        assert_eq!(list.lights[0].id(), b);
        assert_eq!(list.lights[0].global_index(), 0);
    }

    #[test]
    fn test_invalid_render_queue() {
        let mut scene = SceneManager::new();
        let err = scene
            .add_object(SceneObject::new("x", unit_box_at(0.0), 99))
            .unwrap_err();
        assert_eq!(err, SceneError::InvalidRenderQueue { queue: 99, count: 8 });
    }

    #[test]
    fn test_cull_receivers_box_per_queue() {
        let mut scene = SceneManager::new();
        scene.add_object(SceneObject::new("near", unit_box_at(-10.0), 1)).unwrap();
        scene.add_object(SceneObject::new("far", unit_box_at(-20.0), 2)).unwrap();
        scene.add_object(SceneObject::new("behind", unit_box_at(10.0), 1)).unwrap();
        let mut no_receive = SceneObject::new("sky", unit_box_at(-30.0), 2);
        no_receive.receive_shadows = false;
        scene.add_object(no_receive).unwrap();

        let mut camera = scene.create_camera("viewer");
        camera.notify_viewport(Viewport::new(ViewportId(0)));
        scene.begin_frame();
        scene.cull_receivers_box(&camera, 0, 3);

        let boxes = scene.receivers_boxes_per_rq(camera.id());
        assert_eq!(boxes.len(), 8);
        assert!(boxes[0].is_null());
        assert_eq!(boxes[1], unit_box_at(-10.0));
        assert_eq!(boxes[2], unit_box_at(-20.0));
        assert_eq!(scene.stats().receiver_culls, vec![0..3]);
    }

    #[test]
    fn test_casters_box() {
        let mut scene = SceneManager::new();
        scene.add_object(SceneObject::new("a", unit_box_at(0.0), 0)).unwrap();
        scene.add_object(SceneObject::new("b", unit_box_at(5.0), 4)).unwrap();
        let mut not_caster = SceneObject::new("c", unit_box_at(50.0), 0);
        not_caster.cast_shadows = false;
        scene.add_object(not_caster).unwrap();

        let casters = scene.calculate_current_casters_box(u32::MAX, 0, 4);
        assert_eq!(casters, unit_box_at(0.0));

        let all = scene.calculate_current_casters_box(u32::MAX, 0, 8);
        assert_eq!(all.max.z, 6.0);
    }

    #[test]
    fn test_cull_frustum_inverted_range() {
        let mut scene = SceneManager::new();
        let mut camera = scene.create_camera("viewer");
        #[allow(clippy::reversed_empty_ranges)]
        scene.cull_frustum(&mut camera, 5..3);
        assert!(!camera.is_rendered_rq(3));
        assert!(!camera.is_rendered_rq(4));
        assert!(scene.receivers_boxes_per_rq(camera.id()).is_empty());
    }

    #[test]
    fn test_config_json_defaults() {
        let config: SceneConfig =
            serde_json::from_str(r#"{ "render_queue_count": 4, "shadow_far_distance": 50.0 }"#).unwrap();
        assert_eq!(config.render_queue_count, 4);
        assert_eq!(config.shadow_far_distance, 50.0);
        assert_eq!(config.visibility_mask, u32::MAX);
        assert_eq!(config.shadow_dir_light_texture_offset, 0.6);
    }

    #[test]
    fn test_scene_object_json() {
        let mut object = SceneObject::new("crate", unit_box_at(-3.0), 2);
        object.receive_shadows = false;

        let json = serde_json::to_string(&object).unwrap();
        let back: SceneObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "crate");
        assert_eq!(back.bounds, object.bounds);
        assert_eq!(back.render_queue, 2);
        assert_eq!(back.visibility_flags, object.visibility_flags);
        assert!(back.cast_shadows);
        assert!(!back.receive_shadows);
    }
}
