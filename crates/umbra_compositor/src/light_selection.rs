//! Shadow casting light selection
//!
//! Picks, per camera and frame, the N lights closest to the camera that are
//! allowed to cast shadows. Rank 0 is the closest light; shadow maps bind to
//! lights by rank.

use umbra_scene::{Camera, CameraId, GlobalLightList, LightType, LAYER_SHADOW_CASTER};

/// Distances closer than this are considered equal
const DISTANCE_EPSILON: f32 = 1e-6;

/// Closest shadow casting lights for the last (camera, frame) pair
#[derive(Clone, Debug, Default)]
pub struct LightVisibilityIndex {
    last_camera: Option<CameraId>,
    last_frame: Option<u64>,
    /// Global light indices ordered by rank
    selected: Vec<usize>,
    /// One flag per global light, set for selected lights
    affected: Vec<bool>,
}

impl LightVisibilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the selection was already built for this camera and frame
    #[inline]
    pub fn is_current(&self, camera: CameraId, frame: u64) -> bool {
        self.last_camera == Some(camera) && self.last_frame == Some(frame)
    }

    /// Forget the memoized selection
    pub fn invalidate(&mut self) {
        self.last_camera = None;
        self.last_frame = None;
    }

    /// Select up to `max_lights` shadow casting lights closest to `camera`.
    ///
    /// `scene_mask` is combined with the camera's viewport mask; a light is
    /// a candidate only if its mask intersects both that and the shadow
    /// caster layer. Returns `false` without touching the selection when it
    /// is already current.
    pub fn build(
        &mut self,
        camera: &Camera,
        frame: u64,
        lights: &GlobalLightList,
        scene_mask: u32,
        max_lights: usize,
    ) -> bool {
        if self.is_current(camera.id(), frame) {
            return false;
        }
        self.last_camera = Some(camera.id());
        self.last_frame = Some(frame);

        let combined_mask = camera.viewport_visibility_mask() & scene_mask;
        let num_lights = max_lights.min(lights.len());
        let camera_pos = camera.position();

        self.selected.clear();
        self.selected.reserve(num_lights);
        self.affected.clear();
        self.affected.resize(lights.len(), false);

        // O(N*M), M (the number of shadow maps) is tiny in practice
        let mut previous = f32::NEG_INFINITY;
        for _ in 0..num_lights {
            let mut best: Option<(usize, f32)> = None;

            for (j, &mask) in lights.visibility_masks.iter().enumerate() {
                if self.affected[j]
                    || mask & combined_mask == 0
                    || mask & LAYER_SHADOW_CASTER == 0
                {
                    continue;
                }

                // Directional lights have an infinite sphere; computing the
                // distance from it would give NaN
                let distance = match lights.lights[j].light_type {
                    LightType::Directional => f32::NEG_INFINITY,
                    LightType::Point | LightType::Spot => {
                        let sphere = &lights.bounding_spheres[j];
                        camera_pos.distance(sphere.center) - sphere.radius
                    }
                };

                if distance < previous {
                    continue;
                }
                // Equally distant lights keep the first one seen
                let closer = match best {
                    None => true,
                    Some((_, best_distance)) => distance < best_distance - DISTANCE_EPSILON,
                };
                if closer {
                    best = Some((j, distance));
                }
            }

            let Some((idx, distance)) = best else {
                break;
            };
            self.affected[idx] = true;
            self.selected.push(idx);
            previous = distance;
        }

        log::debug!(
            "Selected {} of {} lights as shadow casters for camera '{}': {:?}",
            self.selected.len(),
            lights.len(),
            camera.name(),
            self.selected
        );
        true
    }

    /// Global light indices, closest first
    #[inline]
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    /// Global index of the light with the given rank
    #[inline]
    pub fn light_for_rank(&self, rank: usize) -> Option<usize> {
        self.selected.get(rank).copied()
    }

    /// Per global light: whether it renders a shadow map
    #[inline]
    pub fn affected(&self) -> &[bool] {
        &self.affected
    }

    #[inline]
    pub fn is_affected(&self, global_index: usize) -> bool {
        self.affected.get(global_index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use umbra_scene::{SceneManager, Viewport, ViewportId};

    fn scene_with_points(positions: &[Vec3]) -> SceneManager {
        let mut scene = SceneManager::new();
        for (i, pos) in positions.iter().enumerate() {
            let id = scene.create_light(format!("point{}", i), LightType::Point);
            let light = scene.light_mut(id).unwrap();
            light.position = *pos;
            light.range = 1.0;
        }
        scene.begin_frame();
        scene
    }

    fn viewer(scene: &mut SceneManager) -> Camera {
        let mut camera = scene.create_camera("viewer");
        camera.notify_viewport(Viewport::new(ViewportId(0)));
        camera
    }

    #[test]
    fn test_selects_closest_in_order() {
        let mut scene = scene_with_points(&[
            Vec3::new(0.0, 0.0, -30.0),
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::new(0.0, 0.0, -20.0),
        ]);
        let camera = viewer(&mut scene);

        let mut index = LightVisibilityIndex::new();
        assert!(index.build(&camera, 1, scene.global_light_list(), u32::MAX, 2));
        assert_eq!(index.selected(), &[1, 2]);
        assert_eq!(index.affected(), &[false, true, true]);
    }

    #[test]
    fn test_memoized_per_camera_and_frame() {
        let mut scene = scene_with_points(&[Vec3::new(0.0, 0.0, -10.0)]);
        let camera = viewer(&mut scene);
        let other = viewer(&mut scene);

        let mut index = LightVisibilityIndex::new();
        assert!(index.build(&camera, 1, scene.global_light_list(), u32::MAX, 1));
        let first = index.selected().to_vec();
        assert!(!index.build(&camera, 1, scene.global_light_list(), u32::MAX, 1));
        assert_eq!(index.selected(), first.as_slice());

        assert!(index.build(&camera, 2, scene.global_light_list(), u32::MAX, 1));
        assert!(index.build(&other, 2, scene.global_light_list(), u32::MAX, 1));
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let mut scene = scene_with_points(&[
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
        ]);
        let camera = viewer(&mut scene);

        let mut index = LightVisibilityIndex::new();
        index.build(&camera, 1, scene.global_light_list(), u32::MAX, 3);
        assert_eq!(index.selected(), &[0, 1, 2]);
    }

    #[test]
    fn test_directional_wins_rank_zero() {
        let mut scene = SceneManager::new();
        let lamp = scene.create_light("lamp", LightType::Point);
        scene.light_mut(lamp).unwrap().position = Vec3::new(0.0, 0.0, -1.0);
        scene.create_light("sun", LightType::Directional);
        scene.begin_frame();
        let camera = viewer(&mut scene);

        let mut index = LightVisibilityIndex::new();
        index.build(&camera, 1, scene.global_light_list(), u32::MAX, 2);
        assert_eq!(index.selected(), &[1, 0]);
    }

    #[test]
    fn test_masks_filter_candidates() {
        let mut scene = SceneManager::new();
        let a = scene.create_light("no_shadows", LightType::Point);
        scene.light_mut(a).unwrap().cast_shadows = false;
        let b = scene.create_light("other_layer", LightType::Point);
        scene.light_mut(b).unwrap().set_visibility_flags(0x2);
        let c = scene.create_light("visible", LightType::Point);
        scene.light_mut(c).unwrap().position = Vec3::new(0.0, 0.0, -100.0);
        scene.begin_frame();

        let mut camera = viewer(&mut scene);
        camera.viewport_mut().unwrap().visibility_mask = 0x1;

        let mut index = LightVisibilityIndex::new();
        index.build(&camera, 1, scene.global_light_list(), u32::MAX, 3);
        assert_eq!(index.selected(), &[2]);
        assert!(!index.is_affected(0));
        assert!(index.is_affected(2));
    }

    #[test]
    fn test_count_bounded_by_lights() {
        let mut scene = scene_with_points(&[Vec3::ZERO, Vec3::X]);
        let camera = viewer(&mut scene);
        let mut index = LightVisibilityIndex::new();
        index.build(&camera, 1, scene.global_light_list(), u32::MAX, 8);
        assert_eq!(index.selected().len(), 2);
        assert_eq!(index.light_for_rank(2), None);
    }
}
