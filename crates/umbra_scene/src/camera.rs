//! Cameras and viewports
//!
//! Cameras are plain values identified by a [`CameraId`] handed out by the
//! scene manager. Shadow nodes own their shadow-map cameras; viewer cameras
//! are owned by the application.

use core::ops::Range;

use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::frustum::Frustum;

/// Unique identifier for a camera
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CameraId(pub u64);

/// Identifier of a viewport
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewportId(pub u32);

/// A render target region a camera renders into
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub id: ViewportId,
    /// Objects are only rendered if their flags intersect this mask
    pub visibility_mask: u32,
    /// Material scheme used to pick techniques
    pub material_scheme: String,
}

impl Viewport {
    pub fn new(id: ViewportId) -> Self {
        Self {
            id,
            visibility_mask: u32::MAX,
            material_scheme: "Default".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

/// A camera
#[derive(Clone, Debug)]
pub struct Camera {
    id: CameraId,
    name: String,
    position: Vec3,
    orientation: Quat,
    projection: ProjectionType,
    fov_y: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,
    ortho_window: Vec2,
    custom_view: Option<Mat4>,
    custom_projection: Option<Mat4>,
    viewport: Option<Viewport>,
    lod_camera: Option<CameraId>,
    /// Render queues already rendered by this camera this frame
    rendered_rqs: Vec<bool>,
}

impl Camera {
    pub(crate) fn new(id: CameraId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            projection: ProjectionType::Perspective,
            fov_y: 45.0f32.to_radians(),
            aspect_ratio: 1.0,
            near: 0.1,
            far: 1000.0,
            ortho_window: Vec2::new(100.0, 100.0),
            custom_view: None,
            custom_projection: None,
            viewport: None,
            lod_camera: None,
            rendered_rqs: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> CameraId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[inline]
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation.normalize();
    }

    /// Forward vector (-Z in camera space)
    pub fn direction(&self) -> Vec3 {
        self.orientation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    /// Point the camera along `direction`, keeping world Y as the yaw axis
    pub fn set_direction(&mut self, direction: Vec3) {
        if direction.length_squared() < 1e-12 {
            return;
        }
        let z = -direction.normalize();
        let mut x = Vec3::Y.cross(z);
        if x.length_squared() < 1e-8 {
            // Looking straight up or down; any horizontal right vector will do
            x = Vec3::X;
        }
        let x = x.normalize();
        let y = z.cross(x);
        self.orientation = Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize();
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.set_direction(target - self.position);
    }

    #[inline]
    pub fn projection_type(&self) -> ProjectionType {
        self.projection
    }

    pub fn set_projection_type(&mut self, projection: ProjectionType) {
        self.projection = projection;
    }

    #[inline]
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn set_fov_y(&mut self, radians: f32) {
        self.fov_y = radians;
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect_ratio = aspect;
    }

    #[inline]
    pub fn near_clip_distance(&self) -> f32 {
        self.near
    }

    pub fn set_near_clip_distance(&mut self, near: f32) {
        self.near = near;
    }

    #[inline]
    pub fn far_clip_distance(&self) -> f32 {
        self.far
    }

    pub fn set_far_clip_distance(&mut self, far: f32) {
        self.far = far;
    }

    #[inline]
    pub fn ortho_window(&self) -> Vec2 {
        self.ortho_window
    }

    pub fn set_ortho_window(&mut self, width: f32, height: f32) {
        self.ortho_window = Vec2::new(width, height);
    }

    /// Override the derived view matrix. `None` restores the derived one.
    pub fn set_custom_view_matrix(&mut self, view: Option<Mat4>) {
        self.custom_view = view;
    }

    /// Override the derived projection matrix. `None` restores it.
    pub fn set_custom_projection_matrix(&mut self, projection: Option<Mat4>) {
        self.custom_projection = projection;
    }

    pub fn has_custom_matrices(&self) -> bool {
        self.custom_view.is_some() || self.custom_projection.is_some()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.custom_view.unwrap_or_else(|| {
            Mat4::from_rotation_translation(self.orientation, self.position).inverse()
        })
    }

    pub fn projection_matrix(&self) -> Mat4 {
        if let Some(projection) = self.custom_projection {
            return projection;
        }
        match self.projection {
            ProjectionType::Perspective => {
                Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.near, self.far)
            }
            ProjectionType::Orthographic => {
                let half = self.ortho_window * 0.5;
                Mat4::orthographic_rh(-half.x, half.x, -half.y, half.y, self.near, self.far)
            }
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection_matrix())
    }

    /// World space corners of the sub-frustum between `near` and `far`
    /// (view distances). Near corners first.
    ///
    /// Cameras with custom matrices return the corners of their full clip
    /// volume, ignoring the distances.
    pub fn world_frustum_corners(&self, near: f32, far: f32) -> [Vec3; 8] {
        if self.has_custom_matrices() {
            let inv = self.view_projection_matrix().inverse();
            let mut corners = [Vec3::ZERO; 8];
            let mut i = 0;
            for z in [0.0, 1.0] {
                for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
                    corners[i] = inv.project_point3(Vec3::new(x, y, z));
                    i += 1;
                }
            }
            return corners;
        }

        let half_extents = |distance: f32| -> Vec2 {
            match self.projection {
                ProjectionType::Perspective => {
                    let h = distance * (self.fov_y * 0.5).tan();
                    Vec2::new(h * self.aspect_ratio, h)
                }
                ProjectionType::Orthographic => self.ortho_window * 0.5,
            }
        };

        let world = Mat4::from_rotation_translation(self.orientation, self.position);
        let mut corners = [Vec3::ZERO; 8];
        let mut i = 0;
        for distance in [near, far] {
            let half = half_extents(distance);
            for (sx, sy) in [(-1.0, -1.0), (1.0, -1.0), (-1.0, 1.0), (1.0, 1.0)] {
                let local = Vec3::new(sx * half.x, sy * half.y, -distance);
                corners[i] = world.transform_point3(local);
                i += 1;
            }
        }
        corners
    }

    #[inline]
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    pub fn viewport_mut(&mut self) -> Option<&mut Viewport> {
        self.viewport.as_mut()
    }

    /// Attach the camera to a viewport
    pub fn notify_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    /// Visibility mask of the attached viewport, all bits if there is none
    pub fn viewport_visibility_mask(&self) -> u32 {
        self.viewport.as_ref().map_or(u32::MAX, |vp| vp.visibility_mask)
    }

    #[inline]
    pub fn lod_camera(&self) -> Option<CameraId> {
        self.lod_camera
    }

    pub fn set_lod_camera(&mut self, camera: Option<CameraId>) {
        self.lod_camera = camera;
    }

    /// Whether a scene pass already rendered (and culled) render queue `rq`
    pub fn is_rendered_rq(&self, rq: usize) -> bool {
        self.rendered_rqs.get(rq).copied().unwrap_or(false)
    }

    pub fn mark_rendered_rqs(&mut self, rqs: Range<usize>) {
        if rqs.start >= rqs.end {
            return;
        }
        if self.rendered_rqs.len() < rqs.end {
            self.rendered_rqs.resize(rqs.end, false);
        }
        for flag in &mut self.rendered_rqs[rqs] {
            *flag = true;
        }
    }

    /// Forget which queues were rendered, called when a new frame starts
    pub fn clear_rendered_rqs(&mut self) {
        self.rendered_rqs.clear();
    }
}
