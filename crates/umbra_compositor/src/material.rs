//! Pass and texture unit model
//!
//! The slice of the material system the shadow pipeline writes into: texture
//! units get shadow textures bound, and the auto parameter source receives
//! the texture projector for every shadow slot.

use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};
use umbra_scene::{Camera, CameraId};

use crate::texture::TextureHandle;

/// What a texture unit samples
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// A regular texture
    #[default]
    Named,
    /// The n-th shadow map of the active shadow node
    Shadow,
    /// A texture produced by a compositor node, looked up by name
    Compositor { name: String, mrt_index: usize },
}

impl ContentType {
    fn kind(&self) -> ContentKind {
        match self {
            Self::Named => ContentKind::Named,
            Self::Shadow => ContentKind::Shadow,
            Self::Compositor { .. } => ContentKind::Compositor,
        }
    }
}

/// [`ContentType`] without its payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Named,
    Shadow,
    Compositor,
}

/// A camera projecting a texture, as shaders see it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureProjector {
    pub camera: CameraId,
    pub view_projection: Mat4,
}

impl TextureProjector {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            camera: camera.id(),
            view_projection: camera.view_projection_matrix(),
        }
    }
}

/// A texture unit of a pass
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextureUnitState {
    pub name: String,
    pub content_type: ContentType,
    texture: Option<TextureHandle>,
    projective: Option<TextureProjector>,
}

impl TextureUnitState {
    pub fn new(name: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            name: name.into(),
            content_type,
            texture: None,
            projective: None,
        }
    }

    #[inline]
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn set_texture(&mut self, texture: TextureHandle) {
        self.texture = Some(texture);
    }

    /// Enable projective texturing from `projector`, `None` disables it
    pub fn set_projective_texturing(&mut self, projector: Option<TextureProjector>) {
        self.projective = projector;
    }

    #[inline]
    pub fn projective_texturing(&self) -> Option<&TextureProjector> {
        self.projective.as_ref()
    }
}

/// Shader stages a pass can have a program for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramStage {
    Vertex,
    Geometry,
    Hull,
    Domain,
    Fragment,
}

impl ProgramStage {
    pub const ALL: [ProgramStage; 5] = [
        Self::Vertex,
        Self::Geometry,
        Self::Hull,
        Self::Domain,
        Self::Fragment,
    ];
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FogMode {
    #[default]
    None,
    Exp,
    Exp2,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fog {
    pub mode: FogMode,
    pub colour: Vec4,
    pub density: f32,
    pub start: f32,
    pub end: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            mode: FogMode::None,
            colour: Vec4::ONE,
            density: 0.001,
            start: 0.0,
            end: 1.0,
        }
    }
}

/// A rendering pass
#[derive(Clone, Debug, Default)]
pub struct Pass {
    pub name: String,
    pub vertex_program: Option<String>,
    pub geometry_program: Option<String>,
    pub hull_program: Option<String>,
    pub domain_program: Option<String>,
    pub fragment_program: Option<String>,
    /// Lights the pass shades at once
    pub max_simultaneous_lights: usize,
    pub colour_write: bool,
    /// Pass-specific fog instead of the scene's
    pub fog_override: Option<Fog>,
    texture_units: Vec<TextureUnitState>,
}

impl Pass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_simultaneous_lights: 8,
            colour_write: true,
            ..Default::default()
        }
    }

    pub fn with_programs(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.vertex_program = Some(vertex.into());
        self.fragment_program = Some(fragment.into());
        self
    }

    pub fn program(&self, stage: ProgramStage) -> Option<&str> {
        match stage {
            ProgramStage::Vertex => self.vertex_program.as_deref(),
            ProgramStage::Geometry => self.geometry_program.as_deref(),
            ProgramStage::Hull => self.hull_program.as_deref(),
            ProgramStage::Domain => self.domain_program.as_deref(),
            ProgramStage::Fragment => self.fragment_program.as_deref(),
        }
    }

    /// Whether any stage has a program
    pub fn is_programmable(&self) -> bool {
        ProgramStage::ALL.iter().any(|stage| self.program(*stage).is_some())
    }

    pub fn add_texture_unit(&mut self, unit: TextureUnitState) -> usize {
        self.texture_units.push(unit);
        self.texture_units.len() - 1
    }

    #[inline]
    pub fn texture_units(&self) -> &[TextureUnitState] {
        &self.texture_units
    }

    pub fn texture_unit(&self, index: usize) -> Option<&TextureUnitState> {
        self.texture_units.get(index)
    }

    pub fn texture_unit_mut(&mut self, index: usize) -> Option<&mut TextureUnitState> {
        self.texture_units.get_mut(index)
    }

    #[inline]
    pub fn num_texture_units(&self) -> usize {
        self.texture_units.len()
    }

    /// Number of texture units sampling shadow maps
    pub fn num_shadow_content_textures(&self) -> usize {
        self.texture_units
            .iter()
            .filter(|unit| unit.content_type == ContentType::Shadow)
            .count()
    }

    /// Index of the `nth` texture unit with the given content kind
    pub fn texture_unit_with_content_type(&self, kind: ContentKind, nth: usize) -> Option<usize> {
        self.texture_units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.content_type.kind() == kind)
            .nth(nth)
            .map(|(index, _)| index)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Technique {
    pub passes: Vec<Pass>,
}

#[derive(Clone, Debug, Default)]
pub struct Material {
    pub name: String,
    pub techniques: Vec<Technique>,
}

impl Material {
    /// Single technique, single pass material
    pub fn with_pass(name: impl Into<String>, pass: Pass) -> Self {
        Self {
            name: name.into(),
            techniques: vec![Technique { passes: vec![pass] }],
        }
    }

    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.techniques.iter().flat_map(|t| t.passes.iter())
    }

    /// First pass of the best technique
    pub fn first_pass(&self) -> Option<&Pass> {
        self.techniques.first().and_then(|t| t.passes.first())
    }

    pub fn first_pass_mut(&mut self) -> Option<&mut Pass> {
        self.techniques.first_mut().and_then(|t| t.passes.first_mut())
    }
}

/// Receives per-pass automatic shader parameters
pub trait AutoParamSink {
    /// Projector for texture unit slot `index`; `None` clears it
    fn set_texture_projector(&mut self, index: usize, projector: Option<TextureProjector>);
}

/// Automatic shader parameters gathered while rendering one renderable
#[derive(Clone, Debug, Default)]
pub struct AutoParamDataSource {
    pub current_camera: Option<CameraId>,
    pub camera_view_projection: Mat4,
    pub scene_frame: u64,
    pub shadow_node: Option<u32>,
    pub current_pass: Option<String>,
    pub world_matrices: Vec<Mat4>,
    pub fog: Fog,
    texture_projectors: Vec<Option<TextureProjector>>,
}

impl AutoParamDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture_projector(&self, index: usize) -> Option<&TextureProjector> {
        self.texture_projectors.get(index).and_then(Option::as_ref)
    }

    pub fn set_current_camera(&mut self, camera: &Camera) {
        self.current_camera = Some(camera.id());
        self.camera_view_projection = camera.view_projection_matrix();
    }

    pub fn set_world_matrices(&mut self, matrices: &[Mat4]) {
        self.world_matrices.clear();
        self.world_matrices.extend_from_slice(matrices);
    }
}

impl AutoParamSink for AutoParamDataSource {
    fn set_texture_projector(&mut self, index: usize, projector: Option<TextureProjector>) {
        if self.texture_projectors.len() <= index {
            self.texture_projectors.resize(index + 1, None);
        }
        self.texture_projectors[index] = projector;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadow_pass() -> Pass {
        let mut pass = Pass::new("lit").with_programs("vs", "ps");
        pass.add_texture_unit(TextureUnitState::new("diffuse", ContentType::Named));
        pass.add_texture_unit(TextureUnitState::new("shadow0", ContentType::Shadow));
        pass.add_texture_unit(TextureUnitState::new("normal", ContentType::Named));
        pass.add_texture_unit(TextureUnitState::new("shadow1", ContentType::Shadow));
        pass
    }

    #[test]
    fn test_shadow_unit_lookup() {
        let pass = shadow_pass();
        assert_eq!(pass.num_shadow_content_textures(), 2);
        assert_eq!(pass.texture_unit_with_content_type(ContentKind::Shadow, 0), Some(1));
        assert_eq!(pass.texture_unit_with_content_type(ContentKind::Shadow, 1), Some(3));
        assert_eq!(pass.texture_unit_with_content_type(ContentKind::Shadow, 2), None);
        assert_eq!(pass.texture_unit_with_content_type(ContentKind::Named, 1), Some(2));
    }

    #[test]
    fn test_programmable() {
        assert!(shadow_pass().is_programmable());
        assert!(!Pass::new("fixed").is_programmable());
    }

    #[test]
    fn test_projector_sink_grows() {
        let mut params = AutoParamDataSource::new();
        let projector = TextureProjector {
            camera: CameraId(3),
            view_projection: Mat4::IDENTITY,
        };
        params.set_texture_projector(2, Some(projector));
        assert_eq!(params.texture_projector(2), Some(&projector));
        assert_eq!(params.texture_projector(0), None);
        params.set_texture_projector(2, None);
        assert_eq!(params.texture_projector(2), None);
    }
}
