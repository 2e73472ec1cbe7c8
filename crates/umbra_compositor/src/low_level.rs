//! Low level shading backend
//!
//! Renders materials written directly against shader programs, one pass per
//! renderable. Shadow maps reach these passes through their shadow texture
//! units and the auto parameter source.

use glam::Mat4;
use umbra_scene::{Camera, SceneManager};

use crate::error::{CompositorError, CompositorResult};
use crate::manager::CompositorManager;
use crate::material::{
    AutoParamDataSource, AutoParamSink, ContentType, Fog, Material, Pass, ProgramStage,
    TextureUnitState,
};
use crate::shadow_node::ShadowNode;

/// Render system state changes issued while filling a renderable's buffers
pub trait RenderSystem {
    fn set_colour_write(&mut self, enabled: bool);

    fn set_texture_unit_settings(&mut self, unit: usize, state: &TextureUnitState);

    /// Unbind texture units `unit..`
    fn disable_texture_units_from(&mut self, unit: usize);

    fn bind_program_parameters(&mut self, stage: ProgramStage, program: &str, params: &AutoParamDataSource);
}

/// Programs of one cached pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderCacheEntry {
    pub vertex: Option<String>,
    pub geometry: Option<String>,
    pub hull: Option<String>,
    pub domain: Option<String>,
    pub fragment: Option<String>,
}

impl ShaderCacheEntry {
    fn from_pass(pass: &Pass) -> Self {
        Self {
            vertex: pass.vertex_program.clone(),
            geometry: pass.geometry_program.clone(),
            hull: pass.hull_program.clone(),
            domain: pass.domain_program.clone(),
            fragment: pass.fragment_program.clone(),
        }
    }
}

/// Something drawn with a low level material
#[derive(Clone, Debug, Default)]
pub struct Renderable {
    pub name: String,
    pub material: Material,
    pub world_transforms: Vec<Mat4>,
}

impl Renderable {
    pub fn new(name: impl Into<String>, material: Material) -> Self {
        Self {
            name: name.into(),
            material,
            world_transforms: vec![Mat4::IDENTITY],
        }
    }
}

fn require_programmable(material: &Material, pass: &Pass) -> CompositorResult<()> {
    if pass.is_programmable() {
        Ok(())
    } else {
        Err(CompositorError::RenderingApi(format!(
            "Fixed function passes are not supported. Material '{}' must use shaders",
            material.name
        )))
    }
}

fn first_pass(material: &Material) -> CompositorResult<&Pass> {
    material
        .first_pass()
        .ok_or_else(|| CompositorError::ItemNotFound(format!("Pass of material '{}'", material.name)))
}

#[derive(Debug, Default)]
pub struct LowLevelBackend {
    shader_cache: Vec<ShaderCacheEntry>,
    auto_params: AutoParamDataSource,
    scene_fog: Fog,
}

impl LowLevelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fog used by passes without their own
    pub fn set_scene_fog(&mut self, fog: Fog) {
        self.scene_fog = fog;
    }

    #[inline]
    pub fn auto_params(&self) -> &AutoParamDataSource {
        &self.auto_params
    }

    #[inline]
    pub fn auto_params_mut(&mut self) -> &mut AutoParamDataSource {
        &mut self.auto_params
    }

    #[inline]
    pub fn shader_cache(&self) -> &[ShaderCacheEntry] {
        &self.shader_cache
    }

    /// Cache the programs of the renderable's first pass
    pub fn create_shader_cache_entry(&mut self, renderable: &Renderable) -> CompositorResult<&ShaderCacheEntry> {
        let pass = first_pass(&renderable.material)?;
        require_programmable(&renderable.material, pass)?;
        self.shader_cache.push(ShaderCacheEntry::from_pass(pass));
        let index = self.shader_cache.len() - 1;
        Ok(&self.shader_cache[index])
    }

    /// Check every pass of the renderable's material is programmable.
    ///
    /// Low level materials don't share shaders, so both the regular and the
    /// caster hash are always zero.
    pub fn calculate_hash_for(&self, renderable: &Renderable) -> CompositorResult<(u32, u32)> {
        for pass in renderable.material.passes() {
            require_programmable(&renderable.material, pass)?;
        }
        Ok((0, 0))
    }

    /// Start a pass rendered from `camera`, optionally receiving the shadows
    /// of `shadow_node`
    pub fn prepare_pass_hash(&mut self, shadow_node: Option<&ShadowNode>, camera: &Camera, scene: &SceneManager) {
        self.shader_cache.clear();
        self.auto_params.set_current_camera(camera);
        self.auto_params.scene_frame = scene.frame_count();
        self.auto_params.shadow_node = shadow_node.map(ShadowNode::id);
    }

    /// Send the render state and program parameters of `renderable`
    pub fn fill_buffers_for(
        &mut self,
        renderable: &mut Renderable,
        caster_pass: bool,
        compositor: &CompositorManager,
        render_system: &mut dyn RenderSystem,
    ) -> CompositorResult<u32> {
        self.auto_params.set_world_matrices(&renderable.world_transforms);

        let material_name = renderable.material.name.clone();
        let pass = renderable.material.first_pass_mut().ok_or_else(|| {
            CompositorError::ItemNotFound(format!("Pass of material '{}'", material_name))
        })?;

        self.auto_params.current_pass = Some(pass.name.clone());
        self.auto_params.fog = pass.fog_override.unwrap_or(self.scene_fog);
        render_system.set_colour_write(pass.colour_write);

        for unit in 0..pass.num_texture_units() {
            let Some(state) = pass.texture_unit_mut(unit) else {
                continue;
            };

            if !caster_pass && state.content_type != ContentType::Shadow {
                // Manual projection gets its projector no other way
                if let Some(projector) = state.projective_texturing().copied() {
                    self.auto_params.set_texture_projector(unit, Some(projector));
                }
            }

            if let ContentType::Compositor { name, mrt_index } = &state.content_type {
                let texture = compositor.compositor_texture(name, *mrt_index)?;
                state.set_texture(texture);
            }

            render_system.set_texture_unit_settings(unit, state);
        }
        render_system.disable_texture_units_from(pass.num_texture_units());

        for stage in ProgramStage::ALL {
            if let Some(program) = pass.program(stage) {
                render_system.bind_program_parameters(stage, program, &self.auto_params);
            }
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{FogMode, TextureProjector};
    use crate::texture::TextureHandle;
    use umbra_scene::CameraId;

    #[derive(Default)]
    struct RecordingRenderSystem {
        colour_write: Option<bool>,
        units: Vec<(usize, Option<TextureHandle>)>,
        disabled_from: Option<usize>,
        programs: Vec<(ProgramStage, String)>,
    }

    impl RenderSystem for RecordingRenderSystem {
        fn set_colour_write(&mut self, enabled: bool) {
            self.colour_write = Some(enabled);
        }

        fn set_texture_unit_settings(&mut self, unit: usize, state: &TextureUnitState) {
            self.units.push((unit, state.texture()));
        }

        fn disable_texture_units_from(&mut self, unit: usize) {
            self.disabled_from = Some(unit);
        }

        fn bind_program_parameters(&mut self, stage: ProgramStage, program: &str, _params: &AutoParamDataSource) {
            self.programs.push((stage, program.to_string()));
        }
    }

    fn renderable(pass: Pass) -> Renderable {
        Renderable::new("box", Material::with_pass("BoxMaterial", pass))
    }

    #[test]
    fn test_fixed_function_rejected() {
        let mut backend = LowLevelBackend::new();
        let fixed = renderable(Pass::new("fixed"));
        assert!(matches!(
            backend.create_shader_cache_entry(&fixed),
            Err(CompositorError::RenderingApi(_))
        ));
        assert!(matches!(backend.calculate_hash_for(&fixed), Err(CompositorError::RenderingApi(_))));

        let lit = renderable(Pass::new("lit").with_programs("vs", "ps"));
        assert_eq!(backend.calculate_hash_for(&lit).unwrap(), (0, 0));
        let entry = backend.create_shader_cache_entry(&lit).unwrap();
        assert_eq!(entry.fragment.as_deref(), Some("ps"));
        assert_eq!(entry.geometry, None);
    }

    #[test]
    fn test_prepare_records_camera_and_clears_cache() {
        let mut scene = SceneManager::new();
        scene.begin_frame();
        let camera = scene.create_camera("main");
        let mut backend = LowLevelBackend::new();
        backend
            .create_shader_cache_entry(&renderable(Pass::new("lit").with_programs("vs", "ps")))
            .unwrap();

        backend.prepare_pass_hash(None, &camera, &scene);
        assert!(backend.shader_cache().is_empty());
        assert_eq!(backend.auto_params().current_camera, Some(camera.id()));
        assert_eq!(backend.auto_params().scene_frame, 1);
        assert_eq!(backend.auto_params().shadow_node, None);
    }

    #[test]
    fn test_fill_buffers_binds_compositor_textures() {
        let compositor = CompositorManager::new();
        compositor.register_compositor_textures("gbuffer", vec![TextureHandle(10), TextureHandle(11)]);

        let mut pass = Pass::new("lit").with_programs("vs", "ps");
        pass.colour_write = false;
        pass.add_texture_unit(TextureUnitState::new("diffuse", ContentType::Named));
        pass.add_texture_unit(TextureUnitState::new(
            "normals",
            ContentType::Compositor { name: "gbuffer".into(), mrt_index: 1 },
        ));
        let mut renderable = renderable(pass);

        let mut backend = LowLevelBackend::new();
        let mut rs = RecordingRenderSystem::default();
        backend.fill_buffers_for(&mut renderable, false, &compositor, &mut rs).unwrap();

        assert_eq!(rs.colour_write, Some(false));
        assert_eq!(rs.units, vec![(0, None), (1, Some(TextureHandle(11)))]);
        assert_eq!(rs.disabled_from, Some(2));
        assert_eq!(
            rs.programs,
            vec![(ProgramStage::Vertex, "vs".to_string()), (ProgramStage::Fragment, "ps".to_string())]
        );
    }

    #[test]
    fn test_unknown_compositor_texture() {
        let compositor = CompositorManager::new();
        let mut pass = Pass::new("lit").with_programs("vs", "ps");
        pass.add_texture_unit(TextureUnitState::new(
            "missing",
            ContentType::Compositor { name: "nope".into(), mrt_index: 0 },
        ));
        let mut renderable = renderable(pass);

        let mut backend = LowLevelBackend::new();
        let err = backend
            .fill_buffers_for(&mut renderable, false, &compositor, &mut RecordingRenderSystem::default())
            .unwrap_err();
        assert!(matches!(err, CompositorError::ItemNotFound(_)));
    }

    #[test]
    fn test_fog_and_manual_projectors() {
        let compositor = CompositorManager::new();
        let projector = TextureProjector {
            camera: CameraId(5),
            view_projection: Mat4::IDENTITY,
        };

        let mut pass = Pass::new("lit").with_programs("vs", "ps");
        let mut decal = TextureUnitState::new("decal", ContentType::Named);
        decal.set_projective_texturing(Some(projector));
        pass.add_texture_unit(decal);
        let mut renderable = renderable(pass);

        let mut backend = LowLevelBackend::new();
        let fog = Fog {
            mode: FogMode::Linear,
            ..Fog::default()
        };
        backend.set_scene_fog(fog);

        let mut rs = RecordingRenderSystem::default();
        backend.fill_buffers_for(&mut renderable, true, &compositor, &mut rs).unwrap();
        assert_eq!(backend.auto_params().texture_projector(0), None);
        assert_eq!(backend.auto_params().fog.mode, FogMode::Linear);

        backend.fill_buffers_for(&mut renderable, false, &compositor, &mut rs).unwrap();
        assert_eq!(backend.auto_params().texture_projector(0), Some(&projector));
    }
}
