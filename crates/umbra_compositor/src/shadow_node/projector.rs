//! Binding shadow maps to the texture units of a lit pass

use umbra_scene::LightClosest;

use super::ShadowNode;
use crate::error::{CompositorError, CompositorResult};
use crate::manager::CompositorManager;
use crate::material::{AutoParamSink, ContentKind, Pass, TextureProjector};
use crate::texture::PixelFormat;

impl ShadowNode {
    /// Lights of the last [`ShadowNode::set_shadow_maps_to_pass`] call
    #[inline]
    pub fn current_lights(&self) -> &[LightClosest] {
        &self.current_lights
    }

    /// Bind this node's shadow maps to the shadow texture units of `pass`
    /// for one renderable.
    ///
    /// `renderable_lights` are the lights affecting the renderable, closest
    /// first; the pass shades the window starting at `start_light`. Lights
    /// casting a shadow this frame are moved to the front of the window,
    /// keeping their relative order, and the reordered window is returned.
    ///
    /// Shadow map `i` goes to the `i`-th shadow unit. A map whose light is
    /// not in the window binds a blank texture so the pass reads it as lit.
    pub fn set_shadow_maps_to_pass(
        &mut self,
        renderable_lights: &[LightClosest],
        pass: &mut Pass,
        params: &mut dyn AutoParamSink,
        start_light: usize,
        compositor: &CompositorManager,
    ) -> CompositorResult<&[LightClosest]> {
        let end = start_light
            .saturating_add(pass.max_simultaneous_lights)
            .min(renderable_lights.len());
        let window = &renderable_lights[start_light.min(end)..end];

        let lights = &self.lights;
        self.current_lights.clear();
        self.current_lights
            .extend(window.iter().filter(|l| lights.is_affected(l.global_index)));
        self.current_lights
            .extend(window.iter().filter(|l| !lights.is_affected(l.global_index)));

        let num_shadow_units = pass.num_shadow_content_textures();
        let num_maps = self.slots.len().min(num_shadow_units);

        for idx in 0..num_maps {
            let unit_index = shadow_unit(pass, idx)?;
            let map = &self.definition.shadow_maps[idx];

            let casts_shadow = self
                .current_lights
                .get(map.light)
                .is_some_and(|light| lights.is_affected(light.global_index));
            let texture = match self.shadow_map_texture(idx) {
                Some(texture) if casts_shadow => texture,
                _ => compositor.null_shadow_texture(self.null_texture_format(idx))?,
            };

            let Some(unit) = pass.texture_unit_mut(unit_index) else {
                continue;
            };
            unit.set_projective_texturing(None);
            unit.set_texture(texture);
            params.set_texture_projector(idx, Some(TextureProjector::from_camera(&self.slots[idx].camera)));
        }

        if num_shadow_units > num_maps {
            log::warn!(
                "Pass '{}' has {} shadow texture units but shadow node '{}' renders {} shadow maps",
                pass.name,
                num_shadow_units,
                self.definition.name,
                self.slots.len()
            );
            let blank = compositor.null_shadow_texture(PixelFormat::R8G8B8A8)?;
            for idx in num_maps..num_shadow_units {
                let unit_index = shadow_unit(pass, idx)?;
                if let Some(unit) = pass.texture_unit_mut(unit_index) {
                    unit.set_projective_texturing(None);
                    unit.set_texture(blank);
                }
                params.set_texture_projector(idx, None);
            }
        }

        Ok(&self.current_lights)
    }

    /// Format of the blank texture standing in for shadow map `idx`. Atlas
    /// entries use their source's format.
    fn null_texture_format(&self, idx: usize) -> PixelFormat {
        let source = self.slots[idx].channel.atlas_source.unwrap_or(idx);
        self.definition
            .first_format(source)
            .unwrap_or(PixelFormat::R8G8B8A8)
    }
}

fn shadow_unit(pass: &Pass, nth: usize) -> CompositorResult<usize> {
    pass.texture_unit_with_content_type(ContentKind::Shadow, nth)
        .ok_or_else(|| {
            CompositorError::ItemNotFound(format!(
                "Shadow texture unit {} in pass '{}'",
                nth, pass.name
            ))
        })
}
