//! Compositor manager
//!
//! Owns the textures shared between shadow nodes: the node's render
//! targets, one blank "null" shadow texture per pixel format, and textures
//! other compositor nodes publish by name.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use umbra_scene::SceneManager;

use crate::definition::ShadowNodeDef;
use crate::error::{CompositorError, CompositorResult};
use crate::shadow_node::ShadowNode;
use crate::texture::{PixelFormat, TextureDesc, TextureFactory, TextureHandle, TextureManager};

/// Shared compositor state
#[derive(Debug, Default)]
pub struct CompositorManager {
    textures: Mutex<TextureManager>,
    null_shadow_textures: Mutex<BTreeMap<PixelFormat, TextureHandle>>,
    compositor_textures: Mutex<HashMap<String, Vec<TextureHandle>>>,
    definitions: Mutex<HashMap<String, Arc<ShadowNodeDef>>>,
    next_node_id: AtomicU32,
}

impl CompositorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the texture store
    pub fn textures(&self) -> MutexGuard<'_, TextureManager> {
        self.textures.lock()
    }

    /// Blank 1x1 texture of `format`, created on first request.
    ///
    /// Shaders sampling a shadow map whose light doesn't exist read this
    /// texture instead.
    pub fn null_shadow_texture(&self, format: PixelFormat) -> CompositorResult<TextureHandle> {
        let mut cache = self.null_shadow_textures.lock();
        if let Some(texture) = cache.get(&format) {
            return Ok(*texture);
        }

        let texture = self.textures.lock().create_render_texture(&TextureDesc {
            name: format!("NullShadowTexture_{:?}", format),
            width: 1,
            height: 1,
            format,
            fsaa: 0,
            hw_gamma_write: false,
        })?;
        log::debug!("Created null shadow texture for {:?}", format);
        cache.insert(format, texture);
        Ok(texture)
    }

    /// Publish the output textures of a compositor node under `name`
    pub fn register_compositor_textures(&self, name: impl Into<String>, textures: Vec<TextureHandle>) {
        self.compositor_textures.lock().insert(name.into(), textures);
    }

    /// Texture `mrt_index` published under `name`
    pub fn compositor_texture(&self, name: &str, mrt_index: usize) -> CompositorResult<TextureHandle> {
        self.compositor_textures
            .lock()
            .get(name)
            .and_then(|textures| textures.get(mrt_index).copied())
            .ok_or_else(|| {
                CompositorError::ItemNotFound(format!(
                    "Compositor texture '{}' (MRT index {})",
                    name, mrt_index
                ))
            })
    }

    /// Validate and register a shadow node definition
    pub fn add_shadow_node_definition(&self, definition: ShadowNodeDef) -> CompositorResult<Arc<ShadowNodeDef>> {
        definition.validate()?;
        let mut definitions = self.definitions.lock();
        if definitions.contains_key(&definition.name) {
            return Err(CompositorError::Config(format!(
                "Shadow node definition '{}' already exists",
                definition.name
            )));
        }
        let definition = Arc::new(definition);
        definitions.insert(definition.name.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Parse a shadow node definition from JSON and register it
    pub fn load_shadow_node_definition(&self, json: &str) -> CompositorResult<Arc<ShadowNodeDef>> {
        self.add_shadow_node_definition(ShadowNodeDef::from_json(json)?)
    }

    pub fn shadow_node_definition(&self, name: &str) -> CompositorResult<Arc<ShadowNodeDef>> {
        self.definitions
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| CompositorError::ItemNotFound(format!("Shadow node definition '{}'", name)))
    }

    /// Instantiate the registered definition `name`.
    ///
    /// The node's shadow maps are published as compositor textures under
    /// their texture names.
    pub fn create_shadow_node(&self, name: &str, scene: &mut SceneManager) -> CompositorResult<ShadowNode> {
        let definition = self.shadow_node_definition(name)?;
        let id = self.next_node_id.fetch_add(1, Ordering::Relaxed);

        let node = {
            let mut textures = self.textures.lock();
            ShadowNode::new(id, definition, &mut *textures, scene)?
        };

        for (map, slot) in node.definition().shadow_maps.iter().zip(node.slots()) {
            if !slot.channel.textures.is_empty() {
                self.register_compositor_textures(format!("{}{}", map.name, id), slot.channel.textures.clone());
            }
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ShadowMapTexDef;

    fn definition(name: &str) -> ShadowNodeDef {
        let mut def = ShadowNodeDef::new(name, 1);
        def.add_shadow_map(ShadowMapTexDef::new("map", 512, 512, PixelFormat::R32Float));
        def
    }

    #[test]
    fn test_null_textures_cached_per_format() {
        let manager = CompositorManager::new();
        let a = manager.null_shadow_texture(PixelFormat::R32Float).unwrap();
        let b = manager.null_shadow_texture(PixelFormat::R32Float).unwrap();
        let c = manager.null_shadow_texture(PixelFormat::R8G8B8A8).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let textures = manager.textures();
        assert_eq!(textures.texture_count(), 2);
        let record = textures.texture(a).unwrap();
        assert_eq!((record.desc.width, record.desc.height), (1, 1));
    }

    #[test]
    fn test_definition_registry() {
        let manager = CompositorManager::new();
        manager.add_shadow_node_definition(definition("shadows")).unwrap();
        assert!(matches!(
            manager.add_shadow_node_definition(definition("shadows")),
            Err(CompositorError::Config(_))
        ));
        assert!(matches!(
            manager.shadow_node_definition("missing"),
            Err(CompositorError::ItemNotFound(_))
        ));
    }

    #[test]
    fn test_nodes_get_unique_ids_and_publish_textures() {
        let manager = CompositorManager::new();
        manager.add_shadow_node_definition(definition("shadows")).unwrap();
        let mut scene = SceneManager::new();

        let first = manager.create_shadow_node("shadows", &mut scene).unwrap();
        let second = manager.create_shadow_node("shadows", &mut scene).unwrap();
        assert_ne!(first.id(), second.id());

        let texture = manager.compositor_texture("map0", 0).unwrap();
        assert_eq!(manager.textures().find_texture("map0"), Some(texture));
        assert!(manager.compositor_texture("map0", 1).is_err());
    }
}
