//! Shadow map textures and render targets
//!
//! Abstract texture records: the shadow node asks a [`TextureFactory`] for
//! render textures and multi render targets by name, format and size and
//! only ever holds the returned handles. [`TextureManager`] is the in-memory
//! factory the compositor manager owns; a GPU backend mirrors its records.

use serde::{Deserialize, Serialize};

use crate::error::{CompositorError, CompositorResult};

/// Pixel formats usable as shadow map targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    R8G8B8A8,
    R16Float,
    R32Float,
    Rg16Float,
    Rg32Float,
    Rgba16Float,
    Rgba32Float,
    Depth16,
    Depth24Stencil8,
    Depth32Float,
}

impl PixelFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth16 | Self::Depth24Stencil8 | Self::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Self::Depth16 | Self::R16Float => 2,
            Self::R8G8B8A8 | Self::R32Float | Self::Rg16Float
            | Self::Depth24Stencil8 | Self::Depth32Float => 4,
            Self::Rg32Float | Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Handle to a texture created by a [`TextureFactory`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureHandle(pub u32);

/// Handle to a multi render target
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MrtHandle(pub u32);

/// Something a scene pass can render into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Texture(TextureHandle),
    Multi(MrtHandle),
}

/// Description of a 2D render texture
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub fsaa: u32,
    pub hw_gamma_write: bool,
}

/// Creates render targets on behalf of compositor nodes
pub trait TextureFactory {
    /// Create a 2D texture usable as a render target
    fn create_render_texture(&mut self, desc: &TextureDesc) -> CompositorResult<TextureHandle>;

    /// Create a multi render target binding one surface per texture
    fn create_multi_render_target(
        &mut self,
        name: &str,
        surfaces: &[TextureHandle],
    ) -> CompositorResult<MrtHandle>;

    /// Select the depth buffer pool a target shares its depth buffer from
    fn set_depth_buffer_pool(&mut self, target: RenderTarget, pool: u16) -> CompositorResult<()>;
}

/// Texture record kept by [`TextureManager`]
#[derive(Clone, Debug)]
pub struct TextureRecord {
    pub desc: TextureDesc,
    pub depth_buffer_pool: Option<u16>,
}

/// Multi render target record kept by [`TextureManager`]
#[derive(Clone, Debug)]
pub struct MrtRecord {
    pub name: String,
    pub surfaces: Vec<TextureHandle>,
    pub depth_buffer_pool: Option<u16>,
}

/// In-memory texture registry. Names are unique.
#[derive(Debug, Default)]
pub struct TextureManager {
    textures: Vec<TextureRecord>,
    mrts: Vec<MrtRecord>,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureRecord> {
        self.textures.get(handle.0 as usize)
    }

    pub fn mrt(&self, handle: MrtHandle) -> Option<&MrtRecord> {
        self.mrts.get(handle.0 as usize)
    }

    /// Look up a texture by name
    pub fn find_texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures
            .iter()
            .position(|t| t.desc.name == name)
            .map(|i| TextureHandle(i as u32))
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Total memory used by all textures in bytes
    pub fn memory_usage(&self) -> u64 {
        self.textures
            .iter()
            .map(|t| {
                let samples = t.desc.fsaa.max(1) as u64;
                t.desc.width as u64
                    * t.desc.height as u64
                    * t.desc.format.bytes_per_pixel() as u64
                    * samples
            })
            .sum()
    }

    fn name_taken(&self, name: &str) -> bool {
        self.textures.iter().any(|t| t.desc.name == name) || self.mrts.iter().any(|m| m.name == name)
    }
}

impl TextureFactory for TextureManager {
    fn create_render_texture(&mut self, desc: &TextureDesc) -> CompositorResult<TextureHandle> {
        if self.name_taken(&desc.name) {
            return Err(CompositorError::Config(format!(
                "Texture '{}' already exists",
                desc.name
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(CompositorError::Config(format!(
                "Texture '{}' has zero size {}x{}",
                desc.name, desc.width, desc.height
            )));
        }

        self.textures.push(TextureRecord {
            desc: desc.clone(),
            depth_buffer_pool: None,
        });
        Ok(TextureHandle(self.textures.len() as u32 - 1))
    }

    fn create_multi_render_target(
        &mut self,
        name: &str,
        surfaces: &[TextureHandle],
    ) -> CompositorResult<MrtHandle> {
        if self.name_taken(name) {
            return Err(CompositorError::Config(format!("Render target '{}' already exists", name)));
        }
        if let Some(missing) = surfaces.iter().find(|s| self.texture(**s).is_none()) {
            return Err(CompositorError::ItemNotFound(format!(
                "MRT '{}' surface {:?}",
                name, missing
            )));
        }

        self.mrts.push(MrtRecord {
            name: name.into(),
            surfaces: surfaces.to_vec(),
            depth_buffer_pool: None,
        });
        Ok(MrtHandle(self.mrts.len() as u32 - 1))
    }

    fn set_depth_buffer_pool(&mut self, target: RenderTarget, pool: u16) -> CompositorResult<()> {
        match target {
            RenderTarget::Texture(handle) => {
                let record = self
                    .textures
                    .get_mut(handle.0 as usize)
                    .ok_or_else(|| CompositorError::ItemNotFound(format!("texture {:?}", handle)))?;
                record.depth_buffer_pool = Some(pool);
            }
            RenderTarget::Multi(handle) => {
                let record = self
                    .mrts
                    .get_mut(handle.0 as usize)
                    .ok_or_else(|| CompositorError::ItemNotFound(format!("MRT {:?}", handle)))?;
                record.depth_buffer_pool = Some(pool);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str) -> TextureDesc {
        TextureDesc {
            name: name.into(),
            width: 1024,
            height: 1024,
            format: PixelFormat::R32Float,
            fsaa: 0,
            hw_gamma_write: false,
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut textures = TextureManager::new();
        textures.create_render_texture(&desc("shadow")).unwrap();
        let err = textures.create_render_texture(&desc("shadow")).unwrap_err();
        assert!(matches!(err, CompositorError::Config(_)));
    }

    #[test]
    fn test_mrt_and_depth_pool() {
        let mut textures = TextureManager::new();
        let a = textures.create_render_texture(&desc("a")).unwrap();
        let b = textures.create_render_texture(&desc("b")).unwrap();
        let mrt = textures.create_multi_render_target("ab", &[a, b]).unwrap();
        textures.set_depth_buffer_pool(RenderTarget::Multi(mrt), 2).unwrap();

        let record = textures.mrt(mrt).unwrap();
        assert_eq!(record.surfaces, vec![a, b]);
        assert_eq!(record.depth_buffer_pool, Some(2));
        assert_eq!(textures.find_texture("b"), Some(b));
    }

    #[test]
    fn test_memory_usage() {
        let mut textures = TextureManager::new();
        textures.create_render_texture(&desc("a")).unwrap();
        assert_eq!(textures.memory_usage(), 1024 * 1024 * 4);
    }
}
