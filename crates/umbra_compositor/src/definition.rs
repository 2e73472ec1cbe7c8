//! Shadow node definitions
//!
//! Definitions are loaded from JSON, validated once and then shared
//! read-only between every node instantiated from them.

use core::fmt;
use core::str::FromStr;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::{CompositorError, CompositorResult};
use crate::texture::PixelFormat;

/// How a shadow map's camera is fitted to the scene
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ShadowMapTechnique {
    /// Fixed frustum around the viewer
    #[default]
    Default,
    /// Recognized, but there is no camera setup for it
    PlaneOptimal,
    /// Fit to the visible receivers
    Focused,
    /// Light space perspective shadow maps
    LiSpsm,
    /// Parallel split shadow maps
    Pssm,
}

impl ShadowMapTechnique {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::PlaneOptimal => "plane_optimal",
            Self::Focused => "focused",
            Self::LiSpsm => "lispsm",
            Self::Pssm => "pssm",
        }
    }
}

impl fmt::Display for ShadowMapTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowMapTechnique {
    type Err = CompositorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "plane_optimal" | "planeoptimal" => Ok(Self::PlaneOptimal),
            "focused" => Ok(Self::Focused),
            "lispsm" => Ok(Self::LiSpsm),
            "pssm" => Ok(Self::Pssm),
            other => Err(CompositorError::Config(format!(
                "Unknown shadow map technique '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ShadowMapTechnique {
    type Error = CompositorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShadowMapTechnique> for String {
    fn from(value: ShadowMapTechnique) -> Self {
        value.as_str().to_string()
    }
}

/// Region of another shadow map's texture used by an atlas entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtlasRegion {
    /// Name of the shadow map that owns the texture
    pub source: String,
    pub uv_offset: Vec2,
    pub uv_length: Vec2,
}

/// One shadow map of a shadow node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowMapTexDef {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// One format: plain render texture. Several: MRT. None: atlas entry.
    #[serde(default)]
    pub formats: Vec<PixelFormat>,
    #[serde(default)]
    pub fsaa: u32,
    #[serde(default)]
    pub hw_gamma_write: bool,
    #[serde(default = "default_depth_buffer_id")]
    pub depth_buffer_id: u16,
    /// Rank of the light (0 = closest) this map renders
    #[serde(default)]
    pub light: usize,
    /// Cascade index for PSSM
    #[serde(default)]
    pub split: usize,
    #[serde(default)]
    pub technique: ShadowMapTechnique,
    #[serde(default)]
    pub atlas: Option<AtlasRegion>,
}

fn default_depth_buffer_id() -> u16 {
    1
}

impl ShadowMapTexDef {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            formats: vec![format],
            fsaa: 0,
            hw_gamma_write: false,
            depth_buffer_id: default_depth_buffer_id(),
            light: 0,
            split: 0,
            technique: ShadowMapTechnique::Default,
            atlas: None,
        }
    }

    pub fn with_light(mut self, light: usize) -> Self {
        self.light = light;
        self
    }

    pub fn with_technique(mut self, technique: ShadowMapTechnique) -> Self {
        self.technique = technique;
        self
    }

    pub fn with_split(mut self, split: usize) -> Self {
        self.split = split;
        self
    }

    #[inline]
    pub fn is_atlas(&self) -> bool {
        self.formats.is_empty()
    }
}

/// A scene pass rendering casters into one of the node's shadow maps
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PassSceneDef {
    pub shadow_map_idx: usize,
    #[serde(default)]
    pub first_rq: usize,
    #[serde(default = "default_last_rq")]
    pub last_rq: usize,
    #[serde(default = "default_visibility_mask")]
    pub visibility_mask: u32,
    /// Normalized viewport rectangle: left, top, width, height
    #[serde(default = "default_viewport_rect")]
    pub viewport_rect: [f32; 4],
}

fn default_last_rq() -> usize {
    usize::MAX
}

fn default_visibility_mask() -> u32 {
    u32::MAX
}

fn default_viewport_rect() -> [f32; 4] {
    [0.0, 0.0, 1.0, 1.0]
}

impl PassSceneDef {
    pub fn new(shadow_map_idx: usize) -> Self {
        Self {
            shadow_map_idx,
            first_rq: 0,
            last_rq: default_last_rq(),
            visibility_mask: default_visibility_mask(),
            viewport_rect: default_viewport_rect(),
        }
    }
}

/// Parallel split tunables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PssmSettings {
    pub num_splits: usize,
    /// Blend between linear (0) and logarithmic (1) split placement
    pub lambda: f32,
    /// Overlap added to each split to hide seams
    pub split_padding: f32,
}

impl Default for PssmSettings {
    fn default() -> Self {
        Self {
            num_splits: 3,
            lambda: 0.95,
            split_padding: 1.0,
        }
    }
}

/// Light space perspective tunables
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiSpsmSettings {
    pub optimal_adjust_factor: f32,
    pub use_simple_optimal_adjust: bool,
    /// Below this angle (degrees) between view and light the warp is skipped
    pub camera_light_direction_threshold: f32,
}

impl Default for LiSpsmSettings {
    fn default() -> Self {
        Self {
            optimal_adjust_factor: 5.0,
            use_simple_optimal_adjust: false,
            camera_light_direction_threshold: 35.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSetupSettings {
    pub pssm: PssmSettings,
    pub lispsm: LiSpsmSettings,
}

/// A shadow node definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadowNodeDef {
    pub name: String,
    /// Maximum number of shadow casting lights
    pub num_lights: usize,
    #[serde(default)]
    pub min_rq: usize,
    #[serde(default = "default_last_rq")]
    pub max_rq: usize,
    pub shadow_maps: Vec<ShadowMapTexDef>,
    #[serde(default)]
    pub passes: Vec<PassSceneDef>,
    #[serde(default)]
    pub camera_setup: CameraSetupSettings,
}

impl ShadowNodeDef {
    pub fn new(name: impl Into<String>, num_lights: usize) -> Self {
        Self {
            name: name.into(),
            num_lights,
            min_rq: 0,
            max_rq: default_last_rq(),
            shadow_maps: Vec::new(),
            passes: Vec::new(),
            camera_setup: CameraSetupSettings::default(),
        }
    }

    /// Parse and validate a definition
    pub fn from_json(json: &str) -> CompositorResult<Self> {
        let def: Self = serde_json::from_str(json)?;
        def.validate()?;
        Ok(def)
    }

    pub fn to_json(&self) -> CompositorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a shadow map and a scene pass rendering into it
    pub fn add_shadow_map(&mut self, map: ShadowMapTexDef) -> usize {
        self.shadow_maps.push(map);
        let idx = self.shadow_maps.len() - 1;
        self.passes.push(PassSceneDef::new(idx));
        idx
    }

    pub fn find_shadow_map(&self, name: &str) -> Option<usize> {
        self.shadow_maps.iter().position(|m| m.name == name)
    }

    /// First pixel format of a shadow map, following atlas entries to their
    /// source
    pub fn first_format(&self, idx: usize) -> Option<PixelFormat> {
        let map = self.shadow_maps.get(idx)?;
        match (&map.atlas, map.formats.first()) {
            (_, Some(format)) => Some(*format),
            (Some(region), None) => {
                let source = self.find_shadow_map(&region.source)?;
                self.shadow_maps[source].formats.first().copied()
            }
            (None, None) => None,
        }
    }

    /// Resolution of shadow map `idx` in texels. Atlas entries cover their
    /// share of the source.
    pub fn map_size(&self, idx: usize) -> (u32, u32) {
        let Some(map) = self.shadow_maps.get(idx) else {
            return (1, 1);
        };
        let source = map
            .atlas
            .as_ref()
            .filter(|_| map.is_atlas())
            .and_then(|region| Some((region, self.find_shadow_map(&region.source)?)));
        match source {
            Some((region, source)) => {
                let source = &self.shadow_maps[source];
                (
                    (source.width as f32 * region.uv_length.x).max(1.0) as u32,
                    (source.height as f32 * region.uv_length.y).max(1.0) as u32,
                )
            }
            None => (map.width, map.height),
        }
    }

    pub fn validate(&self) -> CompositorResult<()> {
        if self.shadow_maps.is_empty() {
            return Err(CompositorError::Config(format!(
                "Shadow node '{}' has no shadow maps",
                self.name
            )));
        }
        if self.min_rq > self.max_rq {
            return Err(CompositorError::Config(format!(
                "Shadow node '{}' render queue range [{}, {}) is inverted",
                self.name, self.min_rq, self.max_rq
            )));
        }

        for (idx, map) in self.shadow_maps.iter().enumerate() {
            if self.shadow_maps[..idx].iter().any(|m| m.name == map.name) {
                return Err(CompositorError::Config(format!(
                    "Shadow map name '{}' used twice in '{}'",
                    map.name, self.name
                )));
            }

            if map.is_atlas() {
                let region = map.atlas.as_ref().ok_or_else(|| {
                    CompositorError::Config(format!(
                        "Shadow map '{}' has no formats and no atlas source",
                        map.name
                    ))
                })?;
                let source = self.find_shadow_map(&region.source).ok_or_else(|| {
                    CompositorError::ItemNotFound(format!(
                        "Atlas source '{}' of shadow map '{}'",
                        region.source, map.name
                    ))
                })?;
                if self.shadow_maps[source].is_atlas() {
                    return Err(CompositorError::Config(format!(
                        "Atlas source '{}' of '{}' is itself an atlas entry",
                        region.source, map.name
                    )));
                }
            } else if map.width == 0 || map.height == 0 {
                return Err(CompositorError::Config(format!(
                    "Shadow map '{}' has zero size",
                    map.name
                )));
            }

            if map.technique == ShadowMapTechnique::Pssm
                && map.split >= self.camera_setup.pssm.num_splits
            {
                return Err(CompositorError::Config(format!(
                    "Shadow map '{}' uses split {} but only {} splits are configured",
                    map.name, map.split, self.camera_setup.pssm.num_splits
                )));
            }
        }

        if let Some(pass) = self
            .passes
            .iter()
            .find(|p| p.shadow_map_idx >= self.shadow_maps.len())
        {
            return Err(CompositorError::ItemNotFound(format!(
                "Pass references shadow map {} but '{}' has {}",
                pass.shadow_map_idx,
                self.name,
                self.shadow_maps.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ShadowNodeDef {
        let mut def = ShadowNodeDef::new("ShadowNode", 2);
        def.add_shadow_map(ShadowMapTexDef::new("map0", 1024, 1024, PixelFormat::R32Float));
        def.add_shadow_map(
            ShadowMapTexDef::new("map1", 512, 512, PixelFormat::R32Float)
                .with_light(1)
                .with_technique(ShadowMapTechnique::Focused),
        );
        def
    }

    #[test]
    fn test_technique_parse_case_insensitive() {
        assert_eq!("PSSM".parse::<ShadowMapTechnique>().unwrap(), ShadowMapTechnique::Pssm);
        assert_eq!("LiSPSM".parse::<ShadowMapTechnique>().unwrap(), ShadowMapTechnique::LiSpsm);
        assert_eq!(
            "Plane_Optimal".parse::<ShadowMapTechnique>().unwrap(),
            ShadowMapTechnique::PlaneOptimal
        );
        assert!(matches!(
            "stencil".parse::<ShadowMapTechnique>(),
            Err(CompositorError::Config(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let def = sample();
        let json = def.to_json().unwrap();
        assert!(json.contains("\"focused\""));
        let loaded = ShadowNodeDef::from_json(&json).unwrap();
        assert_eq!(loaded, def);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "name": "node",
            "num_lights": 1,
            "shadow_maps": [
                { "name": "a", "width": 256, "height": 256, "formats": ["R32Float"], "technique": "Focused" }
            ]
        }"#;
        let def = ShadowNodeDef::from_json(json).unwrap();
        assert_eq!(def.shadow_maps[0].technique, ShadowMapTechnique::Focused);
        assert_eq!(def.shadow_maps[0].depth_buffer_id, 1);
        assert_eq!(def.max_rq, usize::MAX);
        assert_eq!(def.camera_setup.lispsm.optimal_adjust_factor, 5.0);
        assert!(!def.camera_setup.lispsm.use_simple_optimal_adjust);
    }

    #[test]
    fn test_unknown_technique_in_json() {
        let json = r#"{
            "name": "node",
            "num_lights": 1,
            "shadow_maps": [ { "name": "a", "width": 8, "height": 8, "technique": "stencil" } ]
        }"#;
        assert!(matches!(ShadowNodeDef::from_json(json), Err(CompositorError::Parse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_pass() {
        let mut def = sample();
        def.passes.push(PassSceneDef::new(7));
        assert!(matches!(def.validate(), Err(CompositorError::ItemNotFound(_))));
    }

    #[test]
    fn test_validate_atlas() {
        let mut def = sample();
        let mut entry = ShadowMapTexDef::new("atlas", 0, 0, PixelFormat::R32Float);
        entry.formats.clear();
        def.shadow_maps.push(entry.clone());
        assert!(matches!(def.validate(), Err(CompositorError::Config(_))));

        def.shadow_maps.pop();
        entry.atlas = Some(AtlasRegion {
            source: "map0".into(),
            uv_offset: Vec2::new(0.5, 0.0),
            uv_length: Vec2::splat(0.5),
        });
        def.shadow_maps.push(entry);
        def.validate().unwrap();
        assert_eq!(def.first_format(2), Some(PixelFormat::R32Float));
    }

    #[test]
    fn test_validate_pssm_split() {
        let mut def = sample();
        def.shadow_maps[0] = def.shadow_maps[0]
            .clone()
            .with_technique(ShadowMapTechnique::Pssm)
            .with_split(3);
        assert!(def.validate().is_err());
        def.shadow_maps[0].split = 2;
        def.validate().unwrap();
    }

    #[test]
    fn test_validate_empty() {
        let def = ShadowNodeDef::new("empty", 1);
        assert!(matches!(def.validate(), Err(CompositorError::Config(_))));
    }
}
