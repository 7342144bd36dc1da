//! Renderer configuration
//!
//! One parameterized pipeline is driven entirely by [`RendererConfig`]: the
//! resource sets, the frame-rate target, the instance capacity and the
//! empty-group policy.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::render::api::resources::{MeshId, ShaderId, TextureData, TextureId};
use crate::render::batch::EmptyGroupPolicy;
use crate::render::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::primitives::PrimitiveShape;

/// A mesh to load at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSlotConfig {
    /// Id draw groups refer to
    pub id: MeshId,
    /// Name for logs
    pub name: String,
    /// Generated shape
    pub shape: PrimitiveShape,
}

/// Where a texture's pixels come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureSource {
    /// 1x1 texture of one colour
    Solid([u8; 4]),
    /// Two-colour checkerboard
    Checker {
        /// Width and height in pixels
        size: u32,
        /// Square size in pixels
        cell: u32,
        /// First colour
        a: [u8; 4],
        /// Second colour
        b: [u8; 4],
    },
}

impl TextureSource {
    /// Generate the pixels
    pub fn build(&self) -> TextureData {
        match *self {
            Self::Solid(rgba) => TextureData::solid(rgba),
            Self::Checker { size, cell, a, b } => TextureData::checker(size, cell, a, b),
        }
    }
}

/// A texture to load at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSlotConfig {
    /// Id draw groups refer to
    pub id: TextureId,
    /// Name for logs
    pub name: String,
    /// Pixel source
    pub source: TextureSource,
}

/// Face culling for a shader's triangles
///
/// Meshes wind counter-clockwise seen from outside; with the Y-flipping
/// projection that stays counter-clockwise on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    /// Draw both sides
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Shader program and the fixed-function state it is drawn with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Id draw groups refer to
    pub id: ShaderId,
    /// Name for logs
    pub name: String,
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
    /// Alpha blending on the colour attachment
    pub blending: bool,
    /// Depth test and depth write
    pub depth_test: bool,
    /// Which faces the rasterizer discards
    #[serde(default)]
    pub cull_mode: CullMode,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(
        id: ShaderId,
        name: impl Into<String>,
        vertex_path: impl Into<String>,
        fragment_path: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
            blending: false,
            depth_test: true,
            cull_mode: CullMode::Back,
        }
    }

    /// Enable or disable alpha blending
    pub fn with_blending(mut self, blending: bool) -> Self {
        self.blending = blending;
        self
    }

    /// Enable or disable depth testing
    pub fn with_depth_test(mut self, depth_test: bool) -> Self {
        self.depth_test = depth_test;
        self
    }

    /// Set the face culling mode
    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }
}

/// Complete configuration of the frame pipeline and its backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation and the window title
    pub application_name: String,
    /// Frames the GPU may work on concurrently
    pub frames_in_flight: usize,
    /// Instances one frame slot can hold
    pub max_instance_count: usize,
    /// Target frames per second; `None` runs unpaced
    pub frame_rate_target: Option<u32>,
    /// Handling of zero-instance draw groups
    pub empty_group_policy: EmptyGroupPolicy,
    /// Fallback clear colour before the first frame
    pub clear_color: [f32; 3],
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Mesh set
    pub meshes: Vec<MeshSlotConfig>,
    /// Texture set
    pub textures: Vec<TextureSlotConfig>,
    /// Shader set
    pub shaders: Vec<ShaderConfig>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Neon".to_string(),
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            max_instance_count: 4096,
            frame_rate_target: Some(60),
            empty_group_policy: EmptyGroupPolicy::Skip,
            clear_color: [0.02, 0.02, 0.05],
            enable_validation: None,
            meshes: vec![
                MeshSlotConfig {
                    id: MeshId(0),
                    name: "sphere".to_string(),
                    shape: PrimitiveShape::Sphere { segments: 32, rings: 16 },
                },
                MeshSlotConfig {
                    id: MeshId(1),
                    name: "cube".to_string(),
                    shape: PrimitiveShape::Cube,
                },
                MeshSlotConfig {
                    id: MeshId(2),
                    name: "plane".to_string(),
                    shape: PrimitiveShape::Plane,
                },
            ],
            textures: vec![
                TextureSlotConfig {
                    id: TextureId(0),
                    name: "white".to_string(),
                    source: TextureSource::Solid([255, 255, 255, 255]),
                },
                TextureSlotConfig {
                    id: TextureId(1),
                    name: "grid".to_string(),
                    source: TextureSource::Checker {
                        size: 64,
                        cell: 8,
                        a: [255, 255, 255, 255],
                        b: [96, 96, 96, 255],
                    },
                },
            ],
            shaders: vec![
                ShaderConfig::new(ShaderId(0), "lit", "target/shaders/lit.vert.spv", "target/shaders/lit.frag.spv"),
                ShaderConfig::new(ShaderId(1), "ui", "target/shaders/ui.vert.spv", "target/shaders/ui.frag.spv")
                    .with_blending(true)
                    .with_depth_test(false)
                    .with_cull_mode(CullMode::None),
            ],
        }
    }
}

impl Config for RendererConfig {}

impl RendererConfig {
    /// Create a default configuration with the given application name
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    /// Set the frames-in-flight bound
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the per-slot instance capacity
    pub fn with_max_instances(mut self, count: usize) -> Self {
        self.max_instance_count = count;
        self
    }

    /// Set the empty-group policy
    pub fn with_empty_group_policy(mut self, policy: EmptyGroupPolicy) -> Self {
        self.empty_group_policy = policy;
        self
    }

    /// Set the frame-rate target
    pub fn with_frame_rate_target(mut self, fps: Option<u32>) -> Self {
        self.frame_rate_target = fps;
        self
    }

    /// Whether validation layers should be on for this build
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Check values that would make the pipeline unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("frames_in_flight must be at least 1".to_string()));
        }
        if self.max_instance_count == 0 {
            return Err(ConfigError::Invalid("max_instance_count must be at least 1".to_string()));
        }
        if u32::try_from(self.max_instance_count).is_err() {
            return Err(ConfigError::Invalid(format!(
                "max_instance_count {} does not fit a 32-bit instance index",
                self.max_instance_count
            )));
        }
        if self.frame_rate_target == Some(0) {
            return Err(ConfigError::Invalid("frame_rate_target must be positive".to_string()));
        }
        if self.meshes.is_empty() {
            return Err(ConfigError::Invalid("at least one mesh is required".to_string()));
        }
        if self.shaders.is_empty() {
            return Err(ConfigError::Invalid("at least one shader is required".to_string()));
        }
        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::Invalid(format!("clear_color {:?} outside [0, 1]", self.clear_color)));
        }

        check_unique("mesh", self.meshes.iter().map(|mesh| mesh.id.0))?;
        check_unique("texture", self.textures.iter().map(|texture| texture.id.0))?;
        check_unique("shader", self.shaders.iter().map(|shader| shader.id.0))?;
        Ok(())
    }
}

fn check_unique(kind: &str, ids: impl Iterator<Item = u32>) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::Invalid(format!("duplicate {} id {}", kind, id)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        config.validate().unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.frame_rate_target, Some(60));
        assert_eq!(config.empty_group_policy, EmptyGroupPolicy::Skip);
    }

    #[test]
    fn test_ui_shader_draws_both_sides() {
        let config = RendererConfig::default();
        assert_eq!(config.shaders[0].cull_mode, CullMode::Back);
        // UI quads skip the projection flip, so their winding reverses on screen
        assert_eq!(config.shaders[1].cull_mode, CullMode::None);
    }

    #[test]
    fn test_cull_mode_defaults_to_back_when_omitted() {
        let lit = r#"
            id = 0
            name = "lit"
            vertex_shader_path = "lit.vert.spv"
            fragment_shader_path = "lit.frag.spv"
            blending = false
            depth_test = true
        "#;
        let shader: ShaderConfig = toml::from_str(lit).unwrap();
        assert_eq!(shader.cull_mode, CullMode::Back);

        let ui: ShaderConfig = toml::from_str(&format!("{}\ncull_mode = \"none\"", lit)).unwrap();
        assert_eq!(ui.cull_mode, CullMode::None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            RendererConfig::default().with_frames_in_flight(0),
            RendererConfig::default().with_max_instances(0),
            RendererConfig::default().with_frame_rate_target(Some(0)),
            RendererConfig {
                meshes: Vec::new(),
                ..RendererConfig::default()
            },
            RendererConfig {
                clear_color: [2.0, 0.0, 0.0],
                ..RendererConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let mut config = RendererConfig::default();
        let duplicate = config.shaders[0].clone();
        config.shaders.push(duplicate);

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("duplicate shader id 0"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RendererConfig::from_str_as(
            "application_name = \"demo\"\nmax_instance_count = 128\nempty_group_policy = \"reject\"\n",
            ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(config.application_name, "demo");
        assert_eq!(config.max_instance_count, 128);
        assert_eq!(config.empty_group_policy, EmptyGroupPolicy::Reject);
        assert_eq!(config.shaders.len(), 2);
    }

    #[test]
    fn test_texture_sources() {
        assert_eq!(TextureSource::Solid([1, 2, 3, 4]).build().pixels, vec![1, 2, 3, 4]);
        let checker = TextureSource::Checker {
            size: 8,
            cell: 4,
            a: [0; 4],
            b: [255; 4],
        };
        assert_eq!(checker.build().width, 8);
    }

    #[test]
    fn test_validation_override() {
        let config = RendererConfig {
            enable_validation: Some(false),
            ..RendererConfig::default()
        };
        assert!(!config.validation_enabled());
    }
}
