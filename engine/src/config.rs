//! Engine configuration.
//!
//! Everything has a default, so a missing file is not an error. A TOML file
//! only needs the keys it wants to override:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! frames_in_flight = 3
//! validation = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::*;
use serde::Deserialize;
use vulkanalia::vk;

use crate::vulkan::constants;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Textured Quad".to_string(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of per-frame slots the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,
    pub validation: bool,
    pub validation_layer: String,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: constants::MAX_FRAMES_IN_FLIGHT,
            validation: constants::VALIDATION_ENABLED,
            validation_layer: constants::VALIDATION_LAYER_NAME.to_string(),
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
            texture: PathBuf::from("textures/texture.png"),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl EngineConfig {
    pub fn parse(source: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at `{}`, using defaults.", path.display());
            return Ok(Self::default());
        }

        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config `{}`.", path.display()))?;
        let config = Self::parse(&source)
            .with_context(|| format!("Invalid config `{}`.", path.display()))?;
        info!("Loaded config from `{}`.", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.renderer.frames_in_flight == 0 {
            return Err(anyhow!("`renderer.frames_in_flight` must be at least 1."));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(anyhow!("Window dimensions must be non-zero."));
        }

        // Layer names are fixed-size NUL-terminated arrays in Vulkan.
        let layer = &self.renderer.validation_layer;
        if layer.is_empty()
            || layer.contains('\0')
            || layer.len() >= vk::MAX_EXTENSION_NAME_SIZE as usize
        {
            return Err(anyhow!(
                "`renderer.validation_layer` must be a non-empty layer name shorter than {} bytes without NUL characters.",
                vk::MAX_EXTENSION_NAME_SIZE
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.renderer.frames_in_flight, 2);
        assert_eq!(config.renderer.validation_layer, "VK_LAYER_KHRONOS_validation");
        assert_eq!(config.renderer.vertex_shader, PathBuf::from("shaders/vert.spv"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::parse(
            r#"
            [window]
            width = 1280

            [renderer]
            frames_in_flight = 3
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Textured Quad");
        assert_eq!(config.renderer.frames_in_flight, 3);
        assert_eq!(config.renderer.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let error = EngineConfig::parse("[renderer]\nframes_in_flight = 0\n").unwrap_err();
        assert!(error.to_string().contains("frames_in_flight"));
    }

    #[test]
    fn unrepresentable_layer_names_are_rejected() {
        let long = format!("[renderer]\nvalidation_layer = \"{}\"\n", "L".repeat(300));
        let error = EngineConfig::parse(&long).unwrap_err();
        assert!(error.to_string().contains("validation_layer"));

        let nul = "[renderer]\nvalidation_layer = \"VK_LAYER_KHRONOS\\u0000validation\"\n";
        assert!(EngineConfig::parse(nul).is_err());

        assert!(EngineConfig::parse("[renderer]\nvalidation_layer = \"\"\n").is_err());

        let longest = format!("[renderer]\nvalidation_layer = \"{}\"\n", "L".repeat(255));
        assert!(EngineConfig::parse(&longest).is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_or_default("does/not/exist.toml").unwrap();
        assert_eq!(config.renderer.texture, PathBuf::from("textures/texture.png"));
    }
}
