// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every field has a default, so a missing or partial config file still
// produces a usable configuration. The core only consumes `ProgramConfig`;
// the rest is for the binary and the demo renderer.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Program".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub preferred_color_format: String,
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            preferred_color_format: "r8g8b8a8_unorm".to_string(),
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub enable_diagnostics: bool,
    /// Also subscribe to information and debug reports
    pub verbose_diagnostics: bool,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_diagnostics: cfg!(debug_assertions),
            verbose_diagnostics: false,
            show_fps: true,
        }
    }
}

/// The options the bootstrapper recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramConfig {
    pub app_name: String,
    /// Toggles the diagnostic channel and the validation layer/extension.
    pub enable_diagnostics: bool,
    pub verbose_diagnostics: bool,
    pub preferred_color_format: vk::Format,
    /// Log the frame rate once per second while running.
    pub show_fps: bool,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Program".to_string(),
            enable_diagnostics: false,
            verbose_diagnostics: false,
            preferred_color_format: vk::Format::R8G8B8A8_UNORM,
            show_fps: false,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn program_config(&self) -> ProgramConfig {
        ProgramConfig {
            app_name: self.window.title.clone(),
            enable_diagnostics: self.debug.enable_diagnostics,
            verbose_diagnostics: self.debug.verbose_diagnostics,
            preferred_color_format: self.get_color_format(),
            show_fps: self.debug.show_fps,
        }
    }

    /// Get preferred colour format as Vulkan enum
    pub fn get_color_format(&self) -> vk::Format {
        match self.graphics.preferred_color_format.to_lowercase().as_str() {
            "r8g8b8a8_unorm" => vk::Format::R8G8B8A8_UNORM,
            "r8g8b8a8_srgb" => vk::Format::R8G8B8A8_SRGB,
            "b8g8r8a8_unorm" => vk::Format::B8G8R8A8_UNORM,
            "b8g8r8a8_srgb" => vk::Format::B8G8R8A8_SRGB,
            "a2b10g10r10_unorm" => vk::Format::A2B10G10R10_UNORM_PACK32,
            "r16g16b16a16_sfloat" => vk::Format::R16G16B16A16_SFLOAT,
            _ => {
                log::warn!(
                    "Unknown colour format '{}', defaulting to R8G8B8A8_UNORM",
                    self.graphics.preferred_color_format
                );
                vk::Format::R8G8B8A8_UNORM
            }
        }
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.get_color_format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
        assert!(config.debug.show_fps);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [graphics]
            preferred_color_format = "B8G8R8A8_SRGB"
            present_mode = "mailbox"

            [debug]
            enable_diagnostics = true
            verbose_diagnostics = true
            "#,
        )
        .unwrap();

        let program = config.program_config();
        assert_eq!(program.preferred_color_format, vk::Format::B8G8R8A8_SRGB);
        assert!(program.enable_diagnostics);
        assert!(program.verbose_diagnostics);
        assert_eq!(program.app_name, "Vulkan Program");
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
    }

    #[test]
    fn unknown_names_fall_back() {
        let config = Config::parse(
            r#"
            [graphics]
            preferred_color_format = "r5g6b5"
            present_mode = "vsync-ish"
            "#,
        )
        .unwrap();
        assert_eq!(config.get_color_format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(config.get_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::parse("[window\nwidth = ").is_err());
    }

    #[test]
    fn program_config_defaults_to_rgba8_without_diagnostics() {
        let program = ProgramConfig::default();
        assert!(!program.enable_diagnostics);
        assert_eq!(program.preferred_color_format, vk::Format::R8G8B8A8_UNORM);
    }
}
