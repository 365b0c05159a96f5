//! Settings consumed by `Context::initialize`

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::backend::BackendType;

/// Presentation swap interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapIntervalMode {
    /// Present immediately (no vsync)
    Immediate,
    /// Wait for vertical blank
    Vsync,
    /// Vsync, but tear when a frame is late (falls back to `Vsync` if refused)
    AdaptiveVsync,
}

impl SwapIntervalMode {
    /// Interval value understood by swap-interval extensions
    pub fn interval(self) -> i32 {
        match self {
            SwapIntervalMode::Immediate => 0,
            SwapIntervalMode::Vsync => 1,
            SwapIntervalMode::AdaptiveVsync => -1,
        }
    }
}

/// # Graphics Settings
///
/// The parameters of `Context::initialize`: which backend to build and how
/// to configure it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicsSettings {
    /// Backend to construct
    pub backend: BackendType,
    /// MSAA sample count (0 or 1 disables)
    pub antialiasing: u32,
    /// Swap interval requested from the context
    pub swap_interval: SwapIntervalMode,
    /// Texture LOD bias patched into shaders that declare it
    pub mip_lod_bias: Option<f32>,
    /// Edge length of the shadow map in pixels
    pub shadow_map_resolution: u32,
}

impl GraphicsSettings {
    /// Defaults for the given backend
    pub fn new(backend: BackendType) -> Self {
        Self {
            backend,
            antialiasing: 0,
            swap_interval: SwapIntervalMode::Vsync,
            mip_lod_bias: None,
            shadow_map_resolution: 2048,
        }
    }

    /// Set the MSAA sample count
    pub fn with_antialiasing(mut self, samples: u32) -> Self {
        self.antialiasing = samples;
        self
    }

    /// Set the swap interval
    pub fn with_swap_interval(mut self, mode: SwapIntervalMode) -> Self {
        self.swap_interval = mode;
        self
    }

    /// Set the LOD bias patched into shaders
    pub fn with_mip_lod_bias(mut self, bias: f32) -> Self {
        self.mip_lod_bias = Some(bias);
        self
    }

    /// Set the shadow map resolution
    pub fn with_shadow_map_resolution(mut self, resolution: u32) -> Self {
        self.shadow_map_resolution = resolution;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shadow_map_resolution == 0 {
            return Err(ConfigError::Invalid("Shadow map resolution cannot be 0".to_string()));
        }
        if let Some(bias) = self.mip_lod_bias {
            if !bias.is_finite() {
                return Err(ConfigError::Invalid(format!("Mip LOD bias must be finite, got {bias}")));
            }
        }
        if self.antialiasing > 64 {
            return Err(ConfigError::Invalid(format!(
                "Antialiasing sample count {} is out of range",
                self.antialiasing
            )));
        }
        Ok(())
    }
}

impl Default for GraphicsSettings {
    fn default() -> Self {
        Self::new(BackendType::OpenGl)
    }
}

/// # Asset Settings
///
/// Where the virtual asset filesystem looks for data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSettings {
    /// Search roots, highest priority first
    pub roots: Vec<String>,
    /// Data-relative path of the compression override file
    pub compression_overrides: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            roots: vec!["resources".to_string()],
            compression_overrides: "texture_compression_overrides.txt".to_string(),
        }
    }
}

/// # Context Settings
///
/// Top-level configuration file for applications embedding the graphics layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Application name passed to drivers that want one
    pub application_name: String,
    /// Backend parameters
    pub graphics: GraphicsSettings,
    /// Asset filesystem parameters
    pub assets: AssetSettings,
}

impl ContextSettings {
    /// Create settings with defaults for the given application
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            graphics: GraphicsSettings::default(),
            assets: AssetSettings::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets.roots.is_empty() {
            return Err(ConfigError::Invalid("At least one asset root is required".to_string()));
        }
        self.graphics.validate()
    }
}

impl Config for ContextSettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_validate() {
        let settings = ContextSettings::new("probe");
        assert!(settings.validate().is_ok());
        assert_eq!(settings.graphics.backend, BackendType::OpenGl);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let graphics = GraphicsSettings::new(BackendType::Null).with_shadow_map_resolution(0);
        assert!(graphics.validate().is_err());

        let graphics = GraphicsSettings::new(BackendType::Null).with_mip_lod_bias(f32::NAN);
        assert!(graphics.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphics.toml");
        let path = path.to_str().unwrap();

        let mut settings = ContextSettings::new("probe");
        settings.graphics = GraphicsSettings::new(BackendType::Vulkan)
            .with_antialiasing(4)
            .with_mip_lod_bias(-0.5);
        settings.save_to_file(path).unwrap();

        let loaded = ContextSettings::load_from_file(path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = ContextSettings::load_from_file("settings.ini");
        assert!(result.is_err());
    }

    #[test]
    fn test_swap_interval_values() {
        assert_eq!(SwapIntervalMode::Immediate.interval(), 0);
        assert_eq!(SwapIntervalMode::Vsync.interval(), 1);
        assert_eq!(SwapIntervalMode::AdaptiveVsync.interval(), -1);
    }
}
