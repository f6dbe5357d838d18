//! Configuration system
//!
//! Engine settings are plain serde structs that can be read from and written to
//! TOML or RON files, selected by file extension.

pub use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Load configuration from file, falling back to defaults on any failure
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("Using default configuration ({:?}: {})", path, e);
                Self::default()
            }
        }
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// # Engine Configuration
///
/// Build-time switches and asset locations shared by the asset pipeline and
/// the simulation world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether geometry is uploaded to the GPU (`false` = headless, CPU-side points only)
    pub renderable: bool,
    /// Publish property change events for every property, not only always-publish ones
    pub publish_changes: bool,
    /// Root directory of asset files
    pub asset_root: PathBuf,
    /// Forward PBR shader file, relative to the asset root
    pub forward_shader_path: PathBuf,
    /// Deferred second-pass shader file, relative to the asset root
    pub deferred_shader_path: PathBuf,
    /// Maximum number of lights uploaded per draw
    pub lights_max: usize,
    /// `env_logger` filter directive
    pub log_filter: String,
    /// Substitute fallback assets when a model fails to load
    pub fallback_to_defaults: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            renderable: true,
            publish_changes: false,
            asset_root: PathBuf::from("assets"),
            forward_shader_path: PathBuf::from("shaders/pbr_forward.glsl"),
            deferred_shader_path: PathBuf::from("shaders/pbr_deferred2.glsl"),
            lights_max: 8,
            log_filter: "info".to_string(),
            fallback_to_defaults: true,
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Configuration for running without a graphics context
    pub fn headless() -> Self {
        Self {
            renderable: false,
            ..Self::default()
        }
    }

    /// Resolve a path relative to the asset root
    pub fn asset_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.asset_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let config = EngineConfig {
            publish_changes: true,
            lights_max: 4,
            ..EngineConfig::headless()
        };
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert!(!loaded.renderable);
        assert!(loaded.publish_changes);
        assert_eq!(loaded.lights_max, 4);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.ron");
        std::fs::write(&path, "(renderable: false, log_filter: \"debug\")").unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert!(!loaded.renderable);
        assert_eq!(loaded.log_filter, "debug");
        assert_eq!(loaded.lights_max, EngineConfig::default().lights_max);
    }

    #[test]
    fn test_unsupported_and_missing_files() {
        assert!(matches!(
            EngineConfig::load_from_file("engine.ini"),
            Err(ConfigError::Io(_)) | Err(ConfigError::UnsupportedFormat(_))
        ));
        let fallback = EngineConfig::load_or_default("does/not/exist.toml");
        assert!(fallback.renderable);
    }
}
