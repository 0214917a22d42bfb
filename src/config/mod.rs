use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::stream::StreamOptions;

/// What to do when a frame run fails to decode mid-stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeErrorPolicy {
    /// Stop rendering and report the failure
    Abort,
    /// Write silence over the failing run and carry on after it
    Silence,
}

/// Decoder configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Times the loop region plays in total; 0 loops forever
    pub loop_count: u32,
    pub ignore_loop: bool,
    pub capture_loop_snapshot: bool,
    pub error_policy: DecodeErrorPolicy,
    pub max_consecutive_failures: u32,
    /// Samples per channel requested from the stream per render call
    pub render_chunk: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            loop_count: 2,
            ignore_loop: false,
            capture_loop_snapshot: true,
            error_policy: DecodeErrorPolicy::Abort,
            max_consecutive_failures: 8,
            render_chunk: 4096,
        }
    }
}

impl DecoderConfig {
    /// Stream options for this configuration; `loop_count` plays count as jumps plus one
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            loop_limit: match self.loop_count {
                0 => None,
                count => Some(count - 1),
            },
            ignore_loop: self.ignore_loop,
            capture_loop_snapshot: self.capture_loop_snapshot,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: DecoderConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::with_path(config_path)
    }

    /// Manager backed by an explicit file; a missing file yields the defaults
    pub fn with_path(config_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.into();
        let config = Self::load_config(&config_path)?;
        Ok(Self { config, config_path })
    }

    pub fn get_config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut DecoderConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_loop_count(&mut self, loop_count: u32) -> Result<(), ConfigError> {
        self.config.loop_count = loop_count;
        self.save_config()
    }

    pub fn set_error_policy(&mut self, policy: DecodeErrorPolicy) -> Result<(), ConfigError> {
        self.config.error_policy = policy;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = DecoderConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("gastream");

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<DecoderConfig, ConfigError> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(DecoderConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: DecoderConfig =
            toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content =
            toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let config_manager = ConfigManager::with_path(config_path).unwrap();
        (config_manager, temp_dir)
    }

    #[test]
    fn test_decoder_config_default() {
        let config = DecoderConfig::default();

        assert_eq!(config.loop_count, 2);
        assert!(!config.ignore_loop);
        assert!(config.capture_loop_snapshot);
        assert_eq!(config.error_policy, DecodeErrorPolicy::Abort);
        assert_eq!(config.max_consecutive_failures, 8);
        assert_eq!(config.render_chunk, 4096);
    }

    #[test]
    fn test_stream_options_from_loop_count() {
        let mut config = DecoderConfig::default();
        assert_eq!(config.stream_options().loop_limit, Some(1));

        config.loop_count = 0;
        assert_eq!(config.stream_options().loop_limit, None);

        config.loop_count = 1;
        config.ignore_loop = true;
        let options = config.stream_options();
        assert_eq!(options.loop_limit, Some(0));
        assert!(options.ignore_loop);
    }

    #[test]
    fn test_config_serialization() {
        let config = DecoderConfig {
            loop_count: 5,
            ignore_loop: true,
            capture_loop_snapshot: false,
            error_policy: DecodeErrorPolicy::Silence,
            max_consecutive_failures: 3,
            render_chunk: 1024,
        };

        let serialized = toml::to_string(&config).unwrap();
        assert!(serialized.contains("error_policy = \"silence\""));
        let deserialized: DecoderConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: DecoderConfig = toml::from_str("loop_count = 4\n").unwrap();
        assert_eq!(config.loop_count, 4);
        assert_eq!(config.render_chunk, 4096);
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();

        config_manager.set_loop_count(3).unwrap();
        config_manager.set_error_policy(DecodeErrorPolicy::Silence).unwrap();

        let loaded = ConfigManager::with_path(config_manager.config_path()).unwrap();
        assert_eq!(loaded.get_config().loop_count, 3);
        assert_eq!(loaded.get_config().error_policy, DecodeErrorPolicy::Silence);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp_dir.path().join("nested").join("config.toml")).unwrap();
        assert_eq!(manager.get_config(), &DecoderConfig::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "loop_count = \"many\"").unwrap();
        assert!(matches!(
            ConfigManager::with_path(&path),
            Err(ConfigError::DeserializationError(_))
        ));
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut config_manager, _temp_dir) = create_test_config_manager();
        config_manager.update_config(|c| c.render_chunk = 64).unwrap();
        config_manager.reset_to_defaults().unwrap();
        assert_eq!(config_manager.get_config(), &DecoderConfig::default());
        assert!(config_manager.config_path().exists());
    }
}
