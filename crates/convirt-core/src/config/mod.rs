//! Configuration management.
//!
//! Configuration is loaded from the platform config directory
//! (`config.toml`) with defaults matching the pretrained checkpoint.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Dual encoder settings
    pub model: ModelConfig,

    /// Prompt generation settings
    pub prompts: PromptsConfig,

    /// Evaluation loop settings
    pub evaluation: EvaluationConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.convirt.convirt/config.toml
    /// - Linux: ~/.config/convirt/config.toml
    ///
    /// Falls back to ~/.convirt/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "convirt", "convirt")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".convirt").join("config.toml")
            })
    }

    /// Resolved model directory (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Resolved data directory (with ~ expansion).
    pub fn data_dir(&self) -> PathBuf {
        expand(&self.general.data_dir)
    }

    /// Directory of the configured checkpoint.
    pub fn checkpoint_dir(&self) -> PathBuf {
        let checkpoint = Path::new(&self.model.checkpoint);
        if checkpoint.is_absolute() {
            checkpoint.to_path_buf()
        } else {
            self.model_dir().join(checkpoint)
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Expand a leading `~` in a path.
pub fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}
