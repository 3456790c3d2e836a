//! Reading and writing `config.toml`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::{AppConfig, project_dirs};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform config directory could be determined.
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration could not be serialized.
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Owns the location of the configuration file.
#[derive(Debug, Clone)]
pub struct StorageManager {
    config_file: PathBuf,
}

impl StorageManager {
    /// Uses `config.toml` in the platform config directory.
    ///
    /// # Errors
    /// Returns `ConfigDirNotFound` when the platform has no home directory.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = project_dirs().ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(Self::with_dir(dirs.config_dir().to_path_buf()))
    }

    /// Uses `config.toml` inside `dir`.
    #[must_use]
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            config_file: dir.join(CONFIG_FILE_NAME),
        }
    }

    /// Loads the configuration from `path_override` or the managed file.
    ///
    /// A missing file is created with defaults. A malformed one is left
    /// untouched and defaults are used for this run.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or the defaults cannot be written.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let path = path_override.unwrap_or(&self.config_file);

        if !path.exists() {
            info!(path = %path.display(), "No config file, writing defaults");
            let config = AppConfig::default();
            write_atomically(path, &config)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        toml::from_str::<AppConfig>(&content).or_else(|e| {
            warn!(path = %path.display(), error = %e, "Malformed config file, using defaults");
            Ok(AppConfig::default())
        })
    }

    /// Writes `config` to the managed file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be written.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        write_atomically(&self.config_file, config)
    }
}

fn write_atomically(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent)?;
    staged.write_all(content.as_bytes())?;
    staged.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "Config written");
    Ok(())
}
