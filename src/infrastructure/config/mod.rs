//! Application configuration.

/// Configuration model and defaults.
pub mod app_config;
/// Command line interface.
pub mod args;
/// Config file persistence.
pub mod storage;

pub use app_config::{AppConfig, CacheConfig, Labels, LogLevel, RenderConfig, ThumbnailConfig};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, StorageManager};
