//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::entities::MediaKind;

const APP_NAME: &str = "mediacache";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Minimum number of render workers.
pub const MIN_WORKERS: usize = 2;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// In-memory cache and worker pool.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Persisted thumbnail generation.
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    /// Placeholder rendering.
    #[serde(default)]
    pub render: RenderConfig,
}

/// Cache budget, worker pool and sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Budget in KB of estimated decoded pixels.
    #[serde(default = "default_budget_kb")]
    pub budget_kb: u64,

    /// Render workers; defaults to the host parallelism.
    #[serde(default)]
    pub workers: Option<usize>,

    /// Seconds between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Entries idle for longer than this are swept.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Capacity of the worker completion channel.
    #[serde(default = "default_completion_capacity")]
    pub completion_capacity: usize,
}

impl CacheConfig {
    /// Effective worker count, never below [`MIN_WORKERS`].
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism().map_or(MIN_WORKERS, NonZeroUsize::get)
            })
            .max(MIN_WORKERS)
    }

    /// Interval of the recurring expiry sweep.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Idle threshold used by the expiry sweep.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_kb: default_budget_kb(),
            workers: None,
            sweep_interval_secs: default_sweep_interval_secs(),
            max_age_secs: default_max_age_secs(),
            completion_capacity: default_completion_capacity(),
        }
    }
}

/// Persisted thumbnail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Output directory; created on demand.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Square edge of generated thumbnails.
    #[serde(default = "default_thumbnail_size")]
    pub size: u32,
}

impl ThumbnailConfig {
    /// Returns the configured directory or the platform cache location.
    #[must_use]
    pub fn effective_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_thumbnail_dir)
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            dir: None,
            size: default_thumbnail_size(),
        }
    }
}

/// Placeholder rendering settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    /// TrueType/OpenType font overriding the bundled caption font.
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// Localized caption strings.
    #[serde(default)]
    pub labels: Labels,
}

/// Localized strings drawn into placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels {
    /// Name of still images.
    #[serde(default = "default_image_label")]
    pub image: String,

    /// Name of videos.
    #[serde(default = "default_video_label")]
    pub video: String,

    /// Name of other attachments.
    #[serde(default = "default_file_label")]
    pub file: String,

    /// Expired caption; `{media}` is replaced by the media name.
    #[serde(default = "default_expired_label")]
    pub expired: String,
}

impl Labels {
    /// Localized media name.
    #[must_use]
    pub fn media_name(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.image,
            MediaKind::Video => &self.video,
            MediaKind::File => &self.file,
        }
    }

    /// Localized "expired or removed" caption.
    #[must_use]
    pub fn expired_text(&self, kind: MediaKind) -> String {
        self.expired.replace("{media}", self.media_name(kind))
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            image: default_image_label(),
            video: default_video_label(),
            file: default_file_label(),
            expired: default_expired_label(),
        }
    }
}

const fn default_budget_kb() -> u64 {
    200 * 1024
}

const fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

const fn default_max_age_secs() -> u64 {
    30 * 60
}

const fn default_completion_capacity() -> usize {
    256
}

const fn default_thumbnail_size() -> u32 {
    200
}

fn default_image_label() -> String {
    "image".to_string()
}

fn default_video_label() -> String {
    "video".to_string()
}

fn default_file_label() -> String {
    "file".to_string()
}

fn default_expired_label() -> String {
    "{media} expired or removed".to_string()
}

pub(super) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

fn default_thumbnail_dir() -> PathBuf {
    project_dirs().map_or_else(
        || std::env::temp_dir().join(APP_NAME).join("thumbnails"),
        |dirs| dirs.cache_dir().join("thumbnails"),
    )
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(budget_kb) = args.cache_budget_kb {
            self.cache.budget_kb = budget_kb;
        }
        if let Some(workers) = args.workers {
            self.cache.workers = Some(workers);
        }
        if let Some(dir) = &args.thumbnail_dir {
            self.thumbnails.dir = Some(dir.clone());
        }
        if let Some(font) = &args.font {
            self.render.font_path = Some(font.clone());
        }
    }

    /// Returns effective log path. Logs go to stderr when unset.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone()
    }
}
