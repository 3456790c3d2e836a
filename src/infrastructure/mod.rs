//! Infrastructure layer with filesystem adapters and the media engine.

/// Application configuration.
pub mod config;
/// Media cache, renderer and background jobs.
pub mod media;

pub use config::{AppConfig, CliArgs, Command, LogLevel, StorageManager};
pub use media::{
    CacheStats, FsMediaSource, MediaEvent, MediaLookup, MediaManager, Renderer, ThumbnailEvent,
    ThumbnailWriter,
};
