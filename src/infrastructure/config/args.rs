use super::app_config::LogLevel;
use crate::domain::entities::{MediaCategory, MediaSize};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "mediacache",
    version,
    about = "Warm the media cache and generate chat thumbnails",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum, global = true)]
    pub log_level: Option<LogLevel>,

    /// Cache budget in KB.
    #[arg(long, value_name = "KB", global = true)]
    pub cache_budget_kb: Option<u64>,

    /// Number of render workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Directory for generated thumbnails.
    #[arg(long, value_name = "PATH", global = true)]
    pub thumbnail_dir: Option<PathBuf>,

    /// Font overriding the bundled caption font.
    #[arg(long, value_name = "PATH", global = true)]
    pub font: Option<PathBuf>,

    /// Operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Preload files into the in-memory cache and report statistics.
    Warm {
        /// Source files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Presentation to render.
        #[arg(long, value_enum, default_value_t = MediaCategory::ImageThumbnail)]
        category: MediaCategory,

        /// Output bounds, `WxH`, `N` or `natural`.
        #[arg(long, default_value = "128x128")]
        size: MediaSize,

        /// Corner radius for avatars.
        #[arg(long, default_value_t = 0)]
        radius: u32,

        /// Pre-rendered icons, matched to sources by position.
        #[arg(long = "icon", value_name = "PATH")]
        icons: Vec<PathBuf>,
    },
    /// Generate thumbnail files into the thumbnail directory.
    Thumbnail {
        /// Source files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output bounds; defaults to the configured thumbnail size.
        #[arg(long)]
        size: Option<MediaSize>,

        /// Treat sources as videos.
        #[arg(long)]
        video: bool,

        /// Explicit output name (single source only).
        #[arg(long)]
        name: Option<String>,
    },
}
