//! Media resource engine: rendering, caching and background jobs.

mod fs_source;
mod manager;
mod memory_cache;
pub mod overlay;
mod render;
mod task_runner;
mod thumbnail_writer;

pub use fs_source::FsMediaSource;
pub use manager::{FAILED_CAPACITY, MediaEvent, MediaLookup, MediaManager};
pub use memory_cache::{CacheEntry, CacheStats, DEFAULT_BUDGET_KB, MediaStore, estimate_cost_kb};
pub use overlay::TextPainter;
pub use render::{DEFAULT_AVATAR_EDGE, DEFAULT_THUMBNAIL_EDGE, Renderer, scale_to_fit};
pub use task_runner::{Completion, RenderJob, TaskRunner};
pub use thumbnail_writer::{ThumbnailEvent, ThumbnailWriter};
