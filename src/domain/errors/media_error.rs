//! Media engine error types.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = std::result::Result<T, MediaError>;

/// Errors produced while loading, rendering or persisting media.
///
/// Payloads are plain strings so results can be cloned across the
/// worker/owner boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// No source path was supplied.
    #[error("empty source path")]
    EmptyPath,
    /// Source file does not exist.
    #[error("source not found: {0}")]
    NotFound(String),
    /// Source file exists but cannot be opened.
    #[error("source unreadable: {0}")]
    Unreadable(String),
    /// Bytes could not be decoded as an image.
    #[error("decode error: {0}")]
    Decode(String),
    /// Rendered thumbnail could not be written.
    #[error("persist error: {0}")]
    Persist(String),
    /// Size string could not be parsed.
    #[error("invalid size: {0}")]
    InvalidSize(String),
    /// The worker pool no longer accepts jobs.
    #[error("worker pool is shut down")]
    ShutDown,
    /// No async runtime available to run jobs on.
    #[error("runtime error: {0}")]
    Runtime(String),
    /// Caption font could not be loaded.
    #[error("font error: {0}")]
    Font(String),
}

impl MediaError {
    /// Returns true if the source file itself is missing or unreadable.
    #[must_use]
    pub const fn is_missing_source(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Unreadable(_) | Self::EmptyPath)
    }
}
