//! Port for reading source media from durable storage.

use std::path::Path;
use std::time::SystemTime;

use image::DynamicImage;

use crate::domain::errors::MediaResult;

/// Access to original files and pre-rendered icons.
/// Implementations must be thread-safe; they are called from worker threads.
#[cfg_attr(test, mockall::automock)]
pub trait MediaSourcePort: Send + Sync {
    /// Returns true if the path names a regular file that can be opened.
    fn is_readable(&self, path: &Path) -> bool;

    /// Reads and decodes the image at `path`.
    ///
    /// # Errors
    /// Returns `NotFound`/`Unreadable` for missing files and `Decode` for
    /// corrupt or unsupported bytes.
    fn decode(&self, path: &Path) -> MediaResult<DynamicImage>;

    /// Returns the last modification time of `path`.
    ///
    /// # Errors
    /// Returns `NotFound`/`Unreadable` if the file cannot be inspected.
    fn modified(&self, path: &Path) -> MediaResult<SystemTime>;
}
