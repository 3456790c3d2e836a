//! Filesystem-backed media source.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use image::{DynamicImage, ImageReader};
use tracing::trace;

use crate::domain::errors::{MediaError, MediaResult};
use crate::domain::ports::MediaSourcePort;

/// Reads originals and icons straight from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMediaSource;

impl FsMediaSource {
    /// Creates a new source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn io_error(path: &Path, e: &std::io::Error) -> MediaError {
    if e.kind() == ErrorKind::NotFound {
        MediaError::NotFound(path.display().to_string())
    } else {
        MediaError::Unreadable(format!("{}: {e}", path.display()))
    }
}

impl MediaSourcePort for FsMediaSource {
    fn is_readable(&self, path: &Path) -> bool {
        if path.as_os_str().is_empty() {
            return false;
        }
        fs::File::open(path)
            .and_then(|file| file.metadata())
            .is_ok_and(|meta| meta.is_file())
    }

    fn decode(&self, path: &Path) -> MediaResult<DynamicImage> {
        if path.as_os_str().is_empty() {
            return Err(MediaError::EmptyPath);
        }

        let reader = ImageReader::open(path)
            .map_err(|e| io_error(path, &e))?
            .with_guessed_format()
            .map_err(|e| io_error(path, &e))?;

        let image = reader
            .decode()
            .map_err(|e| MediaError::Decode(format!("{}: {e}", path.display())))?;

        trace!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Decoded source image"
        );
        Ok(image)
    }

    fn modified(&self, path: &Path) -> MediaResult<SystemTime> {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|e| io_error(path, &e))
    }
}
