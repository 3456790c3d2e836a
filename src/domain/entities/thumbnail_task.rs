//! Requests to generate and persist a named thumbnail file.

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use super::media::MediaSize;
use crate::domain::errors::{MediaError, MediaResult};

/// A queued request for the persisted-thumbnail path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailTask {
    /// Original image or video.
    pub source: PathBuf,
    /// Explicit file name; derived from the source when absent.
    pub name: Option<String>,
    /// Output bounds.
    pub size: MediaSize,
    /// Selects the video lane and the video default artwork.
    pub is_video: bool,
}

impl ThumbnailTask {
    /// Creates an image thumbnail task.
    #[must_use]
    pub fn image(source: impl Into<PathBuf>, size: MediaSize) -> Self {
        Self {
            source: source.into(),
            name: None,
            size,
            is_video: false,
        }
    }

    /// Creates a video thumbnail task.
    #[must_use]
    pub fn video(source: impl Into<PathBuf>, size: MediaSize) -> Self {
        Self {
            is_video: true,
            ..Self::image(source, size)
        }
    }

    /// Sets an explicit output name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Output file name for this task given the source's modification time.
    ///
    /// Explicit names are kept and get a `.png` extension when missing;
    /// otherwise the name is `thumb_<hash>.png` over base name, extension
    /// and modification time, so a re-written source gets a fresh file.
    ///
    /// # Errors
    /// Returns `Persist` if an explicit name is not a single plain file
    /// name, such as one with separators, `..` or a root.
    pub fn file_name(&self, modified: SystemTime) -> MediaResult<String> {
        if let Some(name) = &self.name {
            let file = if name.to_ascii_lowercase().ends_with(".png") {
                name.clone()
            } else {
                format!("{name}.png")
            };
            let mut components = Path::new(&file).components();
            return match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => Ok(file),
                _ => Err(MediaError::Persist(format!("invalid thumbnail name: {name:?}"))),
            };
        }

        let stem = self
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self
            .source
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(format!("{stem}.{ext}:{millis}").as_bytes());
        let digest = hasher.finalize();
        Ok(format!("thumb_{}.png", hex::encode(&digest[..16])))
    }
}
