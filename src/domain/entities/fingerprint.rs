//! Cache keys derived from the semantic inputs of a media request.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::media::{MediaCategory, MediaSize};

/// Opaque cache key for one rendered presentation of a source file.
///
/// Equal inputs always produce equal fingerprints. Every input is written
/// length-prefixed before hashing so that no two distinct requests can be
/// confused by separator characters inside paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Derives the key for a request.
    ///
    /// `radius` only participates for categories that render it, and
    /// `aux_path` only for thumbnail categories, which are drawn from a
    /// pre-rendered icon that may be regenerated over time.
    #[must_use]
    pub fn build(
        path: &Path,
        size: MediaSize,
        category: MediaCategory,
        radius: u32,
        aux_path: Option<&Path>,
    ) -> Self {
        let mut hasher = Sha256::new();
        write_segment(&mut hasher, path.as_os_str().as_encoded_bytes());

        let size_segment = if size.is_natural() {
            "@natural".to_string()
        } else {
            format!("{}x{}", size.width(), size.height())
        };
        write_segment(&mut hasher, size_segment.as_bytes());
        write_segment(&mut hasher, category.as_str().as_bytes());

        if category.uses_radius() {
            write_segment(&mut hasher, &radius.to_le_bytes());
        }

        if category.is_thumbnail() {
            match aux_path {
                Some(aux) => write_segment(&mut hasher, aux.as_os_str().as_encoded_bytes()),
                None => write_segment(&mut hasher, b"@noicon"),
            }
        }

        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    /// Returns the hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_segment(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a caller specifies when asking for a medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// Source file (original image, video or attachment).
    pub path: PathBuf,
    /// Output bounds.
    pub size: MediaSize,
    /// Requested presentation.
    pub category: MediaCategory,
    /// Corner radius in pixels; only avatars render it.
    pub radius: u32,
    /// Pre-rendered icon file used by thumbnail categories.
    pub aux_path: Option<PathBuf>,
}

impl MediaRequest {
    /// Creates a request with no radius and no icon.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: MediaSize, category: MediaCategory) -> Self {
        Self {
            path: path.into(),
            size,
            category,
            radius: 0,
            aux_path: None,
        }
    }

    /// Sets the corner radius.
    #[must_use]
    pub const fn with_radius(mut self, radius: u32) -> Self {
        self.radius = radius;
        self
    }

    /// Sets the pre-rendered icon path.
    #[must_use]
    pub fn with_aux_path(mut self, aux_path: impl Into<PathBuf>) -> Self {
        self.aux_path = Some(aux_path.into());
        self
    }

    /// Returns true if no source path was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Derives the cache key.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::build(
            &self.path,
            self.size,
            self.category,
            self.radius,
            self.aux_path.as_deref(),
        )
    }

    /// File that has to be readable before work is worth scheduling.
    #[must_use]
    pub fn probe_path(&self) -> &Path {
        match (&self.aux_path, self.category.is_thumbnail()) {
            (Some(aux), true) => aux,
            _ => &self.path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn base() -> MediaRequest {
        MediaRequest::new("photos/a.jpg", MediaSize::square(128), MediaCategory::Avatar)
            .with_radius(8)
    }

    #[test]
    fn test_equal_inputs_equal_keys() {
        assert_eq!(base().fingerprint(), base().fingerprint());
        assert_eq!(base().fingerprint().as_str().len(), 32);
    }

    #[test_case(MediaRequest { path: "photos/b.jpg".into(), ..base() } ; "path")]
    #[test_case(MediaRequest { size: MediaSize::new(128, 64), ..base() } ; "size")]
    #[test_case(MediaRequest { size: MediaSize::NATURAL, ..base() } ; "natural_size")]
    #[test_case(MediaRequest { category: MediaCategory::OriginalImage, ..base() } ; "category")]
    #[test_case(MediaRequest { radius: 9, ..base() } ; "avatar_radius")]
    fn test_any_differing_input_changes_key(other: MediaRequest) {
        assert_ne!(base().fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_natural_marker_does_not_collide_with_zero_size() {
        let natural = MediaRequest::new("a.png", MediaSize::NATURAL, MediaCategory::FileIcon);
        let zero_w = MediaRequest::new("a.png", MediaSize::new(0, 7), MediaCategory::FileIcon);
        let real = MediaRequest::new("a.png", MediaSize::new(1, 1), MediaCategory::FileIcon);
        assert_eq!(natural.fingerprint(), zero_w.fingerprint());
        assert_ne!(natural.fingerprint(), real.fingerprint());
    }

    #[test]
    fn test_radius_ignored_outside_avatars() {
        let thumb = MediaRequest::new("a.jpg", MediaSize::square(128), MediaCategory::ImageThumbnail)
            .with_aux_path("icons/a.png");
        let rounded = thumb.clone().with_radius(12);
        assert_eq!(thumb.fingerprint(), rounded.fingerprint());
    }

    #[test]
    fn test_icon_path_distinguishes_thumbnails_only() {
        let thumb = MediaRequest::new("a.jpg", MediaSize::square(128), MediaCategory::VideoThumbnail);
        assert_ne!(
            thumb.clone().with_aux_path("icons/1.png").fingerprint(),
            thumb.clone().with_aux_path("icons/2.png").fingerprint()
        );
        assert_ne!(thumb.fingerprint(), thumb.clone().with_aux_path("icons/1.png").fingerprint());

        let original = MediaRequest::new("a.jpg", MediaSize::square(128), MediaCategory::OriginalImage);
        assert_eq!(
            original.fingerprint(),
            original.clone().with_aux_path("icons/1.png").fingerprint()
        );
    }

    #[test]
    fn test_separators_in_paths_do_not_collide() {
        let a = MediaRequest::new("a|b", MediaSize::square(1), MediaCategory::ImageThumbnail)
            .with_aux_path("c");
        let b = MediaRequest::new("a", MediaSize::square(1), MediaCategory::ImageThumbnail)
            .with_aux_path("b|c");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_probe_path_prefers_icon_for_thumbnails() {
        let thumb = MediaRequest::new("a.jpg", MediaSize::NATURAL, MediaCategory::ImageThumbnail)
            .with_aux_path("icons/a.png");
        assert_eq!(thumb.probe_path(), Path::new("icons/a.png"));

        let avatar = MediaRequest::new("a.jpg", MediaSize::NATURAL, MediaCategory::Avatar)
            .with_aux_path("icons/a.png");
        assert_eq!(avatar.probe_path(), Path::new("a.jpg"));
    }
}
