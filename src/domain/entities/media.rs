//! Domain types describing requested and rendered media.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::domain::errors::MediaError;

/// Kind of presentation a caller asks for.
///
/// The category selects the render function and decides whether a transient
/// placeholder is handed out while the real bitmap is being produced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum MediaCategory {
    /// Round-cornered user or group picture.
    Avatar,
    /// Thumbnail rendered from a pre-generated image icon.
    ImageThumbnail,
    /// Thumbnail rendered from a pre-generated video icon, with a play button.
    VideoThumbnail,
    /// Generic file type icon.
    FileIcon,
    /// Full resolution preview of an image.
    OriginalImage,
}

impl MediaCategory {
    /// Returns true for categories rendered from an auxiliary icon file.
    #[must_use]
    pub const fn is_thumbnail(self) -> bool {
        matches!(self, Self::ImageThumbnail | Self::VideoThumbnail)
    }

    /// Returns true if the corner radius changes the rendered output.
    #[must_use]
    pub const fn uses_radius(self) -> bool {
        matches!(self, Self::Avatar)
    }

    /// Returns true if a cache miss hands out a loading placeholder.
    ///
    /// Avatars always need something on screen; every other category
    /// returns nothing until the completion event arrives.
    #[must_use]
    pub const fn has_loading_placeholder(self) -> bool {
        matches!(self, Self::Avatar)
    }

    /// Media type shown in placeholders for this category.
    #[must_use]
    pub const fn kind(self) -> MediaKind {
        match self {
            Self::VideoThumbnail => MediaKind::Video,
            Self::FileIcon => MediaKind::File,
            Self::Avatar | Self::ImageThumbnail | Self::OriginalImage => MediaKind::Image,
        }
    }

    /// Stable identifier used in cache keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::ImageThumbnail => "image_thumbnail",
            Self::VideoThumbnail => "video_thumbnail",
            Self::FileIcon => "file_icon",
            Self::OriginalImage => "original_image",
        }
    }
}

impl std::fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Media type used to label placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
    /// Any other attachment.
    File,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::File => write!(f, "file"),
        }
    }
}

/// Requested output bounds. A zero dimension means "natural size".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MediaSize {
    width: u32,
    height: u32,
}

impl MediaSize {
    /// Sentinel for "keep the source dimensions".
    pub const NATURAL: Self = Self {
        width: 0,
        height: 0,
    };

    /// Creates a size from explicit bounds.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates a square size.
    #[must_use]
    pub const fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    /// Returns true if the size is absent or invalid.
    #[must_use]
    pub const fn is_natural(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Requested width.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.width
    }

    /// Requested height.
    #[must_use]
    pub const fn height(self) -> u32 {
        self.height
    }

    /// Returns these bounds, or a square of `edge` when natural.
    #[must_use]
    pub const fn or_square(self, edge: u32) -> Self {
        if self.is_natural() {
            Self::square(edge)
        } else {
            self
        }
    }
}

impl std::fmt::Display for MediaSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_natural() {
            write!(f, "natural")
        } else {
            write!(f, "{}x{}", self.width, self.height)
        }
    }
}

impl std::str::FromStr for MediaSize {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("natural") {
            return Ok(Self::NATURAL);
        }
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| MediaError::InvalidSize(s.to_string()))
        };
        match s.split_once(['x', 'X']) {
            Some((w, h)) => Ok(Self::new(parse(w)?, parse(h)?)),
            None => parse(s).map(Self::square),
        }
    }
}

/// Which expired overlay was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiredVariant {
    /// Dark mask and white text over the previously rendered bytes.
    Overlay,
    /// Red text on a flat gray canvas; nothing was left to draw on.
    Blank,
}

/// Describes the expired overlay composited into a bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredNotice {
    /// Media type named in the caption.
    pub kind: MediaKind,
    /// Localized caption, e.g. "image expired or removed".
    pub text: String,
    /// Visual variant.
    pub variant: ExpiredVariant,
}

/// A rendered bitmap ready for display.
///
/// Cloning is cheap; the pixels are shared and never mutated after creation.
#[derive(Debug, Clone)]
pub struct MediaBitmap {
    image: Arc<DynamicImage>,
    notice: Option<ExpiredNotice>,
}

impl MediaBitmap {
    /// Wraps a freshly rendered image.
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            notice: None,
        }
    }

    /// Wraps an expired placeholder together with its caption.
    #[must_use]
    pub fn expired(image: DynamicImage, notice: ExpiredNotice) -> Self {
        Self {
            image: Arc::new(image),
            notice: Some(notice),
        }
    }

    /// Shared pixels.
    #[must_use]
    pub fn image(&self) -> &Arc<DynamicImage> {
        &self.image
    }

    /// Expired overlay description, if one was drawn.
    #[must_use]
    pub fn notice(&self) -> Option<&ExpiredNotice> {
        self.notice.as_ref()
    }

    /// Returns true if this is an expired placeholder.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.notice.is_some()
    }

    /// Pixel width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Pixel height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Lifecycle of a fingerprint inside the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaState {
    /// Not cached and not being produced.
    #[default]
    Absent,
    /// A render job is in flight.
    Pending,
    /// A bitmap is resident in the cache.
    Cached,
    /// The last job for this fingerprint failed.
    Failed,
}

impl MediaState {
    /// Returns true if the bitmap can be served from cache.
    #[must_use]
    pub const fn is_cached(self) -> bool {
        matches!(self, Self::Cached)
    }

    /// Returns true if a job is still running.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if the last attempt failed.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("128x96", MediaSize::new(128, 96) ; "explicit")]
    #[test_case("64", MediaSize::square(64) ; "square")]
    #[test_case("natural", MediaSize::NATURAL ; "natural")]
    #[test_case(" 32X16 ", MediaSize::new(32, 16) ; "upper_and_padded")]
    fn test_size_parsing(input: &str, expected: MediaSize) {
        assert_eq!(input.parse::<MediaSize>().unwrap(), expected);
    }

    #[test]
    fn test_size_parsing_rejects_garbage() {
        assert!("big".parse::<MediaSize>().is_err());
        assert!("12xabc".parse::<MediaSize>().is_err());
    }

    #[test]
    fn test_zero_dimension_is_natural() {
        assert!(MediaSize::new(0, 50).is_natural());
        assert!(MediaSize::new(50, 0).is_natural());
        assert!(!MediaSize::new(1, 1).is_natural());
        assert_eq!(MediaSize::new(0, 50).to_string(), "natural");
        assert_eq!(MediaSize::NATURAL.or_square(64), MediaSize::square(64));
    }

    #[test]
    fn test_category_policies() {
        assert!(MediaCategory::Avatar.has_loading_placeholder());
        assert!(!MediaCategory::ImageThumbnail.has_loading_placeholder());
        assert!(MediaCategory::VideoThumbnail.is_thumbnail());
        assert!(!MediaCategory::OriginalImage.is_thumbnail());
        assert_eq!(MediaCategory::VideoThumbnail.kind(), MediaKind::Video);
        assert_eq!(MediaCategory::FileIcon.kind(), MediaKind::File);
    }

    #[test]
    fn test_bitmap_clone_shares_pixels() {
        let bitmap = MediaBitmap::new(DynamicImage::new_rgba8(8, 4));
        let copy = bitmap.clone();
        assert!(Arc::ptr_eq(bitmap.image(), copy.image()));
        assert_eq!((copy.width(), copy.height()), (8, 4));
        assert!(!copy.is_expired());
    }
}
