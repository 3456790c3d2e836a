//! Decode/render pipeline.
//!
//! Turns a decoded source image, or the absence of one, into the exact
//! presentation a caller asked for. Nothing in here touches the cache or
//! the worker pool.

use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{debug, trace, warn};

use crate::domain::entities::{
    ExpiredNotice, ExpiredVariant, MediaBitmap, MediaCategory, MediaKind, MediaRequest, MediaSize,
};
use crate::domain::errors::{MediaError, MediaResult};
use crate::domain::ports::MediaSourcePort;
use crate::infrastructure::config::{Labels, RenderConfig};

use super::overlay::{self, TextPainter};

/// Edge used when a placeholder has to be drawn without any requested size.
pub const DEFAULT_THUMBNAIL_EDGE: u32 = 128;
/// Edge of avatar loading placeholders without a requested size.
pub const DEFAULT_AVATAR_EDGE: u32 = 64;

const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;
const EXPIRED_MASK_ALPHA: u8 = 150;

/// Stateless renderer holding the localized captions and caption font.
#[derive(Debug, Clone)]
pub struct Renderer {
    labels: Labels,
    text: Option<TextPainter>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Labels::default())
    }
}

impl Renderer {
    /// Creates a renderer drawing captions with the bundled font.
    #[must_use]
    pub fn new(labels: Labels) -> Self {
        Self {
            labels,
            text: TextPainter::embedded(),
        }
    }

    /// Creates a renderer that draws captions with `painter`.
    #[must_use]
    pub fn with_text(labels: Labels, painter: TextPainter) -> Self {
        Self {
            labels,
            text: Some(painter),
        }
    }

    /// Builds a renderer from configuration.
    ///
    /// `font_path` overrides the bundled font; an unreadable or invalid
    /// override is logged and the bundled font is kept.
    #[must_use]
    pub fn from_config(config: &RenderConfig) -> Self {
        let Some(path) = &config.font_path else {
            return Self::new(config.labels.clone());
        };
        let painter = std::fs::read(path)
            .map_err(|e| MediaError::Font(format!("{}: {e}", path.display())))
            .and_then(|bytes| TextPainter::from_bytes(&bytes));
        match painter {
            Ok(painter) => {
                debug!(path = %path.display(), "Loaded caption font");
                Self::with_text(config.labels.clone(), painter)
            }
            Err(e) => {
                warn!(error = %e, "Caption font override unusable, keeping bundled font");
                Self::new(config.labels.clone())
            }
        }
    }

    /// Localized captions in use.
    #[must_use]
    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// General pipeline for a decoded source image.
    ///
    /// Thumbnail categories are scaled and decorated as if their icon
    /// decoded fine; use [`Self::render_thumbnail_from_icon`] for the full
    /// fallback policy.
    #[must_use]
    pub fn render(
        &self,
        image: &DynamicImage,
        size: MediaSize,
        category: MediaCategory,
        radius: u32,
    ) -> DynamicImage {
        match category {
            MediaCategory::Avatar => self.render_avatar(image, size, radius),
            MediaCategory::ImageThumbnail => scale_to_fit(image, size),
            MediaCategory::VideoThumbnail => {
                let mut canvas = scale_to_fit(image, size).into_rgba8();
                overlay::play_button(&mut canvas);
                DynamicImage::ImageRgba8(canvas)
            }
            MediaCategory::FileIcon => self.render_file_icon(image, size),
            MediaCategory::OriginalImage => self.render_original(image, size),
        }
    }

    /// Scale-to-fill into `size`, then clip to a rounded rectangle.
    #[must_use]
    pub fn render_avatar(&self, image: &DynamicImage, size: MediaSize, radius: u32) -> DynamicImage {
        let filled = if size.is_natural() {
            image.clone()
        } else {
            image.resize_to_fill(size.width(), size.height(), RESAMPLE_FILTER)
        };
        let mut canvas = filled.into_rgba8();
        overlay::round_corners(&mut canvas, radius);
        DynamicImage::ImageRgba8(canvas)
    }

    /// Scale-to-fit image thumbnail.
    ///
    /// Without pixels but with a known source, a default thumbnail carrying
    /// the localized "image" indicator is returned instead of failing.
    #[must_use]
    pub fn render_image_thumbnail(
        &self,
        image: Option<&DynamicImage>,
        size: MediaSize,
        source_exists: bool,
    ) -> Option<DynamicImage> {
        match image {
            Some(image) => Some(scale_to_fit(image, size)),
            None if source_exists => Some(self.default_thumbnail(size, MediaKind::Image)),
            None => None,
        }
    }

    /// Scale-to-fit video thumbnail with a centered play button.
    #[must_use]
    pub fn render_video_thumbnail(
        &self,
        image: Option<&DynamicImage>,
        size: MediaSize,
        source_exists: bool,
    ) -> Option<DynamicImage> {
        match image {
            Some(image) => {
                let mut canvas = scale_to_fit(image, size).into_rgba8();
                overlay::play_button(&mut canvas);
                Some(DynamicImage::ImageRgba8(canvas))
            }
            None if source_exists => Some(self.default_thumbnail(size, MediaKind::Video)),
            None => None,
        }
    }

    /// Scale-to-fit without decoration.
    #[must_use]
    pub fn render_file_icon(&self, image: &DynamicImage, size: MediaSize) -> DynamicImage {
        scale_to_fit(image, size)
    }

    /// Full resolution preview, shrunk to `size` but never enlarged.
    #[must_use]
    pub fn render_original(&self, image: &DynamicImage, size: MediaSize) -> DynamicImage {
        if size.is_natural() || (image.width() <= size.width() && image.height() <= size.height())
        {
            return image.clone();
        }
        scale_to_fit(image, size)
    }

    /// Thumbnail policy for icon-backed categories.
    ///
    /// - original missing: expired placeholder, drawn over the icon if it decodes
    /// - original present, icon unusable: default thumbnail
    /// - both present: normal thumbnail from the icon
    pub fn render_thumbnail_from_icon(
        &self,
        source: &dyn MediaSourcePort,
        source_path: &Path,
        icon_path: Option<&Path>,
        size: MediaSize,
        category: MediaCategory,
    ) -> MediaBitmap {
        let kind = category.kind();
        let icon = icon_path.and_then(|icon| match source.decode(icon) {
            Ok(image) => Some(image),
            Err(e) => {
                trace!(icon = %icon.display(), error = %e, "Thumbnail icon unusable");
                None
            }
        });

        if !source.is_readable(source_path) {
            debug!(path = %source_path.display(), "Original gone, rendering expired placeholder");
            return self.expired_placeholder(icon.as_ref(), size, kind);
        }

        let rendered = match category {
            MediaCategory::VideoThumbnail => self.render_video_thumbnail(icon.as_ref(), size, true),
            _ => self.render_image_thumbnail(icon.as_ref(), size, true),
        };
        MediaBitmap::new(rendered.unwrap_or_else(|| self.default_thumbnail(size, kind)))
    }

    /// Composites the expired overlay.
    ///
    /// With a base image the old pixels are dimmed and captioned in white;
    /// without one a flat gray canvas is captioned in red.
    #[allow(clippy::cast_precision_loss)]
    pub fn expired_placeholder(
        &self,
        base: Option<&DynamicImage>,
        size: MediaSize,
        kind: MediaKind,
    ) -> MediaBitmap {
        let (mut canvas, variant) = match base {
            Some(image) => {
                let mut canvas = scale_to_fit(image, size).into_rgba8();
                overlay::dim(&mut canvas, EXPIRED_MASK_ALPHA);
                (canvas, ExpiredVariant::Overlay)
            }
            None => {
                let bounds = size.or_square(DEFAULT_THUMBNAIL_EDGE);
                let canvas = RgbaImage::from_pixel(bounds.width(), bounds.height(), overlay::FLAT_GRAY);
                (canvas, ExpiredVariant::Blank)
            }
        };

        let (w, h) = canvas.dimensions();
        let glyph = (w.min(h) as f32 * 0.3).max(8.0);
        let center = (w as f32 / 2.0, h as f32 / 2.0 - glyph * 0.3);
        overlay::warning_glyph(&mut canvas, center, glyph, overlay::AMBER);

        let text = self.labels.expired_text(kind);
        let color = match variant {
            ExpiredVariant::Overlay => overlay::WHITE,
            ExpiredVariant::Blank => overlay::ALERT_RED,
        };
        let baseline = center.1 + glyph * 0.6 + glyph * 0.5;
        self.caption(&mut canvas, &text, glyph * 0.45, baseline, color);

        MediaBitmap::expired(
            DynamicImage::ImageRgba8(canvas),
            ExpiredNotice {
                kind,
                text,
                variant,
            },
        )
    }

    /// Placeholder drawn when the original exists but no icon pixels are available.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn default_thumbnail(&self, size: MediaSize, kind: MediaKind) -> DynamicImage {
        let bounds = size.or_square(DEFAULT_THUMBNAIL_EDGE);
        let mut canvas = RgbaImage::from_pixel(bounds.width(), bounds.height(), overlay::SLATE);
        match kind {
            MediaKind::Video => overlay::play_button(&mut canvas),
            MediaKind::Image | MediaKind::File => {
                let (w, h) = canvas.dimensions();
                let px = (w.min(h) as f32 * 0.2).max(8.0);
                let name = self.labels.media_name(kind).to_string();
                self.caption(&mut canvas, &name, px, h as f32 / 2.0 + px / 3.0, overlay::WHITE);
            }
        }
        DynamicImage::ImageRgba8(canvas)
    }

    /// Transient tile handed out for avatars while the real one renders.
    #[must_use]
    pub fn loading_placeholder(&self, size: MediaSize, radius: u32) -> DynamicImage {
        let bounds = size.or_square(DEFAULT_AVATAR_EDGE);
        let mut canvas = RgbaImage::from_pixel(bounds.width(), bounds.height(), overlay::LIGHT_GRAY);
        overlay::round_corners(&mut canvas, radius);
        DynamicImage::ImageRgba8(canvas)
    }

    fn caption(&self, canvas: &mut RgbaImage, text: &str, px: f32, baseline: f32, color: Rgba<u8>) {
        if let Some(painter) = &self.text {
            painter.draw_centered(canvas, text, px, baseline, color);
        }
    }

    /// Runs one cache job: load, verify and render the requested presentation.
    ///
    /// # Errors
    /// Non-thumbnail categories fail with `NotFound`/`Unreadable` for missing
    /// sources and `Decode` for corrupt ones. Thumbnail categories never fail;
    /// they degrade to default or expired placeholders.
    pub fn render_request(
        &self,
        source: &dyn MediaSourcePort,
        request: &MediaRequest,
    ) -> MediaResult<MediaBitmap> {
        if request.is_empty() {
            return Err(MediaError::EmptyPath);
        }

        if request.category.is_thumbnail() {
            return Ok(self.render_thumbnail_from_icon(
                source,
                &request.path,
                request.aux_path.as_deref(),
                request.size,
                request.category,
            ));
        }

        if !source.is_readable(&request.path) {
            return Err(MediaError::NotFound(request.path.display().to_string()));
        }
        let image = source.decode(&request.path)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(MediaError::Decode(format!(
                "{}: empty image",
                request.path.display()
            )));
        }

        Ok(MediaBitmap::new(self.render(
            &image,
            request.size,
            request.category,
            request.radius,
        )))
    }
}

/// Scale-to-fit; a natural size returns the image unchanged.
#[must_use]
pub fn scale_to_fit(image: &DynamicImage, size: MediaSize) -> DynamicImage {
    if size.is_natural() {
        return image.clone();
    }
    image.resize(size.width(), size.height(), RESAMPLE_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::MockMediaSourcePort;

    fn renderer() -> Renderer {
        Renderer::new(Labels::default())
    }

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([10, 120, 200, 255])))
    }

    #[test]
    fn test_avatar_fills_and_rounds() {
        let avatar = renderer().render_avatar(&solid(300, 100), MediaSize::square(64), 16);
        assert_eq!((avatar.width(), avatar.height()), (64, 64));

        let rgba = avatar.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(32, 32)[3], 255);
    }

    #[test]
    fn test_image_thumbnail_fits_preserving_aspect() {
        let thumb = renderer()
            .render_image_thumbnail(Some(&solid(256, 128)), MediaSize::square(128), true)
            .unwrap();
        assert_eq!((thumb.width(), thumb.height()), (128, 64));
    }

    #[test]
    fn test_natural_size_returns_original() {
        let thumb = renderer()
            .render_image_thumbnail(Some(&solid(33, 21)), MediaSize::NATURAL, true)
            .unwrap();
        assert_eq!((thumb.width(), thumb.height()), (33, 21));
    }

    #[test]
    fn test_missing_pixels_with_source_gives_default() {
        let r = renderer();
        let thumb = r
            .render_image_thumbnail(None, MediaSize::new(96, 48), true)
            .unwrap();
        assert_eq!((thumb.width(), thumb.height()), (96, 48));
        assert!(r.render_image_thumbnail(None, MediaSize::new(96, 48), false).is_none());
        assert!(r.render_video_thumbnail(None, MediaSize::new(96, 48), false).is_none());
    }

    #[test]
    fn test_video_thumbnail_has_play_button() {
        let base = solid(100, 100);
        let thumb = renderer()
            .render_video_thumbnail(Some(&base), MediaSize::square(100), true)
            .unwrap()
            .to_rgba8();
        assert_ne!(thumb.get_pixel(50, 50), base.to_rgba8().get_pixel(50, 50));
        assert_eq!(thumb.get_pixel(1, 1), base.to_rgba8().get_pixel(1, 1));
    }

    #[test]
    fn test_original_never_upscales() {
        let r = renderer();
        let small = r.render_original(&solid(40, 30), MediaSize::square(400));
        assert_eq!((small.width(), small.height()), (40, 30));

        let large = r.render_original(&solid(800, 400), MediaSize::square(400));
        assert_eq!((large.width(), large.height()), (400, 200));
    }

    #[test]
    fn test_expired_variants() {
        let r = renderer();
        let over = r.expired_placeholder(Some(&solid(64, 64)), MediaSize::square(64), MediaKind::Image);
        let notice = over.notice().unwrap();
        assert_eq!(notice.variant, ExpiredVariant::Overlay);
        assert_eq!(notice.text, "image expired or removed");

        let blank = r.expired_placeholder(None, MediaSize::NATURAL, MediaKind::Video);
        let notice = blank.notice().unwrap();
        assert_eq!(notice.variant, ExpiredVariant::Blank);
        assert_eq!(notice.text, "video expired or removed");
        assert_eq!((blank.width(), blank.height()), (DEFAULT_THUMBNAIL_EDGE, DEFAULT_THUMBNAIL_EDGE));
        assert_eq!(blank.image().to_rgba8().get_pixel(1, 1), &overlay::FLAT_GRAY);
    }

    #[test]
    fn test_loading_placeholder() {
        let tile = renderer().loading_placeholder(MediaSize::NATURAL, 32);
        assert_eq!((tile.width(), tile.height()), (DEFAULT_AVATAR_EDGE, DEFAULT_AVATAR_EDGE));
        assert_eq!(tile.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    fn reddish(p: &Rgba<u8>) -> bool {
        p[0] > p[1].saturating_add(100)
    }

    fn whitish(p: &Rgba<u8>) -> bool {
        p[0] > 200 && p[1] > 200 && p[2] > 200
    }

    #[test]
    fn test_blank_placeholder_has_red_caption() {
        let r = Renderer::default();
        let image = r.expired_placeholder(None, MediaSize::square(256), MediaKind::Image);
        let video = r.expired_placeholder(None, MediaSize::square(256), MediaKind::Video);

        let pixels = image.image().to_rgba8();
        assert!(pixels.pixels().filter(|p| reddish(p)).count() > 20);
        assert_ne!(pixels, video.image().to_rgba8());
    }

    #[test]
    fn test_overlay_placeholder_has_white_caption() {
        let r = Renderer::default();
        let over = r.expired_placeholder(Some(&solid(256, 256)), MediaSize::square(256), MediaKind::Image);
        let pixels = over.image().to_rgba8();
        assert!(pixels.pixels().filter(|p| whitish(p)).count() > 20);
        assert_eq!(pixels.pixels().filter(|p| reddish(p)).count(), 0);
    }

    #[test]
    fn test_default_thumbnail_names_the_media() {
        let r = Renderer::default();
        let image = r.default_thumbnail(MediaSize::square(128), MediaKind::Image).to_rgba8();
        let file = r.default_thumbnail(MediaSize::square(128), MediaKind::File).to_rgba8();
        assert!(image.pixels().filter(|p| whitish(p)).count() > 0);
        assert_ne!(image, file);
    }

    #[test]
    fn test_font_override_falls_back_to_bundled() {
        let config = RenderConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            labels: Labels::default(),
        };
        let r = Renderer::from_config(&config);
        let blank = r.expired_placeholder(None, MediaSize::square(256), MediaKind::File);
        assert!(blank.image().to_rgba8().pixels().filter(|p| reddish(p)).count() > 20);
    }

    fn icon_source(source_exists: bool, icon: Option<DynamicImage>) -> MockMediaSourcePort {
        let mut source = MockMediaSourcePort::new();
        source
            .expect_is_readable()
            .withf(|path| path == Path::new("photos/a.jpg"))
            .returning(move |_| source_exists);
        source.expect_decode().returning(move |_| {
            icon.clone()
                .ok_or_else(|| MediaError::Decode("icons/a.png: bad bytes".to_string()))
        });
        source
    }

    fn thumbnail_from(source: &MockMediaSourcePort) -> MediaBitmap {
        renderer().render_thumbnail_from_icon(
            source,
            Path::new("photos/a.jpg"),
            Some(Path::new("icons/a.png")),
            MediaSize::square(128),
            MediaCategory::ImageThumbnail,
        )
    }

    #[test]
    fn test_fallback_normal_thumbnail() {
        let bitmap = thumbnail_from(&icon_source(true, Some(solid(256, 128))));
        assert!(!bitmap.is_expired());
        assert_eq!((bitmap.width(), bitmap.height()), (128, 64));
    }

    #[test]
    fn test_fallback_default_thumbnail_without_overlay() {
        let bitmap = thumbnail_from(&icon_source(true, None));
        assert!(!bitmap.is_expired());
        assert_eq!((bitmap.width(), bitmap.height()), (128, 128));
        assert_eq!(bitmap.image().to_rgba8().get_pixel(1, 1), &overlay::SLATE);
    }

    #[test]
    fn test_fallback_expired_when_source_missing() {
        let bitmap = thumbnail_from(&icon_source(false, Some(solid(256, 128))));
        let notice = bitmap.notice().unwrap();
        assert_eq!(notice.kind, MediaKind::Image);
        assert_eq!(notice.variant, ExpiredVariant::Overlay);

        let bitmap = thumbnail_from(&icon_source(false, None));
        assert_eq!(bitmap.notice().unwrap().variant, ExpiredVariant::Blank);
    }

    #[test]
    fn test_render_request_reports_missing_source() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| false);
        source.expect_decode().never();

        let request = MediaRequest::new("gone.png", MediaSize::square(32), MediaCategory::Avatar);
        assert!(matches!(
            renderer().render_request(&source, &request),
            Err(MediaError::NotFound(_))
        ));
    }

    #[test]
    fn test_render_request_reports_decode_failure() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| true);
        source
            .expect_decode()
            .returning(|_| Err(MediaError::Decode("corrupt".to_string())));

        let request = MediaRequest::new("a.png", MediaSize::square(32), MediaCategory::OriginalImage);
        assert!(matches!(
            renderer().render_request(&source, &request),
            Err(MediaError::Decode(_))
        ));
    }

    #[test]
    fn test_render_request_avatar() {
        let mut source = MockMediaSourcePort::new();
        source.expect_is_readable().returning(|_| true);
        source.expect_decode().times(1).returning(|_| Ok(solid(50, 80)));

        let request =
            MediaRequest::new("me.png", MediaSize::square(40), MediaCategory::Avatar).with_radius(20);
        let bitmap = renderer().render_request(&source, &request).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (40, 40));
    }
}
