//! Vector compositing used by the render pipeline.
//!
//! Shapes are built as tiny-skia paths and filled anti-aliased. The canvas
//! stays a straight-alpha `RgbaImage`; each call mirrors it into a
//! premultiplied pixmap, draws, and writes the result back.

use std::sync::{Arc, LazyLock};

use image::{Rgba, RgbaImage};
use tiny_skia::{
    ColorU8, FillRule, IntSize, Mask, Paint, Path, PathBuilder, Pixmap, Rect, Transform,
};
use tracing::warn;

use crate::domain::errors::{MediaError, MediaResult};

/// Opaque white.
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Caption color on blank placeholders.
pub const ALERT_RED: Rgba<u8> = Rgba([220, 53, 53, 255]);
/// Background of blank placeholders.
pub const FLAT_GRAY: Rgba<u8> = Rgba([200, 200, 200, 255]);
/// Background of default thumbnails.
pub const SLATE: Rgba<u8> = Rgba([58, 60, 66, 255]);
/// Loading placeholder fill.
pub const LIGHT_GRAY: Rgba<u8> = Rgba([226, 228, 232, 255]);
/// Warning glyph body.
pub const AMBER: Rgba<u8> = Rgba([255, 193, 7, 255]);

const EMBEDDED_FONT: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");

// 4/3 * tan(pi/8), cubic approximation of a quarter circle.
const KAPPA: f32 = 0.552_284_8;

static EMBEDDED_PAINTER: LazyLock<Option<TextPainter>> = LazyLock::new(|| {
    TextPainter::from_bytes(EMBEDDED_FONT)
        .map_err(|e| warn!(error = %e, "Embedded caption font rejected"))
        .ok()
});

fn paint_for(color: Rgba<u8>) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

/// Runs `draw` against a premultiplied copy of `canvas` and stores the result.
fn draw_on(canvas: &mut RgbaImage, draw: impl FnOnce(&mut Pixmap)) {
    let Some(size) = IntSize::from_wh(canvas.width(), canvas.height()) else {
        return;
    };
    let data = canvas
        .pixels()
        .flat_map(|p| {
            let c = ColorU8::from_rgba(p[0], p[1], p[2], p[3]).premultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    let Some(mut pixmap) = Pixmap::from_vec(data, size) else {
        return;
    };

    draw(&mut pixmap);

    for (dst, src) in canvas.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
}

#[allow(clippy::cast_precision_loss)]
fn full_rect(canvas: &RgbaImage) -> Option<Rect> {
    Rect::from_xywh(0.0, 0.0, canvas.width() as f32, canvas.height() as f32)
}

/// Closed path of a rectangle with quarter-circle corners.
fn rounded_rect(width: f32, height: f32, radius: f32) -> Option<Path> {
    let r = radius.min(width / 2.0).min(height / 2.0);
    let k = r * (1.0 - KAPPA);

    let mut pb = PathBuilder::new();
    pb.move_to(r, 0.0);
    pb.line_to(width - r, 0.0);
    pb.cubic_to(width - k, 0.0, width, k, width, r);
    pb.line_to(width, height - r);
    pb.cubic_to(width, height - k, width - k, height, width - r, height);
    pb.line_to(r, height);
    pb.cubic_to(k, height, 0.0, height - k, 0.0, height - r);
    pb.line_to(0.0, r);
    pb.cubic_to(0.0, k, k, 0.0, r, 0.0);
    pb.close();
    pb.finish()
}

fn triangle(points: [(f32, f32); 3]) -> Option<Path> {
    let mut pb = PathBuilder::new();
    pb.move_to(points[0].0, points[0].1);
    pb.line_to(points[1].0, points[1].1);
    pb.line_to(points[2].0, points[2].1);
    pb.close();
    pb.finish()
}

/// Fills `path` with `color`, anti-aliased.
pub fn fill_path(canvas: &mut RgbaImage, path: &Path, color: Rgba<u8>) {
    let paint = paint_for(color);
    draw_on(canvas, |pixmap| {
        pixmap.fill_path(path, &paint, FillRule::Winding, Transform::identity(), None);
    });
}

/// Darkens the canvas with a translucent black layer.
pub fn dim(canvas: &mut RgbaImage, alpha: u8) {
    let Some(rect) = full_rect(canvas) else {
        return;
    };
    let paint = paint_for(Rgba([0, 0, 0, alpha]));
    draw_on(canvas, |pixmap| {
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    });
}

/// Clears everything outside a rounded rectangle spanning the canvas.
#[allow(clippy::cast_precision_loss)]
pub fn round_corners(canvas: &mut RgbaImage, radius: u32) {
    let (w, h) = canvas.dimensions();
    if radius == 0 {
        return;
    }
    let Some(path) = rounded_rect(w as f32, h as f32, radius as f32) else {
        return;
    };
    let Some(mut mask) = Mask::new(w, h) else {
        return;
    };
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());

    for (pixel, coverage) in canvas.pixels_mut().zip(mask.data()) {
        let scaled = (u16::from(pixel[3]) * u16::from(*coverage) + 127) / 255;
        pixel[3] = u8::try_from(scaled).unwrap_or(u8::MAX);
    }
}

/// Fills a circle.
pub fn fill_circle(canvas: &mut RgbaImage, center: (f32, f32), radius: f32, color: Rgba<u8>) {
    if let Some(path) = PathBuilder::from_circle(center.0, center.1, radius) {
        fill_path(canvas, &path, color);
    }
}

/// Fills a triangle given its three corners.
pub fn fill_triangle(canvas: &mut RgbaImage, points: [(f32, f32); 3], color: Rgba<u8>) {
    if let Some(path) = triangle(points) {
        fill_path(canvas, &path, color);
    }
}

/// Fills an axis-aligned rectangle.
pub fn fill_rect(canvas: &mut RgbaImage, x: f32, y: f32, width: f32, height: f32, color: Rgba<u8>) {
    if let Some(rect) = Rect::from_xywh(x, y, width, height) {
        fill_path(canvas, &PathBuilder::from_rect(rect), color);
    }
}

/// Draws a centered play button scaled to the canvas.
#[allow(clippy::cast_precision_loss)]
pub fn play_button(canvas: &mut RgbaImage) {
    let (w, h) = canvas.dimensions();
    let center = (w as f32 / 2.0, h as f32 / 2.0);
    let radius = (w.min(h) as f32 * 0.18).max(4.0);
    let half = radius * 0.55;

    let disc = PathBuilder::from_circle(center.0, center.1, radius);
    let arrow = triangle([
        (center.0 - half * 0.8, center.1 - half),
        (center.0 - half * 0.8, center.1 + half),
        (center.0 + half * 1.1, center.1),
    ]);
    let disc_paint = paint_for(Rgba([0, 0, 0, 140]));
    let arrow_paint = paint_for(WHITE);

    draw_on(canvas, |pixmap| {
        if let Some(disc) = &disc {
            pixmap.fill_path(disc, &disc_paint, FillRule::Winding, Transform::identity(), None);
        }
        if let Some(arrow) = &arrow {
            pixmap.fill_path(arrow, &arrow_paint, FillRule::Winding, Transform::identity(), None);
        }
    });
}

/// Draws a warning triangle with an exclamation mark centered at `center`.
pub fn warning_glyph(canvas: &mut RgbaImage, center: (f32, f32), size: f32, body: Rgba<u8>) {
    let half = size / 2.0;
    let stem_w = (size * 0.1).max(1.0);
    let left = center.0 - stem_w / 2.0;

    let body_path = triangle([
        (center.0, center.1 - half),
        (center.0 - half, center.1 + half * 0.8),
        (center.0 + half, center.1 + half * 0.8),
    ]);
    let mut mark = PathBuilder::new();
    if let Some(stem) = Rect::from_xywh(left, center.1 - half * 0.45, stem_w, half * 0.75) {
        mark.push_rect(stem);
    }
    if let Some(dot) = Rect::from_xywh(left, center.1 + half * 0.42, stem_w, stem_w) {
        mark.push_rect(dot);
    }
    let mark_path = mark.finish();

    let body_paint = paint_for(body);
    let mark_paint = paint_for(Rgba([40, 40, 40, 255]));
    draw_on(canvas, |pixmap| {
        if let Some(path) = &body_path {
            pixmap.fill_path(path, &body_paint, FillRule::Winding, Transform::identity(), None);
        }
        if let Some(path) = &mark_path {
            pixmap.fill_path(path, &mark_paint, FillRule::Winding, Transform::identity(), None);
        }
    });
}

/// Rasterizes captions with a loaded font.
#[derive(Clone)]
pub struct TextPainter {
    font: Arc<fontdue::Font>,
}

impl std::fmt::Debug for TextPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextPainter")
            .field("name", &self.font.name())
            .finish_non_exhaustive()
    }
}

impl TextPainter {
    /// Parses a TrueType/OpenType font.
    ///
    /// # Errors
    /// Returns `MediaError::Font` if the bytes are not a usable font.
    pub fn from_bytes(bytes: &[u8]) -> MediaResult<Self> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default())
            .map_err(|e| MediaError::Font(e.to_string()))?;
        Ok(Self {
            font: Arc::new(font),
        })
    }

    /// Painter backed by the bundled DejaVu Sans, parsed once per process.
    #[must_use]
    pub fn embedded() -> Option<Self> {
        EMBEDDED_PAINTER.clone()
    }

    /// Horizontal advance of `text` at `px`.
    #[must_use]
    pub fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars()
            .map(|c| self.font.metrics(c, px).advance_width)
            .sum()
    }

    /// Draws `text` horizontally centered with its baseline at `baseline`.
    ///
    /// The size shrinks until the caption fits within the canvas width.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )]
    pub fn draw_centered(
        &self,
        canvas: &mut RgbaImage,
        text: &str,
        px: f32,
        baseline: f32,
        color: Rgba<u8>,
    ) {
        let (w, h) = canvas.dimensions();
        let (Some(mut coverage), Some(rect)) = (Mask::new(w, h), full_rect(canvas)) else {
            return;
        };

        let max_width = w as f32 * 0.9;
        let mut size = px;
        while size > 6.0 && self.measure(text, size) > max_width {
            size -= 1.0;
        }

        let stride = w as usize;
        let data = coverage.data_mut();
        let mut pen_x = (w as f32 - self.measure(text, size)) / 2.0;
        for c in text.chars() {
            let (metrics, glyph) = self.font.rasterize(c, size);
            let left = pen_x.round() as i32 + metrics.xmin;
            let top = baseline.round() as i32 - metrics.height as i32 - metrics.ymin;
            for row in 0..metrics.height {
                let y = top + row as i32;
                if y < 0 || y >= h as i32 {
                    continue;
                }
                for col in 0..metrics.width {
                    let x = left + col as i32;
                    if x < 0 || x >= w as i32 {
                        continue;
                    }
                    let cell = &mut data[y as usize * stride + x as usize];
                    *cell = (*cell).max(glyph[row * metrics.width + col]);
                }
            }
            pen_x += metrics.advance_width;
        }

        let paint = paint_for(color);
        draw_on(canvas, |pixmap| {
            pixmap.fill_rect(rect, &paint, Transform::identity(), Some(&coverage));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(canvas: &RgbaImage, pred: impl Fn(&Rgba<u8>) -> bool) -> usize {
        canvas.pixels().filter(|p| pred(p)).count()
    }

    #[test]
    fn test_fill_path_opaque_and_untouched() {
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 255]));
        fill_rect(&mut canvas, 5.0, 5.0, 10.0, 10.0, WHITE);
        assert_eq!(*canvas.get_pixel(10, 10), WHITE);
        assert_eq!(*canvas.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_fill_onto_transparent() {
        let mut canvas = RgbaImage::new(10, 10);
        fill_circle(&mut canvas, (5.0, 5.0), 4.0, Rgba([10, 20, 30, 255]));
        assert_eq!(*canvas.get_pixel(5, 5), Rgba([10, 20, 30, 255]));
        assert_eq!(canvas.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_round_corners_clears_corner_keeps_center() {
        let mut canvas = RgbaImage::from_pixel(40, 40, WHITE);
        round_corners(&mut canvas, 12);
        assert_eq!(canvas.get_pixel(0, 0)[3], 0);
        assert_eq!(canvas.get_pixel(39, 39)[3], 0);
        assert_eq!(canvas.get_pixel(20, 20)[3], 255);
        assert_eq!(canvas.get_pixel(20, 0)[3], 255);

        // Edge pixels of the arc are partially covered.
        let soft = count(&canvas, |p| p[3] > 0 && p[3] < 255);
        assert!(soft > 0);
    }

    #[test]
    fn test_dim_darkens() {
        let mut canvas = RgbaImage::from_pixel(4, 4, WHITE);
        dim(&mut canvas, 128);
        let px = canvas.get_pixel(1, 1);
        assert!(px[0] < 200);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_play_button_marks_center() {
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 255, 255]));
        play_button(&mut canvas);
        let center = canvas.get_pixel(50, 50);
        assert!(center[0] > 200 && center[1] > 200);
        assert_eq!(*canvas.get_pixel(2, 2), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_warning_glyph_draws_body() {
        let mut canvas = RgbaImage::from_pixel(64, 64, FLAT_GRAY);
        warning_glyph(&mut canvas, (32.0, 32.0), 30.0, AMBER);
        // Left flank of the triangle, away from the exclamation mark.
        assert_eq!(*canvas.get_pixel(24, 40), AMBER);
        assert_eq!(*canvas.get_pixel(32, 30), Rgba([40, 40, 40, 255]));
        assert_eq!(*canvas.get_pixel(2, 2), FLAT_GRAY);
    }

    #[test]
    fn test_embedded_font_draws_centered_caption() {
        let painter = TextPainter::embedded().unwrap();
        let mut canvas = RgbaImage::from_pixel(200, 60, FLAT_GRAY);
        painter.draw_centered(&mut canvas, "image", 24.0, 40.0, ALERT_RED);

        let red = count(&canvas, |p| p[0] > p[1].saturating_add(100));
        assert!(red > 20, "only {red} caption pixels");

        // Nothing above the cap height or near the side edges.
        assert!((0..200).all(|x| *canvas.get_pixel(x, 2) == FLAT_GRAY));
        assert!((0..60).all(|y| *canvas.get_pixel(1, y) == FLAT_GRAY));
    }

    #[test]
    fn test_caption_shrinks_to_fit() {
        let painter = TextPainter::embedded().unwrap();
        let text = "video expired or removed";
        assert!(painter.measure(text, 40.0) > 100.0);

        let mut canvas = RgbaImage::from_pixel(100, 40, SLATE);
        painter.draw_centered(&mut canvas, text, 40.0, 30.0, WHITE);
        assert!((0..40).all(|y| *canvas.get_pixel(0, y) == SLATE));
        assert!((0..40).all(|y| *canvas.get_pixel(99, y) == SLATE));
        assert!(count(&canvas, |p| p[0] > 100) > 0);
    }

    #[test]
    fn test_invalid_font_bytes() {
        assert!(matches!(
            TextPainter::from_bytes(b"not a font"),
            Err(MediaError::Font(_))
        ));
    }
}
