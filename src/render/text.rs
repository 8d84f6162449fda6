//! Text measurement and rasterization over an RGB canvas.
//!
//! Scalable fonts lay out with `ab_glyph` and alpha-blend anti-aliased
//! coverage into the background. Bitmap fonts blit fixed Spleen cells with
//! hard edges. Both clip silently at the canvas bounds.

use ab_glyph::{Font, FontArc, PxScale, ScaleFont, point};
use image::RgbImage;
use spleen_font::PSF2Font;

use crate::config::Color;
use crate::fonts::{BitmapFont, FontHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMetrics {
    /// Total advance width in pixels.
    pub width: u32,
    /// Pixels above the baseline.
    pub ascent: i64,
    /// Pixels below the baseline (positive).
    pub descent: i64,
}

impl TextMetrics {
    pub fn line_height(&self) -> i64 {
        self.ascent + self.descent
    }
}

pub fn measure(font: &FontHandle, size: u32, text: &str) -> TextMetrics {
    match font {
        FontHandle::Scalable(font) => measure_scalable(font, size, text),
        FontHandle::Bitmap(bitmap) => TextMetrics {
            width: bitmap.width * text.chars().count() as u32,
            ascent: i64::from(bitmap.height),
            descent: 0,
        },
    }
}

/// Draw `text` with its line box top-left corner at `(x, top_y)`.
pub fn draw(
    canvas: &mut RgbImage,
    font: &FontHandle,
    size: u32,
    text: &str,
    x: i64,
    top_y: i64,
    fill: Color,
) {
    match font {
        FontHandle::Scalable(font) => draw_scalable(canvas, font, size, text, x, top_y, fill),
        FontHandle::Bitmap(bitmap) => draw_bitmap(canvas, *bitmap, text, x, top_y, fill),
    }
}

fn measure_scalable(font: &FontArc, size: u32, text: &str) -> TextMetrics {
    let scaled = font.as_scaled(PxScale::from(size as f32));
    let width: f32 = text
        .chars()
        .map(|ch| scaled.h_advance(font.glyph_id(ch)))
        .sum();
    TextMetrics {
        width: width.ceil() as u32,
        ascent: scaled.ascent().ceil() as i64,
        descent: (-scaled.descent()).ceil() as i64,
    }
}

fn draw_scalable(
    canvas: &mut RgbImage,
    font: &FontArc,
    size: u32,
    text: &str,
    x: i64,
    top_y: i64,
    fill: Color,
) {
    let scale = PxScale::from(size as f32);
    let scaled = font.as_scaled(scale);
    let baseline = top_y as f32 + scaled.ascent();
    let (width, height) = canvas.dimensions();
    let mut caret = x as f32;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        let glyph = glyph_id.with_scale_and_position(scale, point(caret, baseline));
        caret += scaled.h_advance(glyph_id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, coverage| {
            let cx = i64::from(px) + bounds.min.x as i64;
            let cy = i64::from(py) + bounds.min.y as i64;
            if cx < 0 || cy < 0 || cx >= i64::from(width) || cy >= i64::from(height) {
                return;
            }
            blend(canvas.get_pixel_mut(cx as u32, cy as u32), fill, coverage);
        });
    }
}

fn draw_bitmap(
    canvas: &mut RgbImage,
    font: BitmapFont,
    text: &str,
    x: i64,
    top_y: i64,
    fill: Color,
) {
    let (width, height) = canvas.dimensions();
    let mut psf = PSF2Font::new(font.data).unwrap();
    let mut cell_x = x;

    for ch in text.chars() {
        let utf8 = ch.to_string();
        if let Some(glyph) = psf.glyph_for_utf8(utf8.as_bytes()) {
            for (row_y, row) in glyph.enumerate() {
                for (col_x, on) in row.enumerate() {
                    if !on {
                        continue;
                    }
                    let cx = cell_x + col_x as i64;
                    let cy = top_y + row_y as i64;
                    if cx < 0 || cy < 0 || cx >= i64::from(width) || cy >= i64::from(height) {
                        continue;
                    }
                    canvas.put_pixel(cx as u32, cy as u32, fill.rgb());
                }
            }
        }
        cell_x += i64::from(font.width);
    }
}

/// `dst = src * a + dst * (1 - a)`, per channel.
fn blend(pixel: &mut image::Rgb<u8>, fill: Color, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    for (dst, src) in pixel.0.iter_mut().zip(fill.0) {
        *dst = (f32::from(src) * alpha + f32::from(*dst) * (1.0 - alpha)) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ink_count(canvas: &RgbImage, background: Color) -> usize {
        canvas
            .pixels()
            .filter(|p| p.0 != background.0)
            .count()
    }

    #[test]
    fn bitmap_measure_is_cell_multiples() {
        let font = FontHandle::Bitmap(BitmapFont::nearest(48));
        let metrics = measure(&font, 48, "+ 320");
        assert_eq!(metrics.width, 12 * 5);
        assert_eq!(metrics.line_height(), 24);
    }

    #[test]
    fn empty_text_measures_zero_width() {
        let font = FontHandle::Bitmap(BitmapFont::nearest(48));
        assert_eq!(measure(&font, 48, "").width, 0);
    }

    #[test]
    fn bitmap_draw_leaves_ink() {
        let mut canvas = RgbImage::from_pixel(64, 32, Color::WHITE.rgb());
        let font = FontHandle::Bitmap(BitmapFont::nearest(20));
        draw(&mut canvas, &font, 20, "7", 4, 4, Color::BLACK);
        assert!(ink_count(&canvas, Color::WHITE) > 0);
    }

    #[test]
    fn off_canvas_draw_clips_silently() {
        let mut canvas = RgbImage::from_pixel(16, 16, Color::WHITE.rgb());
        let font = FontHandle::Bitmap(BitmapFont::nearest(20));
        draw(&mut canvas, &font, 20, "320", -200, -200, Color::BLACK);
        draw(&mut canvas, &font, 20, "320", 400, 400, Color::BLACK);
        assert_eq!(ink_count(&canvas, Color::WHITE), 0);
    }

    #[test]
    fn blend_full_coverage_replaces_pixel() {
        let mut pixel = image::Rgb([255u8, 255, 255]);
        blend(&mut pixel, Color::BLACK, 1.0);
        assert_eq!(pixel.0, [0, 0, 0]);
    }

    #[test]
    fn blend_half_coverage_mixes() {
        let mut pixel = image::Rgb([200u8, 200, 200]);
        blend(&mut pixel, Color::BLACK, 0.5);
        assert!(pixel.0[0] > 0 && pixel.0[0] < 200);
    }

    #[test]
    fn blend_zero_coverage_is_a_no_op() {
        let mut pixel = image::Rgb([10u8, 20, 30]);
        blend(&mut pixel, Color::WHITE, 0.0);
        assert_eq!(pixel.0, [10, 20, 30]);
    }
}
