//! Template compositing.
//!
//! A render opens the template, erases the configured regions, draws the
//! amount and timestamp at their anchored positions, and encodes the result
//! into a uniquely named file in the OS temp directory. The artifact is the
//! caller's to delete once delivery has been attempted.

pub mod text;

use std::path::PathBuf;
use std::time::Instant;

use image::RgbImage;
use uuid::Uuid;

use crate::config::{EraseRect, HAlign, OutputFormat, RenderConfig, TextPlacement, VAlign};
use crate::error::RenderError;
use crate::fonts::FontResolver;
use crate::render::text::TextMetrics;

pub struct Renderer {
    config: RenderConfig,
    fonts: FontResolver,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        let fonts = FontResolver::new(config.base_dir.clone());
        Self { config, fonts }
    }

    /// Renderer with a pinned font resolver; tests isolate the probe chain.
    pub fn with_fonts(config: RenderConfig, fonts: FontResolver) -> Self {
        Self { config, fonts }
    }

    /// Compose and encode one artifact. On any failure no file remains.
    pub fn render(&self, amount_text: &str, time_text: &str) -> Result<PathBuf, RenderError> {
        let started = Instant::now();
        let canvas = self.compose(amount_text, time_text)?;

        let format = OutputFormat::parse(&self.config.output_format)
            .ok_or_else(|| RenderError::UnsupportedFormat(self.config.output_format.clone()))?;
        let path = std::env::temp_dir().join(format!(
            "stampbot-{}.{}",
            Uuid::new_v4(),
            format.extension()
        ));

        if let Err(e) = canvas.save_with_format(&path, format.image_format()) {
            // Encoders may leave a partial file behind.
            let _ = std::fs::remove_file(&path);
            return Err(RenderError::Encode(e.to_string()));
        }

        tracing::info!(
            "rendered artifact {} in {} ms",
            path.display(),
            started.elapsed().as_millis()
        );
        Ok(path)
    }

    /// The drawing half of a render, without touching the filesystem for
    /// output. Exposed so placement can be inspected pixel by pixel.
    pub fn compose(&self, amount_text: &str, time_text: &str) -> Result<RgbImage, RenderError> {
        let template = self.config.template_path();
        if !template.exists() {
            return Err(RenderError::TemplateMissing(template));
        }
        let opened = image::open(&template).map_err(|e| RenderError::TemplateDecode {
            path: template.display().to_string(),
            message: e.to_string(),
        })?;
        let mut canvas = opened.to_rgb8();

        // Each field erases right before it draws, so a later erase rect may
        // blank out an earlier field's ink.
        self.draw_value(&mut canvas, &self.config.amount, amount_text, true);
        self.draw_value(&mut canvas, &self.config.time, time_text, false);
        Ok(canvas)
    }

    fn draw_value(
        &self,
        canvas: &mut RgbImage,
        placement: &TextPlacement,
        value: &str,
        allow_bold: bool,
    ) {
        if let Some(erase) = placement.erase {
            fill_rect(canvas, erase);
        }

        let font = self.fonts.load(placement.font.as_deref(), placement.size);
        let metrics = text::measure(&font, placement.size, value);
        let (pen_x, top_y) = anchored_origin(placement, &metrics);

        // Simulated bold: double-strike around the true position, then the
        // true position last. The timestamp never bolds.
        if allow_bold && placement.bold {
            let o = i64::from(placement.bold_offset.max(1));
            for (dx, dy) in [(-o, 0), (o, 0), (0, -o), (0, o)] {
                text::draw(
                    canvas,
                    &font,
                    placement.size,
                    value,
                    pen_x + dx,
                    top_y + dy,
                    placement.fill,
                );
            }
        }
        text::draw(canvas, &font, placement.size, value, pen_x, top_y, placement.fill);
    }
}

/// Line-box origin for a placement: `(pen_x, top_y)`.
fn anchored_origin(placement: &TextPlacement, metrics: &TextMetrics) -> (i64, i64) {
    let width = i64::from(metrics.width);
    let pen_x = match placement.anchor.h {
        HAlign::Left => placement.x,
        HAlign::Center => placement.x - width / 2,
        HAlign::Right => placement.x - width,
    };
    let line = metrics.line_height();
    let top_y = match placement.anchor.v {
        VAlign::Ascender | VAlign::Top => placement.y,
        VAlign::Middle => placement.y - line / 2,
        VAlign::Baseline => placement.y - metrics.ascent,
        VAlign::Bottom | VAlign::Descender => placement.y - line,
    };
    (pen_x, top_y)
}

fn fill_rect(canvas: &mut RgbImage, rect: EraseRect) {
    let (width, height) = canvas.dimensions();
    let x0 = rect.x.clamp(0, i64::from(width)) as u32;
    let y0 = rect.y.clamp(0, i64::from(height)) as u32;
    let x1 = (rect.x + i64::from(rect.width)).clamp(0, i64::from(width)) as u32;
    let y1 = (rect.y + i64::from(rect.height)).clamp(0, i64::from(height)) as u32;
    for y in y0..y1 {
        for x in x0..x1 {
            canvas.put_pixel(x, y, rect.fill.rgb());
        }
    }
}
