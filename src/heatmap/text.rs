use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use tiny_skia::{Pixmap, PremultipliedColorU8};

use super::layout::{TextAlign, TextLabel};
use crate::error::AppError;

/// Monospace face bundled with egui.
const MONOSPACE_FONT: &str = "Hack";

/// Rasterizes single-line labels straight into a pixmap.
pub struct TextRasterizer {
    font: FontVec,
}

impl std::fmt::Debug for TextRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRasterizer")
            .field("glyphs", &self.font.glyph_count())
            .finish()
    }
}

impl TextRasterizer {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, AppError> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| AppError::Render(format!("Invalid font data: {}", e)))?;
        Ok(Self { font })
    }

    /// Loads the monospace font that ships with egui's default fonts.
    pub fn monospace() -> Result<Self, AppError> {
        let definitions = egui::FontDefinitions::default();
        let data = definitions.font_data.get(MONOSPACE_FONT).ok_or_else(|| {
            AppError::Render(format!("Font {} is not bundled", MONOSPACE_FONT))
        })?;
        Self::from_bytes(data.font.to_vec())
    }

    /// Advance width of `text` at `size` pixels.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(size));
        let mut width = 0.0;
        let mut previous = None;
        for ch in text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(previous) = previous {
                width += scaled.kern(previous, id);
            }
            width += scaled.h_advance(id);
            previous = Some(id);
        }
        width
    }

    pub fn draw(&self, pixmap: &mut Pixmap, label: &TextLabel) {
        let scale = PxScale::from(label.size);
        let scaled = self.font.as_scaled(scale);

        let mut caret = match label.align {
            TextAlign::Left => label.position.x,
            TextAlign::Center => label.position.x - self.measure(&label.text, label.size) / 2.0,
        };
        // Center the em box on the anchor.
        let baseline = label.position.y + (scaled.ascent() + scaled.descent()) / 2.0;

        let mut previous = None;
        for ch in label.text.chars() {
            let id = scaled.glyph_id(ch);
            if let Some(previous) = previous {
                caret += scaled.kern(previous, id);
            }
            let glyph = id.with_scale_and_position(scale, point(caret, baseline));
            caret += scaled.h_advance(id);
            previous = Some(id);

            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                let px = bounds.min.x as i32 + x as i32;
                let py = bounds.min.y as i32 + y as i32;
                blend(pixmap, px, py, label.color, coverage);
            });
        }
    }
}

/// Source-over blend of a straight RGBA color at `coverage` onto one pixel.
fn blend(pixmap: &mut Pixmap, x: i32, y: i32, color: [u8; 4], coverage: f32) {
    if x < 0 || y < 0 || x >= pixmap.width() as i32 || y >= pixmap.height() as i32 {
        return;
    }
    let index = y as usize * pixmap.width() as usize + x as usize;
    let pixels = pixmap.pixels_mut();
    let dst = pixels[index];

    let src_alpha = color[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    let keep = 1.0 - src_alpha;
    let channel = |src: u8, dst: u8| src as f32 * src_alpha + dst as f32 * keep;

    let a = (255.0 * src_alpha + dst.alpha() as f32 * keep).round().min(255.0) as u8;
    let r = (channel(color[0], dst.red()).round() as u8).min(a);
    let g = (channel(color[1], dst.green()).round() as u8).min(a);
    let b = (channel(color[2], dst.blue()).round() as u8).min(a);

    if let Some(out) = PremultipliedColorU8::from_rgba(r, g, b, a) {
        pixels[index] = out;
    }
}
