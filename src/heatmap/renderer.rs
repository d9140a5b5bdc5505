//! Foot pressure heatmap rasterization
//!
//! Draws a [`HeatmapLayout`] with tiny-skia. The order is fixed: the
//! silhouette, then each zone's gradient clipped to the silhouette, then the
//! zone's value on top with the clip released, then the side labels.

use std::io::Cursor;
use std::path::Path as FsPath;

use image::{ImageFormat, RgbaImage};
use tiny_skia::{
    Color, FillRule, GradientStop, Mask, Paint, Path, PathBuilder, Pixmap, RadialGradient, Rect,
    SpreadMode, Stroke, Transform,
};
use tracing::debug;

use super::layout::{
    HeatmapLayout, PathCommand, Point, RadialFill, ZoneShape, ACCENT, OUTLINE_FILL,
    OUTLINE_STROKE_WIDTH,
};
use super::text::TextRasterizer;
use crate::analysis::types::PredictedLoads;
use crate::error::AppError;

/// Control point distance for approximating a quarter circle with a cubic.
const KAPPA: f32 = 0.552_284_8;

/// Renders pressure heatmaps. Holds only the immutable label font, so every
/// call depends on its arguments alone.
#[derive(Debug)]
pub struct HeatmapRenderer {
    text: TextRasterizer,
}

impl HeatmapRenderer {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self::with_text(TextRasterizer::monospace()?))
    }

    pub fn with_text(text: TextRasterizer) -> Self {
        Self { text }
    }

    /// Renders onto a fresh canvas. A zero-sized canvas yields nothing.
    pub fn render(&self, width: u32, height: u32, loads: &PredictedLoads) -> Option<Pixmap> {
        let mut pixmap = Pixmap::new(width, height)?;
        self.draw(Some(&mut pixmap), loads);
        Some(pixmap)
    }

    /// Redraws `surface` in full. Without a surface this does nothing.
    pub fn draw(&self, surface: Option<&mut Pixmap>, loads: &PredictedLoads) {
        let Some(pixmap) = surface else {
            return;
        };
        let layout = HeatmapLayout::new(pixmap.width(), pixmap.height(), loads);
        self.draw_layout(pixmap, &layout);
    }

    pub fn draw_layout(&self, pixmap: &mut Pixmap, layout: &HeatmapLayout) {
        pixmap.fill(Color::TRANSPARENT);

        let Some(outline) = build_outline(&layout.outline.commands) else {
            debug!("Canvas {}x{} too small for the outline", layout.width, layout.height);
            return;
        };

        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color(color(OUTLINE_FILL));
        pixmap.fill_path(&outline, &paint, FillRule::Winding, Transform::identity(), None);

        paint.set_color(color(ACCENT));
        let stroke = Stroke {
            width: OUTLINE_STROKE_WIDTH,
            ..Stroke::default()
        };
        pixmap.stroke_path(&outline, &paint, &stroke, Transform::identity(), None);

        let clip = Mask::new(pixmap.width(), pixmap.height()).map(|mut mask| {
            mask.fill_path(&outline, FillRule::Winding, true, Transform::identity());
            mask
        });

        for zone in &layout.zones {
            if let (Some(shape), Some(paint)) = (build_shape(&zone.shape), gradient_paint(&zone.fill)) {
                pixmap.fill_path(
                    &shape,
                    &paint,
                    FillRule::Winding,
                    Transform::identity(),
                    clip.as_ref(),
                );
            }
            self.text.draw(pixmap, &zone.value);
        }

        for label in &layout.labels {
            self.text.draw(pixmap, label);
        }
    }
}

fn color([r, g, b, a]: [u8; 4]) -> Color {
    Color::from_rgba8(r, g, b, a)
}

fn skia_point(point: Point) -> tiny_skia::Point {
    tiny_skia::Point::from_xy(point.x, point.y)
}

fn build_outline(commands: &[PathCommand]) -> Option<Path> {
    let mut builder = PathBuilder::new();
    for command in commands {
        match *command {
            PathCommand::MoveTo(p) => builder.move_to(p.x, p.y),
            PathCommand::LineTo(p) => builder.line_to(p.x, p.y),
            PathCommand::QuadTo(c, p) => builder.quad_to(c.x, c.y, p.x, p.y),
            PathCommand::Close => builder.close(),
        }
    }
    builder.finish()
}

fn build_shape(shape: &ZoneShape) -> Option<Path> {
    match *shape {
        ZoneShape::Ellipse { cx, cy, rx, ry } => {
            let oval = Rect::from_xywh(cx - rx, cy - ry, rx * 2.0, ry * 2.0)?;
            PathBuilder::from_oval(oval)
        }
        ZoneShape::RoundedRect {
            x,
            y,
            width,
            height,
            radius,
        } => rounded_rect(x, y, width, height, radius),
    }
}

fn rounded_rect(x: f32, y: f32, w: f32, h: f32, r: f32) -> Option<Path> {
    if r <= 0.0 {
        return Rect::from_xywh(x, y, w, h).map(PathBuilder::from_rect);
    }
    let k = r * KAPPA;
    let (right, bottom) = (x + w, y + h);

    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(right - r, y);
    pb.cubic_to(right - r + k, y, right, y + r - k, right, y + r);
    pb.line_to(right, bottom - r);
    pb.cubic_to(right, bottom - r + k, right - r + k, bottom, right - r, bottom);
    pb.line_to(x + r, bottom);
    pb.cubic_to(x + r - k, bottom, x, bottom - r + k, x, bottom - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + r - k, x + r - k, y, x + r, y);
    pb.close();
    pb.finish()
}

fn gradient_paint(fill: &RadialFill) -> Option<Paint<'static>> {
    if fill.outer_radius <= 0.0 {
        return None;
    }
    let center = skia_point(fill.center);
    let inner_stop = (fill.inner_radius / fill.outer_radius).clamp(0.0, 1.0);
    let shader = RadialGradient::new(
        center,
        center,
        fill.outer_radius,
        vec![
            GradientStop::new(inner_stop, fill.inner.to_skia()),
            GradientStop::new(1.0, fill.outer.to_skia()),
        ],
        SpreadMode::Pad,
        Transform::identity(),
    )?;

    let mut paint = Paint::default();
    paint.shader = shader;
    paint.anti_alias = true;
    Some(paint)
}

/// Straight-alpha RGBA copy of a pixmap.
pub fn to_rgba_image(pixmap: &Pixmap) -> Result<RgbaImage, AppError> {
    let data: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|pixel| {
            let c = pixel.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RgbaImage::from_raw(pixmap.width(), pixmap.height(), data)
        .ok_or_else(|| AppError::Render("Pixel buffer does not match canvas size".to_string()))
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, AppError> {
    let image = to_rgba_image(pixmap)?;
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| AppError::Render(format!("PNG encoding failed: {}", e)))?;
    Ok(bytes)
}

pub fn save_png(pixmap: &Pixmap, path: &FsPath) -> Result<(), AppError> {
    std::fs::write(path, encode_png(pixmap)?)?;
    Ok(())
}

pub fn to_color_image(pixmap: &Pixmap) -> egui::ColorImage {
    egui::ColorImage::from_rgba_premultiplied(
        [pixmap.width() as usize, pixmap.height() as usize],
        pixmap.data(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loads() -> PredictedLoads {
        PredictedLoads {
            forefoot: 0.8,
            midfoot: 0.3,
            rearfoot: 0.5,
        }
    }

    fn rgb(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        (c.red(), c.green(), c.blue(), c.alpha())
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = HeatmapRenderer::new().unwrap();
        let first = renderer.render(300, 450, &loads()).unwrap();
        let second = renderer.render(300, 450, &loads()).unwrap();
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn test_redraw_replaces_previous_frame() {
        let renderer = HeatmapRenderer::new().unwrap();
        let fresh = renderer.render(300, 450, &loads()).unwrap();

        let mut reused = renderer
            .render(
                300,
                450,
                &PredictedLoads {
                    forefoot: 0.1,
                    midfoot: 0.9,
                    rearfoot: 0.0,
                },
            )
            .unwrap();
        renderer.draw(Some(&mut reused), &loads());
        assert_eq!(fresh.data(), reused.data());
    }

    #[test]
    fn test_zones_take_their_load_hue() {
        let renderer = HeatmapRenderer::new().unwrap();
        let pixmap = renderer.render(300, 450, &loads()).unwrap();

        // Forefoot at 80% is orange: red dominates, no blue.
        let (r, g, b, a) = rgb(&pixmap, 90, 67);
        assert_eq!(a, 255);
        assert!(r > g && g > b, "forefoot {:?}", (r, g, b));

        // Midfoot at 30% leans cyan.
        let (r, g, b, _) = rgb(&pixmap, 90, 225);
        assert!(g > b && b > r, "midfoot {:?}", (r, g, b));

        // Rearfoot at 50% is green.
        let (r, g, b, _) = rgb(&pixmap, 100, 382);
        assert!(g > r && g > b, "rearfoot {:?}", (r, g, b));
    }

    #[test]
    fn test_gradient_stays_inside_the_foot() {
        let renderer = HeatmapRenderer::new().unwrap();
        let pixmap = renderer.render(300, 450, &loads()).unwrap();

        // Corners and the gap beside the toes are outside the silhouette.
        assert_eq!(rgb(&pixmap, 2, 2).3, 0);
        assert_eq!(rgb(&pixmap, 2, 447).3, 0);
        assert_eq!(rgb(&pixmap, 60, 20).3, 0);
    }

    #[test]
    fn test_side_labels_are_drawn_outside_the_clip() {
        let renderer = HeatmapRenderer::new().unwrap();
        let pixmap = renderer.render(300, 450, &loads()).unwrap();

        let inked = (255..300u32)
            .flat_map(|x| (60..75u32).map(move |y| (x, y)))
            .any(|(x, y)| rgb(&pixmap, x, y).3 > 0);
        assert!(inked);
    }

    #[test]
    fn test_missing_surface_and_empty_canvas_are_silent() {
        let renderer = HeatmapRenderer::new().unwrap();
        renderer.draw(None, &loads());
        assert!(renderer.render(0, 450, &loads()).is_none());
    }

    #[test]
    fn test_png_round_trips_dimensions() {
        let renderer = HeatmapRenderer::new().unwrap();
        let pixmap = renderer.render(120, 180, &loads()).unwrap();
        let bytes = encode_png(&pixmap).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 180));
    }
}
