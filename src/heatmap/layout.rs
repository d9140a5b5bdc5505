//! Heatmap layout calculation
//!
//! Everything the renderer draws is computed here first, in canvas pixels,
//! from the canvas size and the three loads. Keeping the geometry apart from
//! rasterization lets it be tested without touching pixels.

use crate::analysis::types::PredictedLoads;

use super::color::{heat_color, HeatColor};

pub const OUTLINE_FILL: [u8; 4] = [0x1a, 0x1f, 0x2e, 0xff];
pub const ACCENT: [u8; 4] = [0x22, 0xd3, 0xee, 0xff];
pub const VALUE_TEXT: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
pub const OUTLINE_STROKE_WIDTH: f32 = 2.0;
pub const VALUE_FONT_PX: f32 = 14.0;
pub const LABEL_FONT_PX: f32 = 12.0;

const GRADIENT_INNER_ALPHA: f32 = 0.9;
const GRADIENT_OUTER_ALPHA: f32 = 0.3;
const MIDFOOT_CORNER_RADIUS: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo(Point, Point),
    Close,
}

/// The foot silhouette, scaled to a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct FootOutline {
    pub commands: Vec<PathCommand>,
}

impl FootOutline {
    pub fn new(width: f32, height: f32) -> Self {
        let p = |fx: f32, fy: f32| Point::new(width * fx, height * fy);

        let commands = vec![
            // Heel
            PathCommand::MoveTo(p(0.3, 0.95)),
            PathCommand::QuadTo(p(0.5, 1.0), p(0.7, 0.95)),
            // Lateral edge
            PathCommand::LineTo(p(0.75, 0.75)),
            PathCommand::QuadTo(p(0.8, 0.5), p(0.8, 0.3)),
            // Toes
            PathCommand::QuadTo(p(0.8, 0.15), p(0.7, 0.05)),
            PathCommand::QuadTo(p(0.5, 0.0), p(0.3, 0.05)),
            PathCommand::QuadTo(p(0.2, 0.15), p(0.2, 0.3)),
            // Medial edge
            PathCommand::QuadTo(p(0.2, 0.5), p(0.25, 0.75)),
            PathCommand::Close,
        ];

        Self { commands }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    Forefoot,
    Midfoot,
    Rearfoot,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Forefoot, Zone::Midfoot, Zone::Rearfoot];

    pub fn label(&self) -> &'static str {
        match self {
            Zone::Forefoot => "Forefoot",
            Zone::Midfoot => "Midfoot",
            Zone::Rearfoot => "Rearfoot",
        }
    }

    pub fn load(&self, loads: &PredictedLoads) -> f64 {
        match self {
            Zone::Forefoot => loads.forefoot,
            Zone::Midfoot => loads.midfoot,
            Zone::Rearfoot => loads.rearfoot,
        }
    }

    /// Vertical position of the zone's text, as a fraction of the height.
    fn anchor(&self) -> f32 {
        match self {
            Zone::Forefoot => 0.15,
            Zone::Midfoot => 0.5,
            Zone::Rearfoot => 0.85,
        }
    }

    fn shape(&self, width: f32, height: f32) -> ZoneShape {
        match self {
            Zone::Forefoot => ZoneShape::Ellipse {
                cx: width * 0.5,
                cy: height * 0.15,
                rx: width * 0.25,
                ry: height * 0.12,
            },
            Zone::Midfoot => {
                let (w, h) = (width * 0.44, height * 0.26);
                ZoneShape::RoundedRect {
                    x: width * 0.28,
                    y: height * 0.38,
                    width: w,
                    height: h,
                    radius: MIDFOOT_CORNER_RADIUS.min(w / 2.0).min(h / 2.0),
                }
            }
            Zone::Rearfoot => ZoneShape::Ellipse {
                cx: width * 0.5,
                cy: height * 0.85,
                rx: width * 0.2,
                ry: height * 0.12,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneShape {
    Ellipse {
        cx: f32,
        cy: f32,
        rx: f32,
        ry: f32,
    },
    RoundedRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    },
}

/// Concentric radial gradient. Inside `inner_radius` the inner color is
/// solid, past `outer_radius` the outer color is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialFill {
    pub center: Point,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub inner: HeatColor,
    pub outer: HeatColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
}

/// A line of text, vertically centered on `position.y`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub position: Point,
    pub size: f32,
    pub color: [u8; 4],
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZonePlan {
    pub zone: Zone,
    pub load: f64,
    pub shape: ZoneShape,
    pub fill: RadialFill,
    pub value: TextLabel,
}

/// Pre-calculated drawing plan for one heatmap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatmapLayout {
    pub width: u32,
    pub height: u32,
    pub outline: FootOutline,
    pub zones: Vec<ZonePlan>,
    pub labels: Vec<TextLabel>,
}

impl HeatmapLayout {
    pub fn new(width: u32, height: u32, loads: &PredictedLoads) -> Self {
        let (w, h) = (width as f32, height as f32);

        let zones = Zone::ALL
            .iter()
            .map(|zone| {
                let load = zone.load(loads);
                let anchor = Point::new(w * 0.5, h * zone.anchor());
                ZonePlan {
                    zone: *zone,
                    load,
                    shape: zone.shape(w, h),
                    fill: RadialFill {
                        center: anchor,
                        inner_radius: w * 0.05,
                        outer_radius: w * 0.35,
                        inner: heat_color(load, GRADIENT_INNER_ALPHA),
                        outer: heat_color(load, GRADIENT_OUTER_ALPHA),
                    },
                    value: TextLabel {
                        text: format_percentage(load),
                        position: anchor,
                        size: VALUE_FONT_PX,
                        color: VALUE_TEXT,
                        align: TextAlign::Center,
                    },
                }
            })
            .collect();

        let labels = Zone::ALL
            .iter()
            .map(|zone| TextLabel {
                text: zone.label().to_string(),
                position: Point::new(w * 0.85, h * zone.anchor()),
                size: LABEL_FONT_PX,
                color: ACCENT,
                align: TextAlign::Left,
            })
            .collect();

        Self {
            width,
            height,
            outline: FootOutline::new(w, h),
            zones,
            labels,
        }
    }

    pub fn zone(&self, zone: Zone) -> Option<&ZonePlan> {
        self.zones.iter().find(|plan| plan.zone == zone)
    }
}

/// `0.8` becomes `80.0%`.
pub fn format_percentage(load: f64) -> String {
    format!("{:.1}%", load * 100.0)
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

    #[test]
    fn test_zone_values_and_hues() {
        let layout = HeatmapLayout::new(300, 450, &loads());

        let texts: Vec<&str> = layout.zones.iter().map(|z| z.value.text.as_str()).collect();
        assert_eq!(texts, vec!["80.0%", "30.0%", "50.0%"]);

        let hues: Vec<f32> = layout.zones.iter().map(|z| z.fill.inner.hue).collect();
        assert!((hues[0] - 48.0).abs() < 1e-3);
        assert!((hues[1] - 168.0).abs() < 1e-3);
        assert!((hues[2] - 120.0).abs() < 1e-3);

        let forefoot = layout.zone(Zone::Forefoot).unwrap();
        assert_eq!(forefoot.fill.inner.alpha, 0.9);
        assert_eq!(forefoot.fill.outer.alpha, 0.3);
        assert_eq!(forefoot.fill.center, Point::new(150.0, 67.5));
        assert_eq!(forefoot.fill.inner_radius, 15.0);
        assert_eq!(forefoot.fill.outer_radius, 105.0);
    }

    #[test]
    fn test_outline_is_closed_and_load_independent() {
        let a = HeatmapLayout::new(300, 450, &loads());
        let b = HeatmapLayout::new(
            300,
            450,
            &PredictedLoads {
                forefoot: 0.0,
                midfoot: 1.0,
                rearfoot: 0.2,
            },
        );
        assert_eq!(a.outline, b.outline);
        assert_eq!(a.outline.commands.first(), Some(&PathCommand::MoveTo(Point::new(90.0, 427.5))));
        assert_eq!(a.outline.commands.last(), Some(&PathCommand::Close));
    }

    #[test]
    fn test_midfoot_corner_radius_is_clamped() {
        let layout = HeatmapLayout::new(300, 450, &loads());
        match layout.zone(Zone::Midfoot).unwrap().shape {
            ZoneShape::RoundedRect { radius, .. } => assert_eq!(radius, 40.0),
            other => panic!("unexpected midfoot shape {:?}", other),
        }

        let small = HeatmapLayout::new(100, 150, &loads());
        match small.zone(Zone::Midfoot).unwrap().shape {
            ZoneShape::RoundedRect { radius, width, height, .. } => {
                assert_eq!(radius, (width / 2.0).min(height / 2.0))
            }
            other => panic!("unexpected midfoot shape {:?}", other),
        }
    }

    #[test]
    fn test_side_labels_are_left_aligned_outside_the_foot() {
        let layout = HeatmapLayout::new(300, 450, &loads());
        let names: Vec<&str> = layout.labels.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(names, vec!["Forefoot", "Midfoot", "Rearfoot"]);
        assert!(layout
            .labels
            .iter()
            .all(|l| l.align == TextAlign::Left && l.position.x == 255.0));
    }

    #[test]
    fn test_out_of_range_load_prints_raw_value() {
        let layout = HeatmapLayout::new(
            300,
            450,
            &PredictedLoads {
                forefoot: 1.25,
                midfoot: -0.1,
                rearfoot: 0.5,
            },
        );
        let forefoot = layout.zone(Zone::Forefoot).unwrap();
        assert_eq!(forefoot.value.text, "125.0%");
        assert_eq!(forefoot.fill.inner.hue, 0.0);
        assert_eq!(layout.zone(Zone::Midfoot).unwrap().fill.inner.hue, 240.0);
    }
}
