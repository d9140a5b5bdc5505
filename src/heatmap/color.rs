//! Pressure to color mapping.
//!
//! Loads run from blue (no pressure) through green and yellow to red (full
//! pressure) by sweeping the hue from 240° down to 0° at full saturation and
//! half lightness.

use std::fmt;

const MAX_HUE: f32 = 240.0;

/// An HSLA color with hue in degrees and the other channels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatColor {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub alpha: f32,
}

/// Color for a pressure fraction. Values outside [0, 1] are clamped first.
pub fn heat_color(value: f64, alpha: f32) -> HeatColor {
    let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    HeatColor {
        hue: ((1.0 - value) * MAX_HUE as f64) as f32,
        saturation: 1.0,
        lightness: 0.5,
        alpha: alpha.clamp(0.0, 1.0),
    }
}

impl HeatColor {
    /// Straight (non premultiplied) RGBA channels in [0, 1].
    pub fn to_rgba(&self) -> [f32; 4] {
        let chroma = (1.0 - (2.0 * self.lightness - 1.0).abs()) * self.saturation;
        let sector = (self.hue / 60.0).rem_euclid(6.0);
        let x = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
        let (r, g, b) = match sector as u32 {
            0 => (chroma, x, 0.0),
            1 => (x, chroma, 0.0),
            2 => (0.0, chroma, x),
            3 => (0.0, x, chroma),
            4 => (x, 0.0, chroma),
            _ => (chroma, 0.0, x),
        };
        let m = self.lightness - chroma / 2.0;
        [r + m, g + m, b + m, self.alpha]
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        self.to_rgba().map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    pub fn to_skia(&self) -> tiny_skia::Color {
        let [r, g, b, a] = self.to_rgba();
        tiny_skia::Color::from_rgba(r, g, b, a).unwrap_or(tiny_skia::Color::TRANSPARENT)
    }

    pub fn to_egui(&self) -> egui::Color32 {
        let [r, g, b, a] = self.to_rgba8();
        egui::Color32::from_rgba_unmultiplied(r, g, b, a)
    }
}

impl fmt::Display for HeatColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsla({}, {}%, {}%, {})",
            self.hue,
            self.saturation * 100.0,
            self.lightness * 100.0,
            self.alpha
        )
    }
}

/// One swatch of the pressure legend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendStop {
    pub label: &'static str,
    pub value: f64,
    pub color: HeatColor,
}

/// The Low / Med / High legend shown under the heatmap.
pub fn legend() -> [LegendStop; 3] {
    [("Low", 0.0), ("Med", 0.5), ("High", 1.0)].map(|(label, value)| LegendStop {
        label,
        value,
        color: heat_color(value, 1.0),
    })
}
