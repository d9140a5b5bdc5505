pub mod color;
pub mod layout;
pub mod renderer;
pub mod text;

pub use color::{heat_color, legend, HeatColor, LegendStop};
pub use layout::{format_percentage, HeatmapLayout, Zone};
pub use renderer::{encode_png, save_png, to_color_image, HeatmapRenderer};
pub use text::TextRasterizer;
