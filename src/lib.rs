pub mod analysis;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod heatmap;

pub use analysis::{AnalysisOrchestrator, AnalysisSnapshot, AnalysisState, HttpAnalysisBackend};
pub use config::Settings;
pub use error::{AppError, PipelineStage};
pub use heatmap::HeatmapRenderer;
