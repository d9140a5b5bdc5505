use thiserror::Error;

use crate::analysis::state::AnalysisState;

const UNKNOWN_ERROR: &str = "An unknown error occurred";

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{} failed: {reason}", stage.label())]
    Status {
        stage: PipelineStage,
        status: u16,
        reason: String,
    },
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("An analysis is already running (state: {0})")]
    Busy(AnalysisState),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Invalid video: {0}")]
    Video(String),
    #[error("{0}")]
    Task(String),
    #[error("UI error: {0}")]
    Ui(String),
}

impl AppError {
    /// Text shown to the user when a run ends in the error state.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            message
        }
    }
}

/// The remote call an HTTP failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Extraction,
    Prediction,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Extraction => "Extraction",
            PipelineStage::Prediction => "Prediction",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PipelineStage::Extraction => "Feature extraction",
            PipelineStage::Prediction => "Prediction",
        }
    }
}
