use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_NAME: &str = "vorma";
const ENV_PREFIX: &str = "VORMA";

/// Application settings, layered as defaults < config file < environment.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub services: ServiceSettings,
    pub pipeline: PipelineSettings,
    pub heatmap: HeatmapSettings,
    pub upload: UploadSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    pub extractor_url: String,
    pub predictor_url: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            extractor_url: "https://vorma-backend-extractor.onrender.com".to_string(),
            predictor_url: "https://vorma-backend-predictor.onrender.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Minimum time the uploading state stays visible, in milliseconds.
    pub min_display_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_display_ms: 5000,
        }
    }
}

impl PipelineSettings {
    pub fn min_display(&self) -> Duration {
        Duration::from_millis(self.min_display_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeatmapSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for HeatmapSettings {
    fn default() -> Self {
        Self {
            width: 300,
            height: 450,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadSettings {
    pub max_file_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_bytes: 500 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from `path` when given, otherwise from an optional
    /// `vorma.toml` in the working directory. `VORMA__SECTION__KEY`
    /// environment variables override both.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), AppError> {
        if self.services.extractor_url.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "Extractor URL must not be empty".to_string(),
            ));
        }

        if self.services.predictor_url.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "Predictor URL must not be empty".to_string(),
            ));
        }

        if self.heatmap.width == 0 || self.heatmap.height == 0 {
            return Err(AppError::InvalidConfig(format!(
                "Heatmap canvas must be non-empty, got {}x{}",
                self.heatmap.width, self.heatmap.height
            )));
        }

        if self.upload.max_file_bytes == 0 {
            return Err(AppError::InvalidConfig(
                "Upload size limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
