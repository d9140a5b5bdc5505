use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::AppError;

/// Gait features as computed by the extraction service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GaitFeatures {
    pub mean_ankle_angle: f64,
    pub ankle_angle_range: f64,
    pub ankle_angle_std: f64,
    pub mean_knee_angle: f64,
    pub knee_angle_range: f64,
    pub knee_angle_std: f64,
    pub mean_step_height: f64,
    pub cadence: f64,
    pub stance_ratio: f64,
}

/// The `gait_features` object exactly as the extraction service sent it.
///
/// The prediction service receives these bytes unchanged, so the payload is
/// never decoded and re-encoded on its way through the pipeline.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeaturePayload(Box<RawValue>);

impl FeaturePayload {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        Ok(Self(RawValue::from_string(json.to_string())?))
    }

    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    pub fn decode(&self) -> Result<GaitFeatures, AppError> {
        Ok(serde_json::from_str(self.0.get())?)
    }
}

impl PartialEq for FeaturePayload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for FeaturePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FeaturePayload").field(&self.as_str()).finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PredictedLoads {
    pub forefoot: f64,
    pub midfoot: f64,
    pub rearfoot: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OrthoticPrescription {
    pub rearfoot_medial_post_mm: f64,
    pub rearfoot_lateral_post_mm: f64,
    pub forefoot_lateral_wedge_mm: f64,
    pub forefoot_medial_wedge_mm: f64,
    pub arch_support_mm: f64,
    pub heel_cushion_mm: f64,
}

impl OrthoticPrescription {
    /// Rows of the prescription table, in display order.
    pub fn rows(&self) -> [(&'static str, f64); 6] {
        [
            ("Rearfoot Medial Post", self.rearfoot_medial_post_mm),
            ("Rearfoot Lateral Post", self.rearfoot_lateral_post_mm),
            ("Forefoot Lateral Wedge", self.forefoot_lateral_wedge_mm),
            ("Forefoot Medial Wedge", self.forefoot_medial_wedge_mm),
            ("Arch Support", self.arch_support_mm),
            ("Heel Cushion", self.heel_cushion_mm),
        ]
    }
}

/// Body of a successful `POST /api/analyze`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResponse {
    pub gait_features: FeaturePayload,
    pub video_filename: String,
    pub num_frames: u64,
}

/// Body of a successful `POST /api/predict`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    pub predicted_loads: PredictedLoads,
    pub orthotic_prescription: OrthoticPrescription,
}

/// Merged outcome of one successful run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisResult {
    pub gait_features: FeaturePayload,
    pub predicted_loads: PredictedLoads,
    pub orthotic_prescription: OrthoticPrescription,
    pub video_filename: String,
    pub num_frames: u64,
}

impl AnalysisResult {
    pub fn merge(extraction: ExtractionResponse, prediction: PredictionResponse) -> Self {
        Self {
            gait_features: extraction.gait_features,
            predicted_loads: prediction.predicted_loads,
            orthotic_prescription: prediction.orthotic_prescription,
            video_filename: extraction.video_filename,
            num_frames: extraction.num_frames,
        }
    }
}

/// A video file handed to the orchestrator.
#[derive(Clone, PartialEq)]
pub struct VideoUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for VideoUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoUpload")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl VideoUpload {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads a video from disk, rejecting non-video files and files above
    /// `max_bytes`.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, AppError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| AppError::Video(format!("{} has no file name", path.display())))?
            .to_string();

        let mime_type = video_mime_type(path).ok_or_else(|| {
            AppError::Video(format!("{} is not a recognised video file", filename))
        })?;

        let size = std::fs::metadata(path)?.len();
        if size > max_bytes {
            return Err(AppError::Video(format!(
                "{} is {}, the limit is {}",
                filename,
                format_file_size(size),
                format_file_size(max_bytes)
            )));
        }

        let bytes = std::fs::read(path)?;
        Ok(Self::new(filename, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// MIME type for a video path, judged by extension.
pub fn video_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mpeg" | "mpg" => "video/mpeg",
        "ogv" => "video/ogg",
        "3gp" => "video/3gpp",
        _ => return None,
    };
    Some(mime)
}

/// Human readable size, e.g. `10 MB` or `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (scaled * 100.0).round() / 100.0;

    format!("{} {}", rounded, UNITS[exponent])
}
