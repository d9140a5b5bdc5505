use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use super::types::{ExtractionResponse, FeaturePayload, PredictionResponse, VideoUpload};
use crate::config::ServiceSettings;
use crate::error::{AppError, PipelineStage};

const ANALYZE_PATH: &str = "/api/analyze";
const PREDICT_PATH: &str = "/api/predict";
const FILE_FIELD: &str = "file";

/// The two remote stages of an analysis run.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Uploads the video and returns the extracted gait features.
    async fn extract(&self, video: VideoUpload) -> Result<ExtractionResponse, AppError>;

    /// Sends the gait features, unchanged, to the prediction service.
    async fn predict(&self, features: &FeaturePayload) -> Result<PredictionResponse, AppError>;

    fn name(&self) -> &'static str;
}

/// Talks to the extraction and prediction services over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAnalysisBackend {
    client: Client,
    analyze_url: String,
    predict_url: String,
}

impl HttpAnalysisBackend {
    pub fn new(services: &ServiceSettings) -> Result<Self, AppError> {
        let client = Client::builder().build()?;
        Ok(Self::with_client(client, services))
    }

    pub fn with_client(client: Client, services: &ServiceSettings) -> Self {
        Self {
            client,
            analyze_url: endpoint(&services.extractor_url, ANALYZE_PATH),
            predict_url: endpoint(&services.predictor_url, PREDICT_PATH),
        }
    }

    pub fn analyze_url(&self) -> &str {
        &self.analyze_url
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

#[async_trait]
impl AnalysisBackend for HttpAnalysisBackend {
    #[instrument(skip(self, video), fields(file = %video.filename, bytes = video.bytes.len()))]
    async fn extract(&self, video: VideoUpload) -> Result<ExtractionResponse, AppError> {
        let part = Part::bytes(video.bytes)
            .file_name(video.filename)
            .mime_str(&video.mime_type)?;
        let form = Form::new().part(FILE_FIELD, part);

        debug!("POST {}", self.analyze_url);
        let response = self
            .client
            .post(&self.analyze_url)
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response, PipelineStage::Extraction)?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[instrument(skip_all)]
    async fn predict(&self, features: &FeaturePayload) -> Result<PredictionResponse, AppError> {
        debug!("POST {}", self.predict_url);
        let response = self
            .client
            .post(&self.predict_url)
            .header(CONTENT_TYPE, "application/json")
            .body(features.as_str().to_owned())
            .send()
            .await?;
        let response = ensure_success(response, PipelineStage::Prediction)?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn name(&self) -> &'static str {
        "HttpAnalysisBackend"
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

fn ensure_success(response: Response, stage: PipelineStage) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(AppError::Status {
        stage,
        status: status.as_u16(),
        reason: status
            .canonical_reason()
            .unwrap_or(status.as_str())
            .to_string(),
    })
}
