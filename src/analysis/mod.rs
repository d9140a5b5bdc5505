pub mod backend;
pub mod orchestrator;
pub mod state;
pub mod timings;
pub mod types;

pub use backend::{AnalysisBackend, HttpAnalysisBackend};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOrchestratorBuilder, StateTransition};
pub use state::{AnalysisEvent, AnalysisSnapshot, AnalysisState, TransitionError};
pub use timings::{StageTimings, TimedStage};
pub use types::{
    AnalysisResult, ExtractionResponse, FeaturePayload, GaitFeatures, OrthoticPrescription,
    PredictedLoads, PredictionResponse, VideoUpload,
};
