use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::backend::AnalysisBackend;
use super::state::{AnalysisEvent, AnalysisSnapshot, AnalysisState};
use super::timings::{StageTimings, TimedStage};
use super::types::{AnalysisResult, VideoUpload};
use crate::error::AppError;

const TRANSITION_BUFFER: usize = 64;

/// A state change of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub from: AnalysisState,
    pub to: AnalysisState,
}

/// Drives a video through extraction and prediction and publishes every
/// state change as an [`AnalysisSnapshot`].
///
/// The snapshot channel only keeps the latest value. Observers that need
/// every step, including ones that are left within the same poll, use
/// [`AnalysisOrchestrator::transitions`].
pub struct AnalysisOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    min_display: Duration,
    state_tx: watch::Sender<AnalysisSnapshot>,
    transition_tx: broadcast::Sender<StateTransition>,
}

impl AnalysisOrchestrator {
    pub fn new(backend: Arc<dyn AnalysisBackend>, min_display: Duration) -> Self {
        let (state_tx, _) = watch::channel(AnalysisSnapshot::idle());
        let (transition_tx, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            backend,
            min_display,
            state_tx,
            transition_tx,
        }
    }

    pub fn builder() -> AnalysisOrchestratorBuilder {
        AnalysisOrchestratorBuilder::new()
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn state(&self) -> AnalysisState {
        self.state_tx.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transition_tx.subscribe()
    }

    pub fn min_display(&self) -> Duration {
        self.min_display
    }

    /// Starts a run for `video`.
    ///
    /// The state moves to uploading before this returns. Fails with
    /// [`AppError::Busy`] while another run is in flight.
    pub fn submit(&self, video: VideoUpload) -> Result<JoinHandle<()>, AppError> {
        let run_id = Uuid::new_v4();
        let event = AnalysisEvent::Submitted {
            run_id,
            filename: video.filename.clone(),
            at: Utc::now(),
        };

        let mut outcome = Err(AnalysisState::Idle);
        self.state_tx.send_if_modified(|snapshot| match snapshot.reduce(event) {
            Ok(next) => {
                outcome = Ok(snapshot.state);
                *snapshot = next;
                true
            }
            Err(err) => {
                outcome = Err(err.state);
                false
            }
        });

        let from = match outcome {
            Ok(from) => from,
            Err(state) => {
                warn!("Rejected submission of {} while {}", video.filename, state);
                return Err(AppError::Busy(state));
            }
        };

        info!("Run {} started for {}", run_id, video.filename);
        let run = PipelineRun {
            run_id,
            backend: Arc::clone(&self.backend),
            min_display: self.min_display,
            state_tx: self.state_tx.clone(),
            transition_tx: self.transition_tx.clone(),
            timings: StageTimings::new(),
        };
        run.announce(from, AnalysisState::Uploading);

        Ok(tokio::spawn(run.execute(video)))
    }

    /// Returns a finished run to idle. Fails with [`AppError::Busy`] while a
    /// run is in flight.
    pub fn reset(&self) -> Result<(), AppError> {
        let mut outcome = Ok(());
        self.state_tx.send_if_modified(|snapshot| {
            if snapshot.state == AnalysisState::Idle {
                return false;
            }
            match snapshot.reduce(AnalysisEvent::Reset) {
                Ok(next) => {
                    info!("Cleared {} run", snapshot.state);
                    *snapshot = next;
                    true
                }
                Err(err) => {
                    outcome = Err(AppError::Busy(err.state));
                    false
                }
            }
        });
        outcome
    }
}

/// One submission's request lifecycle.
struct PipelineRun {
    run_id: Uuid,
    backend: Arc<dyn AnalysisBackend>,
    min_display: Duration,
    state_tx: watch::Sender<AnalysisSnapshot>,
    transition_tx: broadcast::Sender<StateTransition>,
    timings: StageTimings,
}

impl PipelineRun {
    #[instrument(skip_all, fields(run = %self.run_id, backend = self.backend.name()))]
    async fn execute(mut self, video: VideoUpload) {
        let outcome = self.run_stages(video).await;
        self.dispatch(AnalysisEvent::Timed(self.timings.clone()));

        match outcome {
            Ok(result) => {
                info!(
                    "Run completed: {} ({} frames) in {}ms",
                    result.video_filename,
                    result.num_frames,
                    self.timings.total().as_millis()
                );
                self.dispatch(AnalysisEvent::PredictionSucceeded(Arc::new(result)));
            }
            Err(err) => {
                error!("Analysis failed: {}", err);
                self.dispatch(AnalysisEvent::Failed(err.user_message()));
            }
        }
    }

    async fn run_stages(&mut self, video: VideoUpload) -> Result<AnalysisResult, AppError> {
        let backend = Arc::clone(&self.backend);

        // The request starts now; the pacing timer runs alongside it.
        self.timings.enter(TimedStage::Extraction);
        self.timings.enter(TimedStage::Pacing);
        let mut extraction = backend.extract(video);
        let pacing = tokio::time::sleep(self.min_display);
        tokio::pin!(pacing);

        let mut early = None;
        loop {
            tokio::select! {
                response = &mut extraction, if early.is_none() => {
                    self.timings.exit(TimedStage::Extraction);
                    debug!("Extraction answered inside the pacing window, holding it");
                    early = Some(response);
                }
                _ = &mut pacing => break,
            }
        }
        self.timings.exit(TimedStage::Pacing);
        self.dispatch(AnalysisEvent::PacingElapsed);

        let extracted = match early {
            Some(response) => response,
            None => {
                let response = extraction.await;
                self.timings.exit(TimedStage::Extraction);
                response
            }
        }?;
        debug!(
            "Extracted features from {} ({} frames)",
            extracted.video_filename, extracted.num_frames
        );
        self.dispatch(AnalysisEvent::ExtractionSucceeded);

        self.timings.enter(TimedStage::Prediction);
        let predicted = backend.predict(&extracted.gait_features).await;
        self.timings.exit(TimedStage::Prediction);

        Ok(AnalysisResult::merge(extracted, predicted?))
    }

    fn dispatch(&self, event: AnalysisEvent) {
        let run_id = self.run_id;
        let name = event.name();
        let mut moved = None;

        self.state_tx.send_if_modified(|snapshot| {
            if snapshot.run_id != Some(run_id) {
                warn!("Dropping {} from superseded run", name);
                return false;
            }
            match snapshot.reduce(event) {
                Ok(next) => {
                    if next.state != snapshot.state {
                        moved = Some((snapshot.state, next.state));
                    }
                    *snapshot = next;
                    true
                }
                Err(err) => {
                    warn!("Ignoring transition: {}", err);
                    false
                }
            }
        });

        if let Some((from, to)) = moved {
            self.announce(from, to);
        }
    }

    fn announce(&self, from: AnalysisState, to: AnalysisState) {
        info!("{} -> {}", from, to);
        // No subscribers is fine.
        let _ = self.transition_tx.send(StateTransition {
            run_id: self.run_id,
            from,
            to,
        });
    }
}

pub struct AnalysisOrchestratorBuilder {
    backend: Option<Arc<dyn AnalysisBackend>>,
    min_display: Duration,
}

impl AnalysisOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            min_display: Duration::from_secs(5),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    // Overrides the default five second pacing window.
    pub fn min_display(mut self, min_display: Duration) -> Self {
        self.min_display = min_display;
        self
    }

    pub fn build(self) -> Result<AnalysisOrchestrator, AppError> {
        let backend = self
            .backend
            .ok_or_else(|| AppError::InvalidConfig("Analysis backend not set".to_string()))?;
        Ok(AnalysisOrchestrator::new(backend, self.min_display))
    }
}

impl Default for AnalysisOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{
        ExtractionResponse, FeaturePayload, OrthoticPrescription, PredictedLoads,
        PredictionResponse,
    };
    use crate::error::PipelineStage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::{sleep, Instant};

    const FEATURES: &str = r#"{"mean_ankle_angle":12.50,"ankle_angle_range":30.1,"ankle_angle_std":4.2,"mean_knee_angle":20.0,"knee_angle_range":55.3,"knee_angle_std":6.1,"mean_step_height":0.081,"cadence":110.4,"stance_ratio":0.62}"#;
    const PACING: Duration = Duration::from_secs(5);

    /// Answers both stages after fixed delays, optionally failing one.
    struct ScriptedBackend {
        extract_delay: Duration,
        predict_delay: Duration,
        extract_status: Option<u16>,
        predict_status: Option<u16>,
        extract_calls: AtomicUsize,
        predict_calls: AtomicUsize,
        predicted_with: Mutex<Option<String>>,
    }

    impl ScriptedBackend {
        fn new(extract_delay: Duration) -> Self {
            Self {
                extract_delay,
                predict_delay: Duration::from_millis(300),
                extract_status: None,
                predict_status: None,
                extract_calls: AtomicUsize::new(0),
                predict_calls: AtomicUsize::new(0),
                predicted_with: Mutex::new(None),
            }
        }

        fn failing_extraction(mut self, status: u16) -> Self {
            self.extract_status = Some(status);
            self
        }

        fn failing_prediction(mut self, status: u16) -> Self {
            self.predict_status = Some(status);
            self
        }
    }

    #[async_trait]
    impl AnalysisBackend for ScriptedBackend {
        async fn extract(&self, video: VideoUpload) -> Result<ExtractionResponse, AppError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            sleep(self.extract_delay).await;
            if let Some(status) = self.extract_status {
                return Err(AppError::Status {
                    stage: PipelineStage::Extraction,
                    status,
                    reason: "Bad Gateway".to_string(),
                });
            }
            Ok(ExtractionResponse {
                gait_features: FeaturePayload::from_json(FEATURES)?,
                video_filename: video.filename,
                num_frames: 120,
            })
        }

        async fn predict(
            &self,
            features: &FeaturePayload,
        ) -> Result<PredictionResponse, AppError> {
            self.predict_calls.fetch_add(1, Ordering::SeqCst);
            *self.predicted_with.lock().unwrap() = Some(features.as_str().to_string());
            sleep(self.predict_delay).await;
            if let Some(status) = self.predict_status {
                return Err(AppError::Status {
                    stage: PipelineStage::Prediction,
                    status,
                    reason: "Internal Server Error".to_string(),
                });
            }
            Ok(PredictionResponse {
                predicted_loads: PredictedLoads {
                    forefoot: 0.8,
                    midfoot: 0.3,
                    rearfoot: 0.5,
                },
                orthotic_prescription: OrthoticPrescription {
                    rearfoot_medial_post_mm: 2.0,
                    rearfoot_lateral_post_mm: 0.5,
                    forefoot_lateral_wedge_mm: 1.0,
                    forefoot_medial_wedge_mm: 0.0,
                    arch_support_mm: 8.25,
                    heel_cushion_mm: 3.0,
                },
            })
        }

        fn name(&self) -> &'static str {
            "ScriptedBackend"
        }
    }

    fn video() -> VideoUpload {
        VideoUpload::new("a.mp4", "video/mp4", vec![0u8; 10 * 1024 * 1024])
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::builder()
            .backend(backend)
            .min_display(PACING)
            .build()
            .unwrap()
    }

    /// Every state the run enters, in order.
    async fn record_states(mut rx: broadcast::Receiver<StateTransition>) -> Vec<AnalysisState> {
        let mut states = Vec::new();
        while let Ok(transition) = rx.recv().await {
            states.push(transition.to);
            if transition.to.is_terminal() {
                break;
            }
        }
        states
    }

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(10),
            "expected ~{:?}, got {:?}",
            expected,
            actual
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_produces_merged_result() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(2)));
        let orchestrator = orchestrator(backend.clone());
        let recorder = tokio::spawn(record_states(orchestrator.transitions()));

        let handle = orchestrator.submit(video()).unwrap();
        handle.await.unwrap();

        assert_eq!(
            recorder.await.unwrap(),
            vec![
                AnalysisState::Uploading,
                AnalysisState::Extracting,
                AnalysisState::Predicting,
                AnalysisState::Completed,
            ]
        );

        let snapshot = orchestrator.snapshot();
        let result = snapshot.result.expect("completed run has a result");
        assert_eq!(result.gait_features.as_str(), FEATURES);
        assert_eq!(result.video_filename, "a.mp4");
        assert_eq!(result.num_frames, 120);
        assert_eq!(result.predicted_loads.forefoot, 0.8);
        assert!(snapshot.error_message.is_none());
        assert_eq!(
            backend.predicted_with.lock().unwrap().as_deref(),
            Some(FEATURES)
        );
        assert_eq!(backend.extract_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_extraction_is_held_until_pacing_elapses() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(2)));
        let orchestrator = orchestrator(backend.clone());
        let start = Instant::now();

        let handle = orchestrator.submit(video()).unwrap();
        assert_eq!(orchestrator.state(), AnalysisState::Uploading);

        // Extraction has answered, the window has not closed.
        sleep(Duration::from_secs(3)).await;
        assert_eq!(orchestrator.state(), AnalysisState::Uploading);
        assert!(orchestrator.snapshot().result.is_none());

        let mut rx = orchestrator.subscribe();
        rx.wait_for(|s| s.state == AnalysisState::Predicting)
            .await
            .unwrap();
        assert_near(start.elapsed(), PACING);

        handle.await.unwrap();
        assert_eq!(orchestrator.state(), AnalysisState::Completed);
        assert_eq!(backend.extract_calls.load(Ordering::SeqCst), 1);

        let timings = orchestrator.snapshot().timings;
        assert_near(timings.get(TimedStage::Pacing).unwrap(), PACING);
        assert_near(
            timings.get(TimedStage::Extraction).unwrap(),
            Duration::from_secs(2),
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_extraction_shows_extracting_until_it_answers() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(8)));
        let orchestrator = orchestrator(backend);
        let start = Instant::now();

        let handle = orchestrator.submit(video()).unwrap();
        let mut rx = orchestrator.subscribe();

        rx.wait_for(|s| s.state == AnalysisState::Extracting)
            .await
            .unwrap();
        assert_near(start.elapsed(), PACING);

        rx.wait_for(|s| s.state == AnalysisState::Predicting)
            .await
            .unwrap();
        assert_near(start.elapsed(), Duration::from_secs(8));

        handle.await.unwrap();
        assert_eq!(orchestrator.state(), AnalysisState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_while_busy_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(2)));
        let orchestrator = orchestrator(backend.clone());

        let handle = orchestrator.submit(video()).unwrap();
        let run_id = orchestrator.snapshot().run_id;

        let err = orchestrator.submit(video()).unwrap_err();
        assert!(matches!(err, AppError::Busy(AnalysisState::Uploading)));

        orchestrator
            .subscribe()
            .wait_for(|s| s.state == AnalysisState::Predicting)
            .await
            .unwrap();
        assert!(matches!(
            orchestrator.submit(video()),
            Err(AppError::Busy(AnalysisState::Predicting))
        ));

        handle.await.unwrap();
        assert_eq!(orchestrator.snapshot().run_id, run_id);
        assert_eq!(backend.extract_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_never_enters_predicting() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(1)).failing_extraction(502));
        let orchestrator = orchestrator(backend.clone());
        let recorder = tokio::spawn(record_states(orchestrator.transitions()));

        orchestrator.submit(video()).unwrap().await.unwrap();

        assert_eq!(
            recorder.await.unwrap(),
            vec![
                AnalysisState::Uploading,
                AnalysisState::Extracting,
                AnalysisState::Error,
            ]
        );
        let snapshot = orchestrator.snapshot();
        assert_eq!(
            snapshot.error_message.as_deref(),
            Some("Feature extraction failed: Bad Gateway")
        );
        assert!(snapshot.result.is_none());
        assert_eq!(backend.predict_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prediction_failure_after_predicting() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(1)).failing_prediction(500));
        let orchestrator = orchestrator(backend);
        let recorder = tokio::spawn(record_states(orchestrator.transitions()));

        orchestrator.submit(video()).unwrap().await.unwrap();

        assert_eq!(
            recorder.await.unwrap(),
            vec![
                AnalysisState::Uploading,
                AnalysisState::Extracting,
                AnalysisState::Predicting,
                AnalysisState::Error,
            ]
        );
        assert_eq!(
            orchestrator.snapshot().error_message.as_deref(),
            Some("Prediction failed: Internal Server Error")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubmit_after_error_restarts_from_scratch() {
        let failing = Arc::new(ScriptedBackend::new(Duration::from_secs(1)).failing_prediction(500));
        let orchestrator = orchestrator(failing.clone());
        orchestrator.submit(video()).unwrap().await.unwrap();
        assert_eq!(orchestrator.state(), AnalysisState::Error);

        let handle = orchestrator.submit(video()).unwrap();
        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.state, AnalysisState::Uploading);
        assert!(snapshot.error_message.is_none());

        handle.await.unwrap();
        assert_eq!(failing.extract_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_returns_finished_run_to_idle() {
        let backend = Arc::new(ScriptedBackend::new(Duration::from_secs(1)));
        let orchestrator = orchestrator(backend);
        let handle = orchestrator.submit(video()).unwrap();
        assert!(matches!(
            orchestrator.reset(),
            Err(AppError::Busy(AnalysisState::Uploading))
        ));

        handle.await.unwrap();
        assert_eq!(orchestrator.state(), AnalysisState::Completed);
        orchestrator.reset().unwrap();

        let snapshot = orchestrator.snapshot();
        assert_eq!(snapshot.state, AnalysisState::Idle);
        assert!(snapshot.result.is_none());
        orchestrator.reset().unwrap();
    }

    #[test]
    fn test_builder_requires_backend() {
        assert!(matches!(
            AnalysisOrchestrator::builder().build(),
            Err(AppError::InvalidConfig(_))
        ));
    }
}
