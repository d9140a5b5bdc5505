use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::timings::StageTimings;
use super::types::AnalysisResult;

/// Where a run currently is. Exactly one state is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Uploading,
    Extracting,
    Predicting,
    Completed,
    Error,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "idle",
            AnalysisState::Uploading => "uploading",
            AnalysisState::Extracting => "extracting",
            AnalysisState::Predicting => "predicting",
            AnalysisState::Completed => "completed",
            AnalysisState::Error => "error",
        }
    }

    /// A run is in flight and new submissions are refused.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AnalysisState::Uploading | AnalysisState::Extracting | AnalysisState::Predicting
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisState::Completed | AnalysisState::Error)
    }

    /// Whether the upload control is offered to the user.
    pub fn upload_enabled(&self) -> bool {
        matches!(self, AnalysisState::Idle | AnalysisState::Error)
    }

    pub fn loading_message(&self) -> &'static str {
        match self {
            AnalysisState::Uploading => "Uploading video...",
            AnalysisState::Extracting => "Analyzing gait patterns...",
            AnalysisState::Predicting => "Generating orthotic prescription...",
            _ => "",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "Awaiting video upload",
            AnalysisState::Uploading => "Uploading video...",
            AnalysisState::Extracting => "Extracting gait features...",
            AnalysisState::Predicting => "Generating prescription...",
            AnalysisState::Completed => "Analysis complete",
            AnalysisState::Error => "Analysis failed",
        }
    }

    pub fn detail(&self) -> Option<&'static str> {
        match self {
            AnalysisState::Uploading => Some("Transferring video to server"),
            AnalysisState::Extracting => Some("Analyzing biomechanical data"),
            AnalysisState::Predicting => Some("Computing orthotic specifications"),
            _ => None,
        }
    }

    /// Progress bar fill in [0, 1].
    pub fn progress(&self) -> f32 {
        match self {
            AnalysisState::Idle | AnalysisState::Error => 0.0,
            AnalysisState::Uploading => 0.25,
            AnalysisState::Extracting => 0.5,
            AnalysisState::Predicting => 0.75,
            AnalysisState::Completed => 1.0,
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    Submitted {
        run_id: Uuid,
        filename: String,
        at: DateTime<Utc>,
    },
    PacingElapsed,
    ExtractionSucceeded,
    PredictionSucceeded(Arc<AnalysisResult>),
    Failed(String),
    /// Clears a finished run.
    Reset,
    /// Records stage timings without changing state.
    Timed(StageTimings),
}

impl AnalysisEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisEvent::Submitted { .. } => "Submitted",
            AnalysisEvent::PacingElapsed => "PacingElapsed",
            AnalysisEvent::ExtractionSucceeded => "ExtractionSucceeded",
            AnalysisEvent::PredictionSucceeded(_) => "PredictionSucceeded",
            AnalysisEvent::Failed(_) => "Failed",
            AnalysisEvent::Reset => "Reset",
            AnalysisEvent::Timed(_) => "Timed",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("event {event} is not valid in state {state}")]
pub struct TransitionError {
    pub state: AnalysisState,
    pub event: &'static str,
}

/// Everything the view layer needs to draw the current run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisSnapshot {
    pub state: AnalysisState,
    pub loading_message: String,
    pub result: Option<Arc<AnalysisResult>>,
    pub error_message: Option<String>,
    pub run_id: Option<Uuid>,
    pub filename: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub timings: StageTimings,
}

impl AnalysisSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Pure transition function: the snapshot after `event`, or an error if
    /// the event is not accepted in the current state.
    pub fn reduce(&self, event: AnalysisEvent) -> Result<AnalysisSnapshot, TransitionError> {
        let rejected = TransitionError {
            state: self.state,
            event: event.name(),
        };

        let next = match (self.state, event) {
            (state, AnalysisEvent::Submitted { run_id, filename, at }) if !state.is_busy() => {
                AnalysisSnapshot {
                    run_id: Some(run_id),
                    filename: Some(filename),
                    submitted_at: Some(at),
                    ..AnalysisSnapshot::idle()
                }
                .entering(AnalysisState::Uploading)
            }
            (AnalysisState::Uploading, AnalysisEvent::PacingElapsed) => {
                self.clone().entering(AnalysisState::Extracting)
            }
            (AnalysisState::Extracting, AnalysisEvent::ExtractionSucceeded) => {
                self.clone().entering(AnalysisState::Predicting)
            }
            (AnalysisState::Predicting, AnalysisEvent::PredictionSucceeded(result)) => {
                let mut next = self.clone().entering(AnalysisState::Completed);
                next.result = Some(result);
                next
            }
            (state, AnalysisEvent::Failed(message)) if state.is_busy() => {
                let mut next = self.clone().entering(AnalysisState::Error);
                next.result = None;
                next.error_message = Some(message);
                next
            }
            (state, AnalysisEvent::Reset) if !state.is_busy() => AnalysisSnapshot::idle(),
            (_, AnalysisEvent::Timed(timings)) => {
                let mut next = self.clone();
                next.timings = timings;
                next
            }
            _ => return Err(rejected),
        };

        Ok(next)
    }

    fn entering(mut self, state: AnalysisState) -> Self {
        self.state = state;
        self.loading_message = state.loading_message().to_string();
        self
    }
}
