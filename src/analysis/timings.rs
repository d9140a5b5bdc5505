use indexmap::IndexMap;
use std::time::Duration;
use tokio::time::Instant;

/// Timed sections of a run, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimedStage {
    /// The pacing window that keeps the uploading state on screen.
    Pacing,
    /// Wall time of the extraction request.
    Extraction,
    /// Wall time of the prediction request.
    Prediction,
}

impl TimedStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimedStage::Pacing => "Pacing",
            TimedStage::Extraction => "Extraction",
            TimedStage::Prediction => "Prediction",
        }
    }
}

/// Tracks how long each stage of a run took
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    /// Total duration per stage
    durations: IndexMap<TimedStage, Duration>,
    /// Stages entered but not yet exited
    open: IndexMap<TimedStage, Instant>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entry into a stage
    pub fn enter(&mut self, stage: TimedStage) {
        self.open.insert(stage, Instant::now());
    }

    /// Record exit from a stage, measured from its entry
    pub fn exit(&mut self, stage: TimedStage) -> Duration {
        let duration = self
            .open
            .shift_remove(&stage)
            .map(|start| start.elapsed())
            .unwrap_or_default();
        self.record(stage, duration);
        duration
    }

    /// Accumulate an externally measured duration
    pub fn record(&mut self, stage: TimedStage, duration: Duration) {
        *self.durations.entry(stage).or_default() += duration;
    }

    pub fn get(&self, stage: TimedStage) -> Option<Duration> {
        self.durations.get(&stage).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimedStage, Duration)> + '_ {
        self.durations.iter().map(|(stage, duration)| (*stage, *duration))
    }

    pub fn total(&self) -> Duration {
        self.durations.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn reset(&mut self) {
        self.durations.clear();
        self.open.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_in_insertion_order() {
        let mut timings = StageTimings::new();
        timings.record(TimedStage::Extraction, Duration::from_millis(30));
        timings.record(TimedStage::Pacing, Duration::from_millis(50));
        timings.record(TimedStage::Extraction, Duration::from_millis(20));

        let stages: Vec<_> = timings.iter().map(|(stage, _)| stage).collect();
        assert_eq!(stages, vec![TimedStage::Extraction, TimedStage::Pacing]);
        assert_eq!(
            timings.get(TimedStage::Extraction),
            Some(Duration::from_millis(50))
        );
        assert_eq!(timings.total(), Duration::from_millis(100));
        assert_eq!(timings.get(TimedStage::Prediction), None);
    }

    #[test]
    fn test_exit_without_enter_records_zero() {
        let mut timings = StageTimings::new();
        assert_eq!(timings.exit(TimedStage::Prediction), Duration::ZERO);
        assert_eq!(timings.get(TimedStage::Prediction), Some(Duration::ZERO));

        timings.enter(TimedStage::Pacing);
        timings.exit(TimedStage::Pacing);
        assert!(timings.get(TimedStage::Pacing).is_some());

        timings.reset();
        assert!(timings.is_empty());
    }
}
