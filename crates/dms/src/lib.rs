//! Driver Monitoring System (DMS)
//!
//! Real-time fatigue analysis over per-frame facial measurements:
//! - Sliding-window aggregation (PERCLOS, blink rate, dwell time)
//! - Composite fatigue scoring
//! - Drowsiness level state machine with de-escalation debounce

pub mod aggregator;
pub mod assessment;
pub mod config;
pub mod scoring;
pub mod state;

pub use aggregator::{FatigueSample, TemporalAggregator};
pub use assessment::{FatigueAssessment, FrameOutcome, FrameRecord};
pub use config::{Calibration, DmsConfig};
pub use scoring::{FatigueScorer, ScoreBreakdown};
pub use state::{DrowsinessLevel, LevelStateMachine, RecommendedAction};

use feature_engine::FeatureError;
use inference_engine::InferenceError;
use thiserror::Error;
use tracing::debug;

/// Reasons a single frame could not be assessed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("Feature extraction failed: {0}")]
    Extraction(#[from] FeatureError),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Frame record has a face but no features or classification")]
    Incomplete,
}

/// Frame-to-assessment pipeline for one monitoring session
#[derive(Debug, Clone)]
pub struct FatiguePipeline {
    config: DmsConfig,
    aggregator: TemporalAggregator,
    scorer: FatigueScorer,
    levels: LevelStateMachine,
    current: Option<FatigueAssessment>,
}

impl FatiguePipeline {
    /// Create a pipeline for a session starting at `session_start_ms`
    pub fn new(config: DmsConfig, session_start_ms: u64) -> Self {
        let config = config.sanitized();
        Self {
            aggregator: TemporalAggregator::new(&config, session_start_ms),
            scorer: FatigueScorer::new(),
            levels: LevelStateMachine::new(
                config.warning_threshold,
                config.critical_threshold,
                config.deescalation_frames,
            ),
            current: None,
            config,
        }
    }

    /// Fold one frame record into the session
    pub fn process(&mut self, record: &FrameRecord) -> FrameOutcome {
        if !record.face_detected {
            debug!("No face at {}", record.timestamp_ms);
            return FrameOutcome::NoFace;
        }
        if let Some(error) = &record.error {
            return FrameOutcome::Failed(error.clone());
        }
        let (Some(features), Some(classification)) = (&record.features, &record.classification)
        else {
            return FrameOutcome::Failed(FrameError::Incomplete);
        };

        let now = record.timestamp_ms;
        let ear = features.average_ear;

        // Level is filled in once scored so time-in-state includes this frame
        self.aggregator.push(FatigueSample {
            ear,
            level: self.levels.current(),
            timestamp_ms: now,
        });

        let perclos = self.aggregator.perclos();
        let blink_rate = self.aggregator.blink_rate(now);
        let sub_scores = self
            .scorer
            .score(ear, &features.pose, classification, blink_rate);
        let fatigue_score = sub_scores.composite();

        let level = self.levels.update(fatigue_score);
        self.aggregator.set_newest_level(level);

        let assessment = FatigueAssessment {
            level,
            fatigue_score,
            confidence: classification.max_probability(),
            ear,
            perclos,
            blink_rate,
            head_pose_score: sub_scores.head_pose,
            recommended_action: RecommendedAction::for_level(level, fatigue_score),
            time_in_state_ms: self.aggregator.time_in_state(level),
            timestamp_ms: now,
            head_pose: features.pose,
            sub_scores,
            ear_statistics: self.aggregator.ear_statistics(),
        };

        debug!(
            "Assessed frame at {}: level={} score={:.3} perclos={:.2}",
            now, level, fatigue_score, perclos
        );

        self.current = Some(assessment.clone());
        FrameOutcome::Assessed(assessment)
    }

    /// Latest assessment, if any frame has been scored
    pub fn current(&self) -> Option<&FatigueAssessment> {
        self.current.as_ref()
    }

    pub fn level(&self) -> DrowsinessLevel {
        self.levels.current()
    }

    pub fn aggregator(&self) -> &TemporalAggregator {
        &self.aggregator
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}
