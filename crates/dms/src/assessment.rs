//! Per-frame records and fatigue assessments

use feature_engine::{FacialFeatures, HeadPose, StatisticalFeatures};
use inference_engine::ClassifierResult;
use serde::{Deserialize, Serialize};

use crate::scoring::ScoreBreakdown;
use crate::state::{DrowsinessLevel, RecommendedAction};
use crate::FrameError;

/// One pipeline tick.
///
/// `face_detected == false` means no features or classification are present,
/// which is a normal outcome rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub timestamp_ms: u64,
    pub features: Option<FacialFeatures>,
    pub classification: Option<ClassifierResult>,
    pub face_detected: bool,
    pub error: Option<FrameError>,
}

impl FrameRecord {
    pub fn analyzed(
        timestamp_ms: u64,
        features: FacialFeatures,
        classification: ClassifierResult,
    ) -> Self {
        Self {
            timestamp_ms,
            features: Some(features),
            classification: Some(classification),
            face_detected: true,
            error: None,
        }
    }

    pub fn no_face(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            features: None,
            classification: None,
            face_detected: false,
            error: None,
        }
    }

    pub fn failed(timestamp_ms: u64, error: FrameError) -> Self {
        Self {
            timestamp_ms,
            features: None,
            classification: None,
            face_detected: true,
            error: Some(error),
        }
    }
}

/// Current judgement of driver fatigue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueAssessment {
    pub level: DrowsinessLevel,
    /// Composite score in [0, 1]
    pub fatigue_score: f64,
    /// Probability of the classifier's most likely class
    pub confidence: f64,
    pub ear: f64,
    pub perclos: f64,
    pub blink_rate: f64,
    pub head_pose_score: f64,
    pub recommended_action: RecommendedAction,
    pub time_in_state_ms: u64,
    pub timestamp_ms: u64,
    pub head_pose: HeadPose,
    pub sub_scores: ScoreBreakdown,
    pub ear_statistics: StatisticalFeatures,
}

/// What the pipeline did with one frame record
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Assessed(FatigueAssessment),
    /// No face in view; nothing was scored and history is untouched
    NoFace,
    /// The frame was skipped; no state was altered
    Failed(FrameError),
}

impl FrameOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FrameOutcome::Assessed(_) => "assessed",
            FrameOutcome::NoFace => "no_face",
            FrameOutcome::Failed(_) => "failed",
        }
    }
}
