//! Composite fatigue scoring

use feature_engine::HeadPose;
use inference_engine::ClassifierResult;
use serde::{Deserialize, Serialize};

/// EAR at or above which the EAR score is 0
pub const NORMAL_EAR: f64 = 0.30;
/// EAR at or below which the EAR score is 1
pub const CRITICAL_EAR: f64 = 0.15;
/// Blinks per minute considered normal
pub const NORMAL_BLINK_RANGE: (f64, f64) = (10.0, 25.0);

const EAR_WEIGHT: f64 = 0.35;
const BLINK_WEIGHT: f64 = 0.25;
const HEAD_POSE_WEIGHT: f64 = 0.20;
const MODEL_WEIGHT: f64 = 0.30;

const PITCH_EMPHASIS: f64 = 1.5;
const MICROSLEEP_EMPHASIS: f64 = 1.5;

/// The four normalized inputs to the composite score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub ear: f64,
    pub blink: f64,
    pub head_pose: f64,
    pub model: f64,
}

impl ScoreBreakdown {
    /// Weighted sum clamped to [0, 1]
    pub fn composite(&self) -> f64 {
        let sum = EAR_WEIGHT * self.ear
            + BLINK_WEIGHT * self.blink
            + HEAD_POSE_WEIGHT * self.head_pose
            + MODEL_WEIGHT * self.model;
        sum.clamp(0.0, 1.0)
    }
}

/// Stateless scorer; every sub-score lies in [0, 1]
#[derive(Debug, Clone, Copy, Default)]
pub struct FatigueScorer;

impl FatigueScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn ear_score(&self, ear: f64) -> f64 {
        ((NORMAL_EAR - ear) / (NORMAL_EAR - CRITICAL_EAR)).clamp(0.0, 1.0)
    }

    pub fn blink_score(&self, blinks_per_min: f64) -> f64 {
        let (low, high) = NORMAL_BLINK_RANGE;
        let deviation = if blinks_per_min < low {
            (low - blinks_per_min) / low
        } else if blinks_per_min > high {
            (blinks_per_min - high) / high
        } else {
            0.0
        };
        deviation.clamp(0.0, 1.0)
    }

    pub fn head_pose_score(&self, pose: &HeadPose) -> f64 {
        let yaw = pose.yaw.abs() / 90.0;
        let pitch = pose.pitch.abs() / 90.0;
        let roll = pose.roll.abs() / 90.0;
        ((yaw + PITCH_EMPHASIS * pitch + roll) / (2.0 + PITCH_EMPHASIS)).clamp(0.0, 1.0)
    }

    pub fn model_score(&self, result: &ClassifierResult) -> f64 {
        (result.p_drowsy + MICROSLEEP_EMPHASIS * result.p_microsleep).clamp(0.0, 1.0)
    }

    /// Score one frame
    pub fn score(
        &self,
        ear: f64,
        pose: &HeadPose,
        result: &ClassifierResult,
        blinks_per_min: f64,
    ) -> ScoreBreakdown {
        ScoreBreakdown {
            ear: self.ear_score(ear),
            blink: self.blink_score(blinks_per_min),
            head_pose: self.head_pose_score(pose),
            model: self.model_score(result),
        }
    }
}
