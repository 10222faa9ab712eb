//! Feature Engineering Engine
//!
//! Turns facial landmarks into the per-frame measurements the fatigue
//! pipeline works with:
//! - Eye Aspect Ratio (EAR) per eye
//! - Head pose (yaw, pitch, roll) from landmark geometry
//! - The 6-element classifier input vector
//! - Window statistics over EAR history

mod features;
mod landmarks;
mod statistics;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use features::{
    eye_aspect_ratio, ClassifierInput, FacialFeatures, FeatureExtractor, HeadPose,
    CLASSIFIER_INPUT_LEN, HEAD_DOWN_PITCH_DEGREES,
};
pub use landmarks::{Landmark, Point, FaceMesh, MIN_LANDMARKS};
pub use statistics::StatisticalFeatures;

use thiserror::Error;

/// Which eye a measurement refers to (subject's side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeSide {
    Left,
    Right,
}

impl std::fmt::Display for EyeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EyeSide::Left => write!(f, "left"),
            EyeSide::Right => write!(f, "right"),
        }
    }
}

/// Errors during feature extraction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("Too few landmarks: expected at least {required}, got {actual}")]
    InsufficientLandmarks { required: usize, actual: usize },

    #[error("Landmark index {index} outside supplied set of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Degenerate {0} eye: horizontal distance too small")]
    DegenerateEye(EyeSide),

    #[error("Non-finite landmark coordinate at index {0}")]
    NonFinite(usize),
}
