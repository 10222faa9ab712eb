//! Rule-based and recorded collaborators for development and replay

use std::collections::HashMap;
use std::sync::Mutex;

use camera_capture::VideoFrame;
use feature_engine::{ClassifierInput, Landmark};
use tracing::{debug, info};

use crate::engine::{ClassifierResult, DrowsinessClassifier, LandmarkDetector};
use crate::InferenceError;

/// EAR at or above which the eyes read as fully open
const OPEN_EAR: f32 = 0.30;
/// EAR at or below which the eyes read as shut
const SHUT_EAR: f32 = 0.15;

/// Threshold classifier used when no trained model is configured.
///
/// Must be selected explicitly; it is never substituted for a failed model.
#[derive(Debug, Clone, Default)]
pub struct MockClassifier {
    unavailable: bool,
}

impl MockClassifier {
    pub fn new() -> Self {
        info!("Creating mock drowsiness classifier");
        Self { unavailable: false }
    }

    /// A classifier whose initialization always fails
    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }
}

impl DrowsinessClassifier for MockClassifier {
    fn initialize(&self) -> Result<(), InferenceError> {
        if self.unavailable {
            return Err(InferenceError::ModelUnavailable(
                "mock classifier configured as unavailable".to_string(),
            ));
        }
        debug!("Mock mode: skipping model load");
        Ok(())
    }

    fn classify(&self, input: &ClassifierInput) -> Result<ClassifierResult, InferenceError> {
        let [ear, _yaw, _pitch, _roll, closed, head_down] = input.0;

        // 0 with eyes open, 1 with eyes shut
        let closure = ((OPEN_EAR - ear) / (OPEN_EAR - SHUT_EAR)).clamp(0.0, 1.0) as f64;

        let (p_alert, p_drowsy, p_microsleep) = if closed > 0.5 && closure >= 0.99 {
            (0.05, 0.25, 0.70)
        } else if closed > 0.5 || head_down > 0.5 {
            let drowsy = (0.5 + 0.4 * closure).clamp(0.5, 0.9);
            let microsleep = 0.05;
            (1.0 - drowsy - microsleep, drowsy, microsleep)
        } else {
            let drowsy = 0.05 + 0.3 * closure;
            (0.97 - drowsy, drowsy, 0.03)
        };

        ClassifierResult::new(p_alert, p_drowsy, p_microsleep)
    }
}

/// Detector that replays landmark sets keyed by frame sequence number.
///
/// Frames with no recorded set report no face. Sequence numbers are expected
/// to increase; sets recorded for frames that were never analyzed are
/// discarded once a later frame is.
#[derive(Debug, Default)]
pub struct RecordedLandmarks {
    frames: Mutex<HashMap<u32, Vec<Landmark>>>,
}

impl RecordedLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the landmarks for the frame with `sequence`
    pub fn insert(&self, sequence: u32, landmarks: Vec<Landmark>) -> Result<(), InferenceError> {
        self.frames
            .lock()
            .map_err(|_| InferenceError::InferenceFailed("landmark store poisoned".to_string()))?
            .insert(sequence, landmarks);
        Ok(())
    }

    /// Number of recorded frames not yet consumed
    pub fn pending(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }
}

impl LandmarkDetector for RecordedLandmarks {
    fn detect_landmarks(&self, frame: &VideoFrame) -> Result<Vec<Landmark>, InferenceError> {
        let mut frames = self
            .frames
            .lock()
            .map_err(|_| InferenceError::InferenceFailed("landmark store poisoned".to_string()))?;
        let landmarks = frames.remove(&frame.sequence).unwrap_or_default();
        frames.retain(|&sequence, _| sequence > frame.sequence);
        Ok(landmarks)
    }
}
