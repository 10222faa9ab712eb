//! Inference Engine Implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use camera_capture::VideoFrame;
use feature_engine::{ClassifierInput, Landmark};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::InferenceError;

/// Tolerance on the probability sum
const PROBABILITY_TOLERANCE: f64 = 0.01;

/// Class probabilities from the drowsiness classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierResult {
    pub p_alert: f64,
    pub p_drowsy: f64,
    pub p_microsleep: f64,
}

impl ClassifierResult {
    /// Validate a probability triple
    pub fn new(p_alert: f64, p_drowsy: f64, p_microsleep: f64) -> Result<Self, InferenceError> {
        let probs = [p_alert, p_drowsy, p_microsleep];
        if probs.iter().any(|p| !p.is_finite() || *p < -PROBABILITY_TOLERANCE) {
            return Err(InferenceError::InvalidOutput(format!(
                "probabilities out of range: {:?}",
                probs
            )));
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(InferenceError::InvalidOutput(format!(
                "probabilities sum to {:.4}",
                sum
            )));
        }
        Ok(Self {
            p_alert,
            p_drowsy,
            p_microsleep,
        })
    }

    /// Probability of the most likely class
    pub fn max_probability(&self) -> f64 {
        self.p_alert.max(self.p_drowsy).max(self.p_microsleep)
    }
}

/// Detects face landmarks in a frame.
///
/// Returns an empty set when no face is visible, otherwise at least 468 points.
pub trait LandmarkDetector: Send + Sync {
    /// Prepare the model; failure is fatal to starting a session
    fn initialize(&self) -> Result<(), InferenceError> {
        Ok(())
    }

    fn detect_landmarks(&self, frame: &VideoFrame) -> Result<Vec<Landmark>, InferenceError>;
}

/// Classifies a feature vector into alert / drowsy / microsleep
pub trait DrowsinessClassifier: Send + Sync {
    /// Prepare the model; failure is fatal to starting a session
    fn initialize(&self) -> Result<(), InferenceError> {
        Ok(())
    }

    fn classify(&self, input: &ClassifierInput) -> Result<ClassifierResult, InferenceError>;
}

/// Output of one collaborator call
#[derive(Debug, Clone)]
pub struct InferenceOutput<T> {
    pub output: T,
    /// Wall time spent in the call in milliseconds
    pub latency_ms: u64,
}

/// Runs the collaborators on the blocking pool
#[derive(Clone)]
pub struct InferenceEngine {
    detector: Arc<dyn LandmarkDetector>,
    classifier: Arc<dyn DrowsinessClassifier>,
    timeout: Option<Duration>,
    loaded: Arc<AtomicBool>,
}

impl InferenceEngine {
    /// Create a new inference engine
    pub fn new(
        detector: Arc<dyn LandmarkDetector>,
        classifier: Arc<dyn DrowsinessClassifier>,
    ) -> Self {
        Self {
            detector,
            classifier,
            timeout: None,
            loaded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Abort calls that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Initialize both collaborators
    pub fn initialize(&self) -> Result<(), InferenceError> {
        self.detector.initialize()?;
        self.classifier.initialize()?;
        self.loaded.store(true, Ordering::Release);
        info!("Inference collaborators initialized");
        Ok(())
    }

    /// Check if engine is loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Detect landmarks; an empty result means no face
    pub async fn detect(
        &self,
        frame: VideoFrame,
    ) -> Result<InferenceOutput<Vec<Landmark>>, InferenceError> {
        let detector = Arc::clone(&self.detector);
        self.run_blocking(move || detector.detect_landmarks(&frame)).await
    }

    /// Classify one feature vector
    pub async fn classify(
        &self,
        input: ClassifierInput,
    ) -> Result<InferenceOutput<ClassifierResult>, InferenceError> {
        let classifier = Arc::clone(&self.classifier);
        self.run_blocking(move || classifier.classify(&input)).await
    }

    async fn run_blocking<T, F>(&self, call: F) -> Result<InferenceOutput<T>, InferenceError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, InferenceError> + Send + 'static,
    {
        if !self.is_loaded() {
            return Err(InferenceError::ModelNotLoaded);
        }

        let start = Instant::now();
        let task = tokio::task::spawn_blocking(call);

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Inference call exceeded {}ms", limit.as_millis());
                    return Err(InferenceError::Timeout(limit.as_millis() as u64));
                }
            },
            None => task.await,
        };

        let output = joined.map_err(|e| InferenceError::InferenceFailed(e.to_string()))??;
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!("Inference completed in {}ms", latency_ms);

        Ok(InferenceOutput { output, latency_ms })
    }
}
