//! Inference Collaborator Contracts
//!
//! The landmark detector and the drowsiness classifier are supplied by the
//! platform. This crate fixes their contracts and runs them off the async
//! executor with latency measurement and an optional timeout.

mod engine;
mod mock;

pub use engine::{
    ClassifierResult, DrowsinessClassifier, InferenceEngine, InferenceOutput, LandmarkDetector,
};
pub use mock::{MockClassifier, RecordedLandmarks};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid classifier output: {0}")]
    InvalidOutput(String),
    #[error("Inference timeout after {0}ms")]
    Timeout(u64),
}

impl InferenceError {
    /// Whether retrying the same operation later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InferenceError::ModelUnavailable(_) | InferenceError::Timeout(_)
        )
    }
}
