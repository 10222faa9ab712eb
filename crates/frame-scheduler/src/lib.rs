//! Frame Scheduler for the Analysis Pipeline
//!
//! Decides which arriving camera frames enter the pipeline: paces admission
//! to the target frame rate, keeps at most one frame in flight, and skips
//! frames after a slow pass.

mod controller;

pub use controller::{Admission, FrameRateConfig, FrameRateController};
