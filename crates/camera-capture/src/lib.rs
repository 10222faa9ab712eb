//! Camera Capture Hand-off for Driver Monitoring
//!
//! The capture device itself lives outside this workspace. This crate defines
//! the frame type it delivers and the hand-off into the analysis pipeline:
//! a single-slot channel written with `try_send`, so frames that arrive while
//! the pipeline is busy are dropped instead of queued.

pub mod frame;

pub use frame::{PixelFormat, VideoFrame};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Camera error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CameraError {
    #[error("Frame consumer has shut down")]
    Closed,
}

/// Receiving end handed to the monitoring session
pub type FrameReceiver = mpsc::Receiver<VideoFrame>;

/// Producer side of the frame hand-off
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    sender: mpsc::Sender<VideoFrame>,
    offered: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl CaptureHandle {
    /// Create a hand-off holding at most one pending frame
    pub fn channel() -> (Self, FrameReceiver) {
        let (sender, receiver) = mpsc::channel(1);
        (
            Self {
                sender,
                offered: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver,
        )
    }

    /// Offer a frame without waiting.
    ///
    /// Returns `Ok(false)` when the slot is occupied and the frame was dropped.
    pub fn offer(&self, frame: VideoFrame) -> Result<bool, CameraError> {
        self.offered.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Pipeline busy, dropped frame {}", frame.sequence);
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Frame receiver dropped");
                Err(CameraError::Closed)
            }
        }
    }

    /// Frames offered so far
    pub fn offered(&self) -> u64 {
        self.offered.load(Ordering::Relaxed)
    }

    /// Frames dropped because the slot was occupied
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
