//! JSON-lines landmark replay.
//!
//! Each line is one captured frame:
//! `{"timestamp_ms": 1200, "landmarks": [[x, y, z], ...]}`, with `null`
//! landmarks for frames where no face was found. The replay records the
//! landmarks under the frame's sequence number and offers a pixel-less frame
//! to the session, as a live camera would.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camera_capture::{CameraError, CaptureHandle, VideoFrame};
use feature_engine::Landmark;
use inference_engine::{InferenceError, RecordedLandmarks};
use serde::Deserialize;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read replay: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid replay record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to record landmarks: {0}")]
    Record(#[from] InferenceError),
}

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayRecord {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub landmarks: Option<Vec<[f32; 3]>>,
}

impl ReplayRecord {
    pub fn landmarks(&self) -> Vec<Landmark> {
        self.landmarks
            .iter()
            .flatten()
            .map(|&[x, y, z]| Landmark { x, y, z })
            .collect()
    }
}

/// Parse one line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ReplayRecord>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Frame counts of a finished replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames: u64,
    /// Offered while the pipeline was busy
    pub dropped: u64,
}

/// Feeds a recording into a session
pub struct Replay {
    landmarks: Arc<RecordedLandmarks>,
    capture: CaptureHandle,
    realtime: bool,
}

impl Replay {
    pub fn new(landmarks: Arc<RecordedLandmarks>, capture: CaptureHandle, realtime: bool) -> Self {
        Self {
            landmarks,
            capture,
            realtime,
        }
    }

    /// Replay the file at `path` until it ends or the session stops listening
    pub async fn run(self, path: &Path) -> Result<ReplayStats, ReplayError> {
        info!("Replaying {}", path.display());
        let mut lines = BufReader::new(File::open(path).await?).lines();

        let started = Instant::now();
        let mut first_ms: Option<u64> = None;
        let mut stats = ReplayStats::default();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let record = match parse_line(&line) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(source) => {
                    return Err(ReplayError::Parse {
                        line: line_no,
                        source,
                    })
                }
            };

            if self.realtime {
                let first = *first_ms.get_or_insert(record.timestamp_ms);
                let offset = record.timestamp_ms.saturating_sub(first);
                tokio::time::sleep_until(started + Duration::from_millis(offset)).await;
            } else {
                tokio::task::yield_now().await;
            }

            let sequence = stats.frames as u32;
            let landmarks = record.landmarks();
            if !landmarks.is_empty() {
                self.landmarks.insert(sequence, landmarks)?;
            }

            match self.capture.offer(VideoFrame::empty(record.timestamp_ms, sequence)) {
                Ok(true) => {}
                Ok(false) => stats.dropped += 1,
                Err(CameraError::Closed) => {
                    debug!("Session stopped listening, ending replay");
                    break;
                }
            }
            stats.frames += 1;
        }

        info!(
            frames = stats.frames,
            dropped = stats.dropped,
            "Replay finished"
        );
        Ok(stats)
    }
}
