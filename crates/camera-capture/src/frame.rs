//! Video frame types

use std::sync::Arc;

/// Pixel format reported by the capture source.
///
/// The pipeline never decodes pixels itself; the format travels with the
/// buffer so the inference collaborator can preprocess it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgb24,
    Mjpeg,
    Yuyv,
    Nv12,
    /// No pixels attached (recorded-landmark replays)
    Empty,
}

/// Decoded video frame with an opaque pixel buffer
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Pixel data, shared so frames can be handed off without copying
    pub data: Arc<[u8]>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel format of `data`
    pub format: PixelFormat,
    /// Capture timestamp (milliseconds)
    pub timestamp_ms: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw pixel data
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ms: u64,
        sequence: u32,
    ) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            timestamp_ms,
            sequence,
        }
    }

    /// Frame carrying no pixels, identified only by timestamp and sequence
    pub fn empty(timestamp_ms: u64, sequence: u32) -> Self {
        Self::new(Vec::new(), 0, 0, PixelFormat::Empty, timestamp_ms, sequence)
    }

    /// Whether the frame has pixel data
    pub fn has_pixels(&self) -> bool {
        !self.data.is_empty()
    }
}
