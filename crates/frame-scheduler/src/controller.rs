//! Frame-Rate & Load Controller

use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration for frame admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameRateConfig {
    /// Target admitted frames per second (default: 15.0)
    pub target_fps: f64,
    /// Number of admission intervals averaged for the fps estimate
    pub fps_window: usize,
    /// Pipeline pass duration that triggers skipping (ms)
    pub max_latency_ms: u64,
    /// Frames dropped after a slow pass
    pub skip_count: u32,
}

impl Default for FrameRateConfig {
    fn default() -> Self {
        Self {
            target_fps: 15.0,
            fps_window: 30,
            max_latency_ms: 100,
            skip_count: 2,
        }
    }
}

impl FrameRateConfig {
    /// Minimum time between admitted frames
    pub fn target_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }

    /// Replace out-of-range values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            warn!("Invalid target fps {}, using {}", self.target_fps, defaults.target_fps);
            self.target_fps = defaults.target_fps;
        }
        if self.fps_window == 0 {
            warn!("fps window must be positive, using {}", defaults.fps_window);
            self.fps_window = defaults.fps_window;
        }
        if self.max_latency_ms == 0 {
            warn!("Max latency must be positive, using {}ms", defaults.max_latency_ms);
            self.max_latency_ms = defaults.max_latency_ms;
        }
        self
    }
}

/// Decision for one arriving frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Less than one target interval since the last admitted frame
    TooSoon,
    /// A previous frame is still being processed
    Busy,
    /// Dropped by adaptive skipping after a slow pass
    Skipped,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::TooSoon => "too_soon",
            Admission::Busy => "busy",
            Admission::Skipped => "skipped",
        }
    }
}

/// Gates frame admission into the pipeline
#[derive(Debug, Clone)]
pub struct FrameRateController {
    config: FrameRateConfig,
    interval_ms: f64,
    last_admitted_ms: Option<u64>,
    intervals: RingBuffer<u64>,
    in_flight: bool,
    skip_remaining: u32,
}

impl FrameRateController {
    pub fn new(config: FrameRateConfig) -> Self {
        let config = config.sanitized();
        info!(
            "Frame controller: target {} fps, max latency {}ms, skip {}",
            config.target_fps, config.max_latency_ms, config.skip_count
        );
        Self {
            interval_ms: config.target_interval_ms(),
            intervals: RingBuffer::new(config.fps_window),
            last_admitted_ms: None,
            in_flight: false,
            skip_remaining: 0,
            config,
        }
    }

    /// Decide whether the frame arriving at `now_ms` enters the pipeline.
    ///
    /// An admitted frame must be finished with [`complete`](Self::complete)
    /// or [`abandon`](Self::abandon) before another is admitted.
    pub fn try_admit(&mut self, now_ms: u64) -> Admission {
        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            debug!("Skipping frame at {} ({} left)", now_ms, self.skip_remaining);
            return Admission::Skipped;
        }
        if self.in_flight {
            return Admission::Busy;
        }
        if let Some(last) = self.last_admitted_ms {
            let elapsed = now_ms.saturating_sub(last);
            if (elapsed as f64) < self.interval_ms {
                return Admission::TooSoon;
            }
            self.intervals.push(elapsed);
        }

        self.last_admitted_ms = Some(now_ms);
        self.in_flight = true;
        Admission::Admitted
    }

    /// Finish the in-flight frame after `processing_ms` of work
    pub fn complete(&mut self, processing_ms: u64) {
        self.in_flight = false;
        if processing_ms > self.config.max_latency_ms {
            warn!(
                "Pipeline pass took {}ms (> {}ms), skipping next {} frames",
                processing_ms, self.config.max_latency_ms, self.config.skip_count
            );
            self.skip_remaining = self.config.skip_count;
        }
    }

    /// Release the in-flight slot without a timing sample (cancelled frame)
    pub fn abandon(&mut self) {
        self.in_flight = false;
    }

    /// Frames per second over the recent admission intervals
    pub fn current_fps(&self) -> f64 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let total: u64 = self.intervals.iter().sum();
        if total == 0 {
            return 0.0;
        }
        self.intervals.len() as f64 * 1000.0 / total as f64
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn config(&self) -> &FrameRateConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_in_seven_admitted_at_10ms_arrivals() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        let mut admitted = 0;
        for i in 0..700u64 {
            if controller.try_admit(i * 10).is_admitted() {
                admitted += 1;
                controller.complete(5);
            }
        }
        assert_eq!(admitted, 100);
    }

    #[test]
    fn test_at_most_one_in_flight() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        assert_eq!(controller.try_admit(0), Admission::Admitted);
        assert_eq!(controller.try_admit(200), Admission::Busy);
        controller.complete(20);
        assert_eq!(controller.try_admit(210), Admission::Admitted);
    }

    #[test]
    fn test_slow_pass_skips_next_frames() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        assert!(controller.try_admit(0).is_admitted());
        controller.complete(150);

        assert_eq!(controller.try_admit(160), Admission::Skipped);
        assert_eq!(controller.try_admit(230), Admission::Skipped);
        assert_eq!(controller.try_admit(300), Admission::Admitted);
    }

    #[test]
    fn test_latency_at_budget_does_not_skip() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        controller.try_admit(0);
        controller.complete(100);
        assert_eq!(controller.try_admit(100), Admission::Admitted);
    }

    #[test]
    fn test_abandon_releases_slot() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        controller.try_admit(0);
        controller.abandon();
        assert!(!controller.is_in_flight());
        assert_eq!(controller.try_admit(100), Admission::Admitted);
    }

    #[test]
    fn test_current_fps() {
        let mut controller = FrameRateController::new(FrameRateConfig::default());
        assert_eq!(controller.current_fps(), 0.0);

        for i in 0..10u64 {
            controller.try_admit(i * 100);
            controller.complete(10);
        }
        assert!((controller.current_fps() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_sanitized_config() {
        let config = FrameRateConfig {
            target_fps: 0.0,
            fps_window: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config, FrameRateConfig::default());
    }

    proptest! {
        #[test]
        fn pt_admitted_frames_respect_interval(
            gaps in proptest::collection::vec(1u64..200, 1..300),
        ) {
            let mut controller = FrameRateController::new(FrameRateConfig::default());
            let interval = controller.config().target_interval_ms();
            let mut now = 0;
            let mut last: Option<u64> = None;
            for gap in gaps {
                now += gap;
                if controller.try_admit(now).is_admitted() {
                    if let Some(prev) = last {
                        prop_assert!((now - prev) as f64 >= interval);
                    }
                    last = Some(now);
                    controller.complete(gap % 150);
                }
            }
        }
    }
}
