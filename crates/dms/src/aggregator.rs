//! Sliding-window statistics over recent frames

use std::collections::VecDeque;

use feature_engine::StatisticalFeatures;
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::DmsConfig;
use crate::state::DrowsinessLevel;

/// One analyzed frame as kept in the history window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueSample {
    pub ear: f64,
    pub level: DrowsinessLevel,
    pub timestamp_ms: u64,
}

/// Counts completed blinks from the EAR stream
#[derive(Debug, Clone)]
struct BlinkDetector {
    min_ms: u64,
    max_ms: u64,
    window_ms: u64,
    closed_since: Option<u64>,
    events: VecDeque<u64>,
}

impl BlinkDetector {
    fn new(config: &DmsConfig) -> Self {
        Self {
            min_ms: config.blink_min_ms,
            max_ms: config.blink_max_ms,
            window_ms: config.blink_window_ms,
            closed_since: None,
            events: VecDeque::new(),
        }
    }

    fn observe(&mut self, closed: bool, timestamp_ms: u64) {
        match (closed, self.closed_since) {
            (true, None) => self.closed_since = Some(timestamp_ms),
            (false, Some(start)) => {
                let duration = timestamp_ms.saturating_sub(start);
                if (self.min_ms..=self.max_ms).contains(&duration) {
                    trace!("Blink of {}ms at {}", duration, timestamp_ms);
                    self.events.push_back(timestamp_ms);
                }
                self.closed_since = None;
            }
            _ => {}
        }
        self.prune(timestamp_ms);
    }

    fn prune(&mut self, now_ms: u64) {
        while let Some(&oldest) = self.events.front() {
            if now_ms.saturating_sub(oldest) > self.window_ms {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_since(&self, cutoff_ms: u64) -> usize {
        self.events.iter().filter(|&&t| t >= cutoff_ms).count()
    }
}

/// Maintains the history window and derives PERCLOS, blink rate and dwell time
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    history: RingBuffer<FatigueSample>,
    closed_threshold: f64,
    sample_interval_ms: f64,
    session_start_ms: u64,
    blink_baseline_per_min: f64,
    blink_warmup_ms: u64,
    blinks: BlinkDetector,
}

impl TemporalAggregator {
    pub fn new(config: &DmsConfig, session_start_ms: u64) -> Self {
        Self {
            history: RingBuffer::new(config.history_capacity),
            closed_threshold: config.effective_closed_threshold(),
            sample_interval_ms: config.sample_interval_ms,
            session_start_ms,
            blink_baseline_per_min: config.blink_baseline_per_min,
            blink_warmup_ms: config.blink_warmup_ms,
            blinks: BlinkDetector::new(config),
        }
    }

    /// Add a sample, evicting the oldest when the window is full
    pub fn push(&mut self, sample: FatigueSample) {
        self.blinks
            .observe(sample.ear < self.closed_threshold, sample.timestamp_ms);
        self.history.push(sample);
    }

    /// Overwrite the level of the newest sample once it is known
    pub fn set_newest_level(&mut self, level: DrowsinessLevel) {
        if let Some(newest) = self.history.newest_mut() {
            newest.level = level;
        }
    }

    /// Fraction of samples with EAR strictly below the closed-eye threshold
    pub fn perclos(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let closed = self
            .history
            .iter()
            .filter(|s| s.ear < self.closed_threshold)
            .count();
        closed as f64 / self.history.len() as f64
    }

    /// Completed blinks per minute.
    ///
    /// Before the warm-up period has elapsed the configured baseline is
    /// returned instead of a measurement.
    pub fn blink_rate(&self, now_ms: u64) -> f64 {
        let elapsed = now_ms.saturating_sub(self.session_start_ms);
        if elapsed < self.blink_warmup_ms {
            return self.blink_baseline_per_min;
        }
        let span = elapsed.min(self.blinks.window_ms);
        let count = self.blinks.count_since(now_ms.saturating_sub(span));
        count as f64 * 60_000.0 / span as f64
    }

    /// Time spent in `level`, counted over the newest run of matching samples
    pub fn time_in_state(&self, level: DrowsinessLevel) -> u64 {
        let run = self
            .history
            .iter_newest_first()
            .take_while(|s| s.level == level)
            .count();
        (run as f64 * self.sample_interval_ms).round() as u64
    }

    /// Mean, spread and rate of change of EAR over the window
    pub fn ear_statistics(&self) -> StatisticalFeatures {
        StatisticalFeatures::from_values(self.history.iter().map(|s| s.ear))
    }

    pub fn closed_threshold(&self) -> f64 {
        self.closed_threshold
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.history.capacity()
    }
}
