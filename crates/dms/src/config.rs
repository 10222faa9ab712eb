//! DMS configuration

use feature_engine::StatisticalFeatures;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lowest closed-eye threshold the calibration may produce
const MIN_ADAPTIVE_THRESHOLD: f64 = 0.15;
/// Highest closed-eye threshold the calibration may produce
const MAX_ADAPTIVE_THRESHOLD: f64 = 0.25;
/// Threshold shift per unit of sensitivity away from 0.5
const SENSITIVITY_SPAN: f64 = 0.05;

/// Per-driver open-eye EAR statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Mean open-eye EAR
    pub baseline: f64,
    /// Standard deviation of open-eye EAR
    pub std_dev: f64,
}

impl Calibration {
    /// Build a calibration from open-eye EAR samples
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let stats = StatisticalFeatures::compute(samples);
        if stats.count == 0 || !stats.mean.is_finite() {
            return None;
        }
        Some(Self {
            baseline: stats.mean,
            std_dev: stats.std_dev,
        })
    }

    /// `clamp(baseline - 2*std + (0.5 - sensitivity) * 0.05, 0.15, 0.25)`
    pub fn adaptive_threshold(&self, sensitivity: f64) -> f64 {
        (self.baseline - 2.0 * self.std_dev + (0.5 - sensitivity) * SENSITIVITY_SPAN)
            .clamp(MIN_ADAPTIVE_THRESHOLD, MAX_ADAPTIVE_THRESHOLD)
    }

    fn is_valid(&self) -> bool {
        self.baseline.is_finite() && self.std_dev.is_finite() && self.std_dev >= 0.0
    }
}

/// DMS configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Detection sensitivity in [0, 1]
    pub sensitivity: f64,

    /// EAR below which the eye counts as closed
    pub closed_eye_threshold: f64,

    /// Optional per-driver calibration
    pub calibration: Option<Calibration>,

    /// Number of samples kept in the history window
    pub history_capacity: usize,

    /// Nominal time between samples (milliseconds)
    pub sample_interval_ms: f64,

    /// Shortest closed run counted as a blink (milliseconds)
    pub blink_min_ms: u64,

    /// Longest closed run counted as a blink (milliseconds)
    pub blink_max_ms: u64,

    /// Blink rate reported during warm-up (per minute)
    pub blink_baseline_per_min: f64,

    /// Session time before measured blink rate is used (milliseconds)
    pub blink_warmup_ms: u64,

    /// Blink events older than this are pruned (milliseconds)
    pub blink_window_ms: u64,

    /// Score at or above which the level is Warning
    pub warning_threshold: f64,

    /// Score at or above which the level is Critical
    pub critical_threshold: f64,

    /// Consecutive lower-level frames required before de-escalating
    pub deescalation_frames: u32,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.5,
            closed_eye_threshold: 0.21,
            calibration: None,
            history_capacity: 60,
            sample_interval_ms: 1000.0 / 15.0,
            blink_min_ms: 100,
            blink_max_ms: 500,
            blink_baseline_per_min: 17.0,
            blink_warmup_ms: 10_000,
            blink_window_ms: 60_000,
            warning_threshold: 0.6,
            critical_threshold: 0.8,
            deescalation_frames: 3,
        }
    }
}

impl DmsConfig {
    /// Threshold used for PERCLOS and blink detection
    pub fn effective_closed_threshold(&self) -> f64 {
        match &self.calibration {
            Some(calibration) => calibration.adaptive_threshold(self.sensitivity),
            None => self.closed_eye_threshold,
        }
    }

    /// Replace out-of-range values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        if !(0.0..=1.0).contains(&self.sensitivity) {
            warn!("Invalid sensitivity {}, using {}", self.sensitivity, defaults.sensitivity);
            self.sensitivity = defaults.sensitivity;
        }
        if !(self.closed_eye_threshold > 0.0 && self.closed_eye_threshold < 0.5) {
            warn!(
                "Invalid closed-eye threshold {}, using {}",
                self.closed_eye_threshold, defaults.closed_eye_threshold
            );
            self.closed_eye_threshold = defaults.closed_eye_threshold;
        }
        if let Some(calibration) = self.calibration {
            if !calibration.is_valid() {
                warn!("Ignoring invalid calibration {:?}", calibration);
                self.calibration = None;
            }
        }
        if self.history_capacity == 0 {
            warn!("History capacity must be positive, using {}", defaults.history_capacity);
            self.history_capacity = defaults.history_capacity;
        }
        if !(self.sample_interval_ms.is_finite() && self.sample_interval_ms > 0.0) {
            warn!(
                "Invalid sample interval {}, using {:.1}",
                self.sample_interval_ms, defaults.sample_interval_ms
            );
            self.sample_interval_ms = defaults.sample_interval_ms;
        }
        if self.blink_min_ms >= self.blink_max_ms {
            warn!(
                "Invalid blink band {}..{}ms, using {}..{}ms",
                self.blink_min_ms, self.blink_max_ms, defaults.blink_min_ms, defaults.blink_max_ms
            );
            self.blink_min_ms = defaults.blink_min_ms;
            self.blink_max_ms = defaults.blink_max_ms;
        }
        if !(self.blink_baseline_per_min.is_finite() && self.blink_baseline_per_min >= 0.0) {
            self.blink_baseline_per_min = defaults.blink_baseline_per_min;
        }
        if self.blink_window_ms == 0 {
            self.blink_window_ms = defaults.blink_window_ms;
        }
        let thresholds_ok = self.warning_threshold > 0.0
            && self.warning_threshold < self.critical_threshold
            && self.critical_threshold <= 1.0;
        if !thresholds_ok {
            warn!(
                "Invalid level thresholds {}/{}, using {}/{}",
                self.warning_threshold,
                self.critical_threshold,
                defaults.warning_threshold,
                defaults.critical_threshold
            );
            self.warning_threshold = defaults.warning_threshold;
            self.critical_threshold = defaults.critical_threshold;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_threshold_without_calibration() {
        assert_eq!(DmsConfig::default().effective_closed_threshold(), 0.21);
    }

    #[test]
    fn test_adaptive_threshold() {
        let calibration = Calibration {
            baseline: 0.30,
            std_dev: 0.02,
        };
        // 0.30 - 0.04 + 0 = 0.26, clamped to 0.25
        assert!((calibration.adaptive_threshold(0.5) - 0.25).abs() < 1e-12);
        // 0.30 - 0.04 - 0.025 = 0.235
        assert!((calibration.adaptive_threshold(1.0) - 0.235).abs() < 1e-12);

        let narrow = Calibration {
            baseline: 0.18,
            std_dev: 0.02,
        };
        assert!((narrow.adaptive_threshold(0.5) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_calibration_from_samples() {
        let calibration = Calibration::from_samples(&[0.28, 0.32, 0.28, 0.32]).unwrap();
        assert!((calibration.baseline - 0.30).abs() < 1e-9);
        assert!((calibration.std_dev - 0.02).abs() < 1e-9);
        assert_eq!(Calibration::from_samples(&[]), None);
    }

    #[test]
    fn test_sanitized_falls_back_to_defaults() {
        let config = DmsConfig {
            sensitivity: 3.0,
            closed_eye_threshold: f64::NAN,
            history_capacity: 0,
            blink_min_ms: 600,
            warning_threshold: 0.9,
            calibration: Some(Calibration {
                baseline: f64::INFINITY,
                std_dev: 0.01,
            }),
            ..Default::default()
        }
        .sanitized();

        let defaults = DmsConfig::default();
        assert_eq!(config.sensitivity, defaults.sensitivity);
        assert_eq!(config.closed_eye_threshold, defaults.closed_eye_threshold);
        assert_eq!(config.history_capacity, defaults.history_capacity);
        assert_eq!(config.blink_min_ms, defaults.blink_min_ms);
        assert_eq!(config.warning_threshold, defaults.warning_threshold);
        assert_eq!(config.calibration, None);
    }

    #[test]
    fn test_valid_config_untouched() {
        let config = DmsConfig {
            sensitivity: 0.8,
            deescalation_frames: 1,
            ..Default::default()
        };
        assert_eq!(config.clone().sanitized(), config);
    }
}
