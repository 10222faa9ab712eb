//! Statistical Features Computation

use serde::{Deserialize, Serialize};

/// Statistical features for a signal window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalFeatures {
    /// Number of samples
    pub count: usize,
    /// Mean value
    pub mean: f64,
    /// Standard deviation (population)
    pub std_dev: f64,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Mean absolute change between consecutive samples
    pub rate_of_change: f64,
    /// Change between the last two samples
    pub last_delta: f64,
}

impl StatisticalFeatures {
    /// Compute statistical features from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        Self::from_values(values.iter().copied())
    }

    /// Compute statistical features in one pass over an iterator
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut total_change = 0.0;
        let mut last_delta = 0.0;
        let mut prev: Option<f64> = None;

        for v in values {
            count += 1;

            // Welford update
            let delta = v - mean;
            mean += delta / count as f64;
            m2 += delta * (v - mean);

            min = min.min(v);
            max = max.max(v);

            if let Some(p) = prev {
                last_delta = v - p;
                total_change += last_delta.abs();
            }
            prev = Some(v);
        }

        if count == 0 {
            return Self::default();
        }

        let rate_of_change = if count >= 2 {
            total_change / (count - 1) as f64
        } else {
            0.0
        };

        Self {
            count,
            mean,
            std_dev: (m2 / count as f64).sqrt(),
            min,
            max,
            rate_of_change,
            last_delta,
        }
    }
}
