//! Drowsiness level tracking

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Drowsiness level, ordered by severity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DrowsinessLevel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl DrowsinessLevel {
    /// Level for an instantaneous score
    pub fn from_score(score: f64, warning_threshold: f64, critical_threshold: f64) -> Self {
        if score >= critical_threshold {
            DrowsinessLevel::Critical
        } else if score >= warning_threshold {
            DrowsinessLevel::Warning
        } else {
            DrowsinessLevel::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DrowsinessLevel::Normal => "normal",
            DrowsinessLevel::Warning => "warning",
            DrowsinessLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for DrowsinessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the driver should do now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    ContinueDriving,
    StayAlert,
    TakeBreak,
    PullOverImmediately,
}

impl RecommendedAction {
    /// Score at which a Warning recommends a break instead of attention
    pub const BREAK_SCORE: f64 = 0.7;

    pub fn for_level(level: DrowsinessLevel, score: f64) -> Self {
        match level {
            DrowsinessLevel::Normal => RecommendedAction::ContinueDriving,
            DrowsinessLevel::Warning if score >= Self::BREAK_SCORE => RecommendedAction::TakeBreak,
            DrowsinessLevel::Warning => RecommendedAction::StayAlert,
            DrowsinessLevel::Critical => RecommendedAction::PullOverImmediately,
        }
    }

    /// Text shown to the driver
    pub fn message(&self) -> &'static str {
        match self {
            RecommendedAction::ContinueDriving => "Continue driving safely",
            RecommendedAction::StayAlert => "Stay alert and focus on the road",
            RecommendedAction::TakeBreak => "Take a break soon",
            RecommendedAction::PullOverImmediately => "Pull over immediately",
        }
    }
}

/// Maps scores to levels.
///
/// Escalation is immediate. De-escalation waits for `debounce_frames`
/// consecutive frames below the current level.
#[derive(Debug, Clone)]
pub struct LevelStateMachine {
    warning_threshold: f64,
    critical_threshold: f64,
    debounce_frames: u32,
    current: DrowsinessLevel,
    lower_streak: u32,
}

impl LevelStateMachine {
    pub fn new(warning_threshold: f64, critical_threshold: f64, debounce_frames: u32) -> Self {
        Self {
            warning_threshold,
            critical_threshold,
            debounce_frames,
            current: DrowsinessLevel::Normal,
            lower_streak: 0,
        }
    }

    /// Feed one frame's score and return the resulting level
    pub fn update(&mut self, score: f64) -> DrowsinessLevel {
        let raw = DrowsinessLevel::from_score(score, self.warning_threshold, self.critical_threshold);

        if raw >= self.current {
            if raw > self.current {
                debug!("Level escalated {} -> {}", self.current, raw);
            }
            self.current = raw;
            self.lower_streak = 0;
        } else {
            self.lower_streak += 1;
            if self.lower_streak >= self.debounce_frames {
                debug!("Level de-escalated {} -> {}", self.current, raw);
                self.current = raw;
                self.lower_streak = 0;
            }
        }

        self.current
    }

    pub fn current(&self) -> DrowsinessLevel {
        self.current
    }
}
