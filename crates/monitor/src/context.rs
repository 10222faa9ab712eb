//! Per-session state and the snapshot published after each frame

use alerting::{AlertConfig, AlertController, AlertState};
use dms::{DmsConfig, FatigueAssessment, FatiguePipeline};
use frame_scheduler::{FrameRateConfig, FrameRateController};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything a monitoring session is configured with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub dms: DmsConfig,
    pub alerts: AlertConfig,
    pub frame_rate: FrameRateConfig,
    /// Abort a collaborator call after this long (ms)
    pub inference_timeout_ms: Option<u64>,
}

impl SessionConfig {
    /// Sanitize every section and tie the nominal sample interval to the frame rate
    pub fn sanitized(self) -> Self {
        let frame_rate = self.frame_rate.sanitized();
        let mut dms = self.dms;
        dms.sample_interval_ms = frame_rate.target_interval_ms();
        Self {
            dms: dms.sanitized(),
            alerts: self.alerts.sanitized(),
            frame_rate,
            inference_timeout_ms: self.inference_timeout_ms.filter(|&ms| ms > 0),
        }
    }
}

/// Frame counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_received: u64,
    pub frames_admitted: u64,
    pub frames_assessed: u64,
    pub frames_without_face: u64,
    pub frames_failed: u64,
}

impl SessionStats {
    pub fn frames_dropped(&self) -> u64 {
        self.frames_received - self.frames_admitted
    }
}

/// All mutable state of one session.
///
/// Replaced as a whole on reset so no part can outlive the others.
pub struct SessionContext {
    pub session_id: Uuid,
    /// Incremented on every reset; results tagged with an older value are stale
    pub generation: u64,
    pub started_ms: u64,
    pub pipeline: FatiguePipeline,
    pub alerts: AlertController,
    pub gate: FrameRateController,
    pub stats: SessionStats,
    pub last_inference_ms: u64,
    pub last_frame_error: Option<String>,
}

impl SessionContext {
    pub fn new(config: &SessionConfig, generation: u64, now_ms: u64) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            generation,
            started_ms: now_ms,
            pipeline: FatiguePipeline::new(config.dms.clone(), now_ms),
            alerts: AlertController::new(config.alerts.clone()),
            gate: FrameRateController::new(config.frame_rate.clone()),
            stats: SessionStats::default(),
            last_inference_ms: 0,
            last_frame_error: None,
        }
    }

    /// Start over with empty history, alert state and timers
    pub fn reset(&mut self, config: &SessionConfig, now_ms: u64) {
        *self = Self::new(config, self.generation + 1, now_ms);
    }

    pub fn snapshot(&self, now_ms: u64) -> StateSnapshot {
        StateSnapshot {
            session_id: self.session_id,
            generation: self.generation,
            assessment: self.pipeline.current().cloned(),
            alert: self.alerts.state().clone(),
            observed_fps: self.gate.current_fps(),
            inference_ms: self.last_inference_ms,
            stats: self.stats,
            last_frame_error: self.last_frame_error.clone(),
            timestamp_ms: now_ms,
        }
    }
}

/// State published to the presentation layer once per processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub session_id: Uuid,
    pub generation: u64,
    pub assessment: Option<FatigueAssessment>,
    pub alert: AlertState,
    pub observed_fps: f64,
    pub inference_ms: u64,
    pub stats: SessionStats,
    pub last_frame_error: Option<String>,
    pub timestamp_ms: u64,
}
