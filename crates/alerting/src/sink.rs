//! Outbound alert sinks

use dms::DrowsinessLevel;
use thiserror::Error;

use crate::controller::{AlertCommand, AlertIntensity};
use crate::emergency::EmergencyContact;

/// Failure reported by an audio, haptic or telephony sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Alert playback failed: {0}")]
    Playback(String),

    #[error("Emergency dispatch failed: {0}")]
    Dispatch(String),
}

/// Fire-and-forget receiver of alert commands.
///
/// Implementations must return promptly; long-running work belongs on the
/// implementation's own task.
pub trait AlertSink: Send + Sync {
    fn play_alert(
        &self,
        level: DrowsinessLevel,
        intensity: AlertIntensity,
        sound: bool,
        haptic: bool,
    ) -> Result<(), SinkError>;

    fn stop_alert(&self) -> Result<(), SinkError>;

    fn notify_emergency(&self, contact: &EmergencyContact, message: &str) -> Result<(), SinkError>;
}

/// Route one command to the matching sink call
pub fn dispatch(sink: &dyn AlertSink, command: &AlertCommand) -> Result<(), SinkError> {
    match command {
        AlertCommand::Play {
            level,
            intensity,
            sound,
            haptic,
        } => sink.play_alert(*level, *intensity, *sound, *haptic),
        AlertCommand::Stop => sink.stop_alert(),
        AlertCommand::NotifyEmergency { contact, message } => {
            sink.notify_emergency(contact, message)
        }
    }
}
