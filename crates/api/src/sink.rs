//! Alert sink for headless runs

use alerting::{AlertIntensity, AlertSink, EmergencyContact, SinkError};
use dms::DrowsinessLevel;
use tracing::{info, warn};

/// Writes alert commands to the log instead of a speaker or phone
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn play_alert(
        &self,
        level: DrowsinessLevel,
        intensity: AlertIntensity,
        sound: bool,
        haptic: bool,
    ) -> Result<(), SinkError> {
        warn!(
            level = %level,
            intensity = ?intensity,
            sound,
            haptic,
            "Drowsiness alert"
        );
        Ok(())
    }

    fn stop_alert(&self) -> Result<(), SinkError> {
        info!("Alert stopped");
        Ok(())
    }

    fn notify_emergency(&self, contact: &EmergencyContact, message: &str) -> Result<(), SinkError> {
        warn!(contact = %contact.name, phone = %contact.phone, "{}", message);
        Ok(())
    }
}
