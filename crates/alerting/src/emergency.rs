//! Emergency contact notification

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Person to notify when a critical episode is not resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

/// Emergency escalation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub enabled: bool,
    pub contact: Option<EmergencyContact>,
    /// Name used in the notification text
    pub driver_name: String,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            contact: None,
            driver_name: "Driver".to_string(),
        }
    }
}

impl EmergencyConfig {
    /// Contact to notify, if escalation is enabled and a usable contact is set
    pub fn active_contact(&self) -> Option<&EmergencyContact> {
        self.contact
            .as_ref()
            .filter(|c| self.enabled && !c.phone.trim().is_empty())
    }
}

/// ISO-8601 UTC timestamp for a millisecond clock reading
pub fn iso_timestamp(timestamp_ms: u64) -> String {
    let instant: DateTime<Utc> = i64::try_from(timestamp_ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Text sent to the emergency contact
pub fn emergency_message(driver_name: &str, critical_for_ms: u64, timestamp_ms: u64) -> String {
    format!(
        "DROWSINESS EMERGENCY: {} has shown critical fatigue for {} seconds without responding \
         to alerts. Please contact them immediately. Time: {}",
        driver_name,
        critical_for_ms / 1000,
        iso_timestamp(timestamp_ms)
    )
}
