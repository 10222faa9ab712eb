//! Alerting System
//!
//! Converts the fatigue assessment stream into at most one active alert,
//! enforces cooldowns, and escalates unresolved critical episodes to an
//! emergency contact.

mod controller;
mod emergency;
mod sink;

pub use controller::{
    ActiveAlert, AlertCommand, AlertConfig, AlertController, AlertIntensity, AlertState,
};
pub use emergency::{emergency_message, iso_timestamp, EmergencyConfig, EmergencyContact};
pub use sink::{dispatch, AlertSink, SinkError};
