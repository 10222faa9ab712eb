//! Alert Escalation Controller

use dms::{DrowsinessLevel, FatigueAssessment};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::emergency::{emergency_message, EmergencyConfig, EmergencyContact};

/// Alert configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Master switch for audio/haptic alerts
    pub alerts_enabled: bool,
    pub sound_enabled: bool,
    pub haptic_enabled: bool,
    /// Minimum assessment confidence for an alert (default: 0.7)
    pub confidence_threshold: f64,
    /// Minimum time between alerts of equal or lower severity (ms)
    pub cooldown_ms: u64,
    /// Non-critical alerts clear themselves after this long (ms)
    pub auto_dismiss_ms: u64,
    /// Critical dwell before the emergency contact is notified (ms)
    pub escalation_delay_ms: u64,
    pub emergency: EmergencyConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            alerts_enabled: true,
            sound_enabled: true,
            haptic_enabled: true,
            confidence_threshold: 0.7,
            cooldown_ms: 5_000,
            auto_dismiss_ms: 30_000,
            escalation_delay_ms: 10_000,
            emergency: EmergencyConfig::default(),
        }
    }
}

impl AlertConfig {
    /// Replace out-of-range values with defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            warn!(
                "Invalid alert confidence threshold {}, using {}",
                self.confidence_threshold, defaults.confidence_threshold
            );
            self.confidence_threshold = defaults.confidence_threshold;
        }
        if self.auto_dismiss_ms == 0 {
            warn!("Auto-dismiss must be positive, using {}ms", defaults.auto_dismiss_ms);
            self.auto_dismiss_ms = defaults.auto_dismiss_ms;
        }
        if self.emergency.enabled && self.emergency.active_contact().is_none() {
            warn!("Emergency escalation enabled without a usable contact");
        }
        self
    }
}

/// Strength of the audio/haptic pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertIntensity {
    Moderate,
    Strong,
}

impl AlertIntensity {
    pub fn for_level(level: DrowsinessLevel) -> Option<Self> {
        match level {
            DrowsinessLevel::Normal => None,
            DrowsinessLevel::Warning => Some(AlertIntensity::Moderate),
            DrowsinessLevel::Critical => Some(AlertIntensity::Strong),
        }
    }
}

/// Command for the external alert sinks
#[derive(Debug, Clone, PartialEq)]
pub enum AlertCommand {
    Play {
        level: DrowsinessLevel,
        intensity: AlertIntensity,
        sound: bool,
        haptic: bool,
    },
    Stop,
    NotifyEmergency {
        contact: EmergencyContact,
        message: String,
    },
}

/// Alert currently being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub level: DrowsinessLevel,
    pub since_ms: u64,
}

/// Escalation state for one monitoring session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub active: Option<ActiveAlert>,
    /// Level of the last fired alert; Normal after acknowledgment
    pub last_alert_level: DrowsinessLevel,
    pub last_alert_ms: Option<u64>,
    /// When the level first reached Critical in the current episode
    pub critical_since_ms: Option<u64>,
    pub emergency_triggered: bool,
    pub alerts_fired: u64,
}

/// Turns the assessment stream into alert and emergency commands
#[derive(Debug, Clone)]
pub struct AlertController {
    config: AlertConfig,
    state: AlertState,
    /// Level and time of the last acknowledgment
    acknowledged: Option<(DrowsinessLevel, u64)>,
}

impl AlertController {
    pub fn new(config: AlertConfig) -> Self {
        let config = config.sanitized();
        info!(
            "Creating alert controller: threshold={} cooldown={}ms escalation={}ms",
            config.confidence_threshold, config.cooldown_ms, config.escalation_delay_ms
        );
        Self {
            config,
            state: AlertState::default(),
            acknowledged: None,
        }
    }

    /// Process one assessment and return the commands to dispatch
    pub fn evaluate(&mut self, assessment: &FatigueAssessment, now_ms: u64) -> Vec<AlertCommand> {
        let level = assessment.level;

        if level == DrowsinessLevel::Critical && self.state.critical_since_ms.is_none() {
            debug!("Critical episode started at {}", now_ms);
            self.state.critical_since_ms = Some(now_ms);
        }

        let mut commands = self.tick(now_ms);

        if self.should_fire(level, assessment.confidence, now_ms) {
            if let Some(intensity) = AlertIntensity::for_level(level) {
                if self.state.active.is_some() {
                    commands.push(AlertCommand::Stop);
                }
                commands.push(AlertCommand::Play {
                    level,
                    intensity,
                    sound: self.config.sound_enabled,
                    haptic: self.config.haptic_enabled,
                });
                self.state.active = Some(ActiveAlert {
                    level,
                    since_ms: now_ms,
                });
                self.state.last_alert_level = level;
                self.state.last_alert_ms = Some(now_ms);
                self.state.alerts_fired += 1;
                info!(
                    "Alert fired: {} (confidence {:.2}, score {:.2})",
                    level, assessment.confidence, assessment.fatigue_score
                );
            }
        }

        commands
    }

    /// Apply time-driven transitions: auto-dismissal and emergency escalation
    pub fn tick(&mut self, now_ms: u64) -> Vec<AlertCommand> {
        let mut commands = Vec::new();

        if let Some(active) = self.state.active {
            let expired = now_ms.saturating_sub(active.since_ms) >= self.config.auto_dismiss_ms;
            if active.level < DrowsinessLevel::Critical && expired {
                debug!("Auto-dismissing {} alert", active.level);
                self.state.active = None;
                commands.push(AlertCommand::Stop);
            }
        }

        if let Some(started) = self.state.critical_since_ms {
            let dwell = now_ms.saturating_sub(started);
            if !self.state.emergency_triggered && dwell >= self.config.escalation_delay_ms {
                if let Some(contact) = self.config.emergency.active_contact() {
                    warn!(
                        "Critical for {}ms, notifying emergency contact {}",
                        dwell, contact.name
                    );
                    commands.push(AlertCommand::NotifyEmergency {
                        contact: contact.clone(),
                        message: emergency_message(
                            &self.config.emergency.driver_name,
                            dwell,
                            now_ms,
                        ),
                    });
                    self.state.emergency_triggered = true;
                }
            }
        }

        commands
    }

    /// Driver confirmed alertness
    pub fn acknowledge(&mut self, current_level: DrowsinessLevel, now_ms: u64) -> Vec<AlertCommand> {
        let mut commands = Vec::new();
        if let Some(active) = self.state.active.take() {
            info!("Alert acknowledged: {}", active.level);
            commands.push(AlertCommand::Stop);
            self.acknowledged = Some((active.level, now_ms));
        }
        self.state.last_alert_level = DrowsinessLevel::Normal;
        if current_level < DrowsinessLevel::Critical {
            self.state.critical_since_ms = None;
        }
        commands
    }

    fn should_fire(&self, level: DrowsinessLevel, confidence: f64, now_ms: u64) -> bool {
        if !self.config.alerts_enabled || level == DrowsinessLevel::Normal {
            return false;
        }
        if confidence < self.config.confidence_threshold {
            debug!(
                "Alert suppressed: confidence {:.2} < threshold {}",
                confidence, self.config.confidence_threshold
            );
            return false;
        }

        let escalation = level > self.state.last_alert_level;
        if self.state.active.is_some() && !escalation {
            return false;
        }

        // An acknowledged level stays quiet for one cooldown
        if let Some((acked_level, at)) = self.acknowledged {
            if level <= acked_level && now_ms.saturating_sub(at) < self.config.cooldown_ms {
                debug!("Alert suppressed: acknowledged {}ms ago", now_ms - at);
                return false;
            }
        }

        if !escalation {
            if let Some(last) = self.state.last_alert_ms {
                if now_ms.saturating_sub(last) < self.config.cooldown_ms {
                    debug!("Alert suppressed: in cooldown period");
                    return false;
                }
            }
        }

        true
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Clear all escalation state
    pub fn reset(&mut self) {
        self.state = AlertState::default();
        self.acknowledged = None;
    }
}

impl Default for AlertController {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::{RecommendedAction, ScoreBreakdown};
    use proptest::prelude::*;

    fn assessment(level: DrowsinessLevel, confidence: f64) -> FatigueAssessment {
        let fatigue_score = match level {
            DrowsinessLevel::Normal => 0.2,
            DrowsinessLevel::Warning => 0.65,
            DrowsinessLevel::Critical => 0.9,
        };
        FatigueAssessment {
            level,
            fatigue_score,
            confidence,
            ear: 0.2,
            perclos: 0.5,
            blink_rate: 17.0,
            head_pose_score: 0.0,
            recommended_action: RecommendedAction::for_level(level, fatigue_score),
            time_in_state_ms: 0,
            timestamp_ms: 0,
            head_pose: Default::default(),
            sub_scores: ScoreBreakdown::default(),
            ear_statistics: Default::default(),
        }
    }

    fn with_contact() -> AlertConfig {
        AlertConfig {
            emergency: EmergencyConfig {
                enabled: true,
                contact: Some(EmergencyContact {
                    name: "Sam".to_string(),
                    phone: "+15550100".to_string(),
                }),
                driver_name: "Alex".to_string(),
            },
            ..Default::default()
        }
    }

    fn plays(commands: &[AlertCommand]) -> Vec<DrowsinessLevel> {
        commands
            .iter()
            .filter_map(|c| match c {
                AlertCommand::Play { level, .. } => Some(*level),
                _ => None,
            })
            .collect()
    }

    fn emergencies(commands: &[AlertCommand]) -> usize {
        commands
            .iter()
            .filter(|c| matches!(c, AlertCommand::NotifyEmergency { .. }))
            .count()
    }

    #[test]
    fn test_confidence_threshold() {
        let mut controller = AlertController::default();
        assert!(plays(&controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.69), 0)).is_empty());
        assert_eq!(
            plays(&controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.7), 67)),
            vec![DrowsinessLevel::Warning]
        );
    }

    #[test]
    fn test_normal_never_fires() {
        let mut controller = AlertController::default();
        assert!(controller.evaluate(&assessment(DrowsinessLevel::Normal, 1.0), 0).is_empty());
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let mut controller = AlertController::default();
        let first = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 0);
        let second = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 2_000);

        assert_eq!(plays(&first).len() + plays(&second).len(), 1);
        assert_eq!(controller.state().alerts_fired, 1);
    }

    #[test]
    fn test_cooldown_applies_after_auto_dismiss() {
        let config = AlertConfig {
            auto_dismiss_ms: 1_000,
            ..Default::default()
        };
        let mut controller = AlertController::new(config);
        controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 0);

        let commands = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 2_000);
        assert_eq!(commands, vec![AlertCommand::Stop]);

        let commands = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 5_000);
        assert_eq!(plays(&commands), vec![DrowsinessLevel::Warning]);
    }

    #[test]
    fn test_escalation_bypasses_cooldown() {
        let mut controller = AlertController::default();
        controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 0);

        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 1_000);
        assert_eq!(
            commands,
            vec![
                AlertCommand::Stop,
                AlertCommand::Play {
                    level: DrowsinessLevel::Critical,
                    intensity: AlertIntensity::Strong,
                    sound: true,
                    haptic: true,
                }
            ]
        );
        assert_eq!(
            controller.state().active.map(|a| a.level),
            Some(DrowsinessLevel::Critical)
        );
    }

    #[test]
    fn test_critical_is_not_auto_dismissed() {
        let mut controller = AlertController::default();
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        assert!(controller.tick(60_000).is_empty());
        assert!(controller.state().active.is_some());
    }

    #[test]
    fn test_emergency_fires_once_after_delay() {
        let mut controller = AlertController::new(with_contact());
        let mut fired_at = Vec::new();

        for t in (0..=30_000u64).step_by(67) {
            let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), t);
            if emergencies(&commands) > 0 {
                fired_at.push(t);
            }
        }

        assert_eq!(fired_at.len(), 1);
        assert!(fired_at[0] >= 10_000);
        assert!(fired_at[0] < 10_067);
        assert!(controller.state().emergency_triggered);
    }

    #[test]
    fn test_emergency_message_names_driver() {
        let mut controller = AlertController::new(with_contact());
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 10_000);

        let Some(AlertCommand::NotifyEmergency { contact, message }) = commands
            .iter()
            .find(|c| matches!(c, AlertCommand::NotifyEmergency { .. }))
        else {
            panic!("expected emergency notification");
        };
        assert_eq!(contact.name, "Sam");
        assert!(message.contains("Alex"));
        assert!(message.contains("1970-01-01T00:00:10.000Z"));
    }

    #[test]
    fn test_no_contact_no_emergency() {
        let mut controller = AlertController::default();
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 20_000);
        assert_eq!(emergencies(&commands), 0);
        assert!(!controller.state().emergency_triggered);
    }

    #[test]
    fn test_critical_timer_survives_non_critical_frames() {
        let mut controller = AlertController::new(with_contact());
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 4_000);
        assert_eq!(controller.state().critical_since_ms, Some(0));

        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 10_000);
        assert_eq!(emergencies(&commands), 1);
    }

    #[test]
    fn test_acknowledge_while_critical_keeps_timer() {
        let mut controller = AlertController::new(with_contact());
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);

        let commands = controller.acknowledge(DrowsinessLevel::Critical, 3_000);
        assert_eq!(commands, vec![AlertCommand::Stop]);
        assert!(controller.state().active.is_none());
        assert_eq!(controller.state().last_alert_level, DrowsinessLevel::Normal);
        assert_eq!(controller.state().critical_since_ms, Some(0));
    }

    #[test]
    fn test_acknowledge_below_critical_clears_timer() {
        let mut controller = AlertController::new(with_contact());
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        controller.acknowledge(DrowsinessLevel::Warning, 3_000);
        assert_eq!(controller.state().critical_since_ms, None);

        let commands = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 12_000);
        assert_eq!(emergencies(&commands), 0);
    }

    #[test]
    fn test_acknowledged_level_quiet_for_cooldown() {
        let mut controller = AlertController::default();
        controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 0);
        controller.acknowledge(DrowsinessLevel::Warning, 1_000);

        let quiet = controller.evaluate(&assessment(DrowsinessLevel::Warning, 0.9), 2_000);
        assert!(plays(&quiet).is_empty());

        let escalated = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 2_100);
        assert_eq!(plays(&escalated), vec![DrowsinessLevel::Critical]);
    }

    #[test]
    fn test_alerts_disabled() {
        let mut controller = AlertController::new(AlertConfig {
            alerts_enabled: false,
            ..with_contact()
        });
        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        assert!(plays(&commands).is_empty());

        // Emergency escalation has its own switch
        let commands = controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 10_000);
        assert_eq!(emergencies(&commands), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut controller = AlertController::new(with_contact());
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 0);
        controller.evaluate(&assessment(DrowsinessLevel::Critical, 0.9), 10_000);

        controller.reset();
        assert_eq!(controller.state(), &AlertState::default());
    }

    #[test]
    fn test_sanitized_config() {
        let config = AlertConfig {
            confidence_threshold: 1.5,
            auto_dismiss_ms: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.auto_dismiss_ms, 30_000);
    }

    fn level_strategy() -> impl Strategy<Value = DrowsinessLevel> {
        prop_oneof![
            Just(DrowsinessLevel::Normal),
            Just(DrowsinessLevel::Warning),
            Just(DrowsinessLevel::Critical),
        ]
    }

    proptest! {
        #[test]
        fn pt_at_most_one_emergency_and_one_play_per_frame(
            levels in proptest::collection::vec(level_strategy(), 1..400),
        ) {
            let mut controller = AlertController::new(with_contact());
            let mut total_emergencies = 0;
            for (i, level) in levels.iter().enumerate() {
                let commands = controller.evaluate(&assessment(*level, 0.9), i as u64 * 67);
                prop_assert!(plays(&commands).len() <= 1);
                total_emergencies += emergencies(&commands);
            }
            prop_assert!(total_emergencies <= 1);
        }
    }
}
