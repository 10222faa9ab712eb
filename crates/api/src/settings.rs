//! Runtime settings.
//!
//! Layered as built-in defaults, then an optional TOML file (`DMS_CONFIG` or
//! `config/dms.toml`), then `DMS__`-prefixed environment variables such as
//! `DMS__SESSION__FRAME_RATE__TARGET_FPS=10`.

use std::net::SocketAddr;
use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, Map, Value};
use monitor::SessionConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Environment variable naming the settings file
pub const CONFIG_PATH_VAR: &str = "DMS_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/dms.toml";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Drowsiness classifier backing the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Rule-based thresholds, for development and replays
    #[default]
    Mock,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// JSON-lines landmark recording to feed the session
    pub path: Option<PathBuf>,
    /// Pace frames by their recorded timestamps
    pub realtime: bool,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            path: None,
            realtime: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub classifier: ClassifierKind,
    pub session: SessionConfig,
    pub replay: ReplaySettings,
}

impl Settings {
    /// Load from the settings file and environment
    pub fn load() -> Result<Self, SettingsError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_builder(Config::builder().add_source(File::with_name(&path).required(false)))
    }

    /// Invalid values fall back to their defaults with a warning.
    ///
    /// Only an unknown classifier is an error, since it must be chosen explicitly.
    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, SettingsError> {
        let config = builder
            .add_source(
                Environment::with_prefix("DMS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let classifier = match config.get::<ClassifierKind>("classifier") {
            Ok(kind) => kind,
            Err(ConfigError::NotFound(_)) => ClassifierKind::default(),
            Err(e) => return Err(e.into()),
        };
        let inference_timeout_ms = match config.get::<u64>("session.inference_timeout_ms") {
            Ok(ms) => Some(ms),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => {
                warn!("Ignoring invalid setting session.inference_timeout_ms: {}", e);
                None
            }
        };

        Ok(Self {
            server: section(&config, "server"),
            logging: section(&config, "logging"),
            classifier,
            session: SessionConfig {
                dms: section(&config, "session.dms"),
                alerts: section(&config, "session.alerts"),
                frame_rate: section(&config, "session.frame_rate"),
                inference_timeout_ms,
            },
            replay: section(&config, "replay"),
        })
    }
}

/// Deserialize the table at `key`, dropping fields that do not parse
fn section<T: DeserializeOwned + Default>(config: &Config, key: &str) -> T {
    let table = match config.get_table(key) {
        Ok(table) => table,
        Err(ConfigError::NotFound(_)) => return T::default(),
        Err(e) => {
            warn!("Invalid [{}] settings, using defaults: {}", key, e);
            return T::default();
        }
    };

    let valid: Map<String, Value> = table
        .into_iter()
        .filter(|(field, value)| {
            let mut single = Map::new();
            single.insert(field.clone(), value.clone());
            match Value::new(None, single).try_deserialize::<T>() {
                Ok(_) => true,
                Err(e) => {
                    warn!("Ignoring invalid setting {}.{}: {}", key, field, e);
                    false
                }
            }
        })
        .collect();

    Value::new(None, valid)
        .try_deserialize()
        .unwrap_or_else(|e| {
            warn!("Invalid [{}] settings, using defaults: {}", key, e);
            T::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        Settings::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.session.frame_rate.target_fps, 15.0);
        assert_eq!(settings.session.alerts.cooldown_ms, 5000);
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let settings = from_toml(
            r#"
            [server]
            addr = "127.0.0.1:9090"

            [session.dms]
            sensitivity = 0.8

            [session.dms.calibration]
            baseline = 0.31
            std_dev = 0.02

            [session.alerts.emergency]
            enabled = true
            contact = { name = "Sam", phone = "+15550100" }

            [replay]
            path = "drive.jsonl"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.addr.port(), 9090);
        assert_eq!(settings.session.dms.sensitivity, 0.8);
        assert_eq!(settings.session.dms.closed_eye_threshold, 0.21);
        assert!(settings.session.dms.calibration.is_some());
        assert!(settings.session.alerts.emergency.active_contact().is_some());
        assert_eq!(settings.session.alerts.emergency.driver_name, "Driver");
        assert_eq!(settings.replay.path, Some(PathBuf::from("drive.jsonl")));
        assert!(settings.replay.realtime);
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let settings = from_toml(
            r#"
            [server]
            addr = "not an address"

            [session]
            inference_timeout_ms = "soon"

            [session.dms]
            sensitivity = "high"
            critical_threshold = 0.85

            [session.frame_rate]
            target_fps = 10.0
            skip_count = "many"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server, ServerSettings::default());
        assert_eq!(settings.session.inference_timeout_ms, None);
        assert_eq!(settings.session.dms.sensitivity, 0.5);
        assert_eq!(settings.session.dms.critical_threshold, 0.85);
        assert_eq!(settings.session.frame_rate.target_fps, 10.0);
        assert_eq!(settings.session.frame_rate.skip_count, 2);
    }

    #[test]
    fn test_non_table_section_uses_defaults() {
        let settings = from_toml("logging = 7").unwrap();
        assert_eq!(settings.logging, LoggingSettings::default());
    }

    #[test]
    fn test_unknown_classifier_is_rejected() {
        let result = from_toml("classifier = \"onnx\"");
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }
}
