//! Configuration for the screen session recorder.

use crate::core::watchdog::DEFAULT_INACTIVITY_MINUTES;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a recording run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum idle time between events of one session
    #[serde(with = "millis_serde")]
    pub debounce_gap: Duration,

    /// Idle minutes after which the run stops on its own
    pub inactivity_timeout_minutes: u64,

    /// Which input sources to watch
    pub sources: SourceConfig,

    /// Directory for the observation log and statistics
    pub data_path: PathBuf,

    /// Directory for captured screenshots
    pub screenshots_path: PathBuf,

    /// Observation store backend
    pub storage: StorageBackend,

    /// How often observers poll their input and timers
    #[serde(with = "millis_serde")]
    pub poll_interval: Duration,

    /// Longest a single durable write may take before the run is failed
    #[serde(with = "secs_serde")]
    pub write_timeout: Duration,

    /// Grace period for observers to finish open sessions on stop
    #[serde(with = "secs_serde")]
    pub drain_timeout: Duration,

    /// Interval between periodic log flushes
    #[serde(with = "secs_serde")]
    pub flush_interval: Duration,

    /// Consecutive capture failures that end the run
    pub capture_failure_threshold: u32,

    /// Per-observer hand-off queue depth
    pub channel_capacity: usize,

    /// How often to check that selected windows still exist
    #[serde(with = "secs_serde")]
    pub window_check_interval: Duration,

    /// Optional screenshot upload target
    pub upload: Option<UploadConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screen-session-recorder");

        Self {
            debounce_gap: Duration::from_secs(2),
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_MINUTES,
            sources: SourceConfig::default(),
            screenshots_path: data_dir.join("screenshots"),
            data_path: data_dir,
            storage: StorageBackend::Jsonl,
            poll_interval: Duration::from_millis(50),
            write_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(5),
            flush_interval: Duration::from_secs(5),
            capture_failure_threshold: 3,
            channel_capacity: 64,
            window_check_interval: Duration::from_secs(2),
            upload: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screen-session-recorder")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.screenshots_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_minutes.saturating_mul(60))
    }

    pub fn observation_log_path(&self) -> PathBuf {
        match self.storage {
            StorageBackend::Jsonl => self.data_path.join("observations.jsonl"),
            StorageBackend::Sqlite => self.data_path.join("observations.db"),
        }
    }

    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Reject values the recorder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.debounce_gap.is_zero() {
            return invalid("debounce gap must be greater than zero");
        }
        if self.inactivity_timeout_minutes == 0 {
            return invalid("inactivity timeout must be at least one minute");
        }
        if self.poll_interval.is_zero() {
            return invalid("poll interval must be greater than zero");
        }
        if self.write_timeout.is_zero() {
            return invalid("write timeout must be greater than zero");
        }
        if self.flush_interval.is_zero() {
            return invalid("flush interval must be greater than zero");
        }
        if self.capture_failure_threshold == 0 {
            return invalid("capture failure threshold must be at least 1");
        }
        if self.channel_capacity == 0 {
            return invalid("channel capacity must be at least 1");
        }
        if !self.sources.any_enabled() {
            return invalid("at least one input source must be enabled");
        }
        Ok(())
    }
}

/// Configuration for which input sources to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub keyboard: bool,
    pub mouse: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            keyboard: true,
            mouse: true,
        }
    }
}

impl SourceConfig {
    /// Parse source configuration from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let sources: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();

        Self {
            keyboard: sources.iter().any(|s| s == "keyboard" || s == "all"),
            mouse: sources
                .iter()
                .any(|s| s == "mouse" || s == "scroll" || s == "all"),
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.keyboard || self.mouse
    }
}

/// Where observations are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Jsonl,
    Sqlite,
}

/// Screenshot upload target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub endpoint: String,
    pub token: String,
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as whole seconds.
mod secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_parsing() {
        let config = SourceConfig::from_csv("keyboard,mouse");
        assert!(config.keyboard);
        assert!(config.mouse);

        let config = SourceConfig::from_csv("keyboard");
        assert!(config.keyboard);
        assert!(!config.mouse);

        let config = SourceConfig::from_csv(" Scroll ");
        assert!(!config.keyboard);
        assert!(config.mouse);

        let config = SourceConfig::from_csv("all");
        assert!(config.any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inactivity_timeout_minutes, 45);
        assert_eq!(config.inactivity_timeout(), Duration::from_secs(45 * 60));
        assert_eq!(config.capture_failure_threshold, 3);
        assert!(config.validate().is_ok());
        assert!(config
            .observation_log_path()
            .ends_with("observations.jsonl"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            debounce_gap: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            inactivity_timeout_minutes: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config {
            sources: SourceConfig::from_csv("none"),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_json_roundtrip_uses_units() {
        let config = Config {
            debounce_gap: Duration::from_millis(1500),
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["debounce_gap"], 1500);
        assert_eq!(json["write_timeout"], 10);

        // Missing fields fall back to defaults
        let partial: Config = serde_json::from_str(r#"{"debounce_gap": 750}"#).unwrap();
        assert_eq!(partial.debounce_gap, Duration::from_millis(750));
        assert_eq!(partial.inactivity_timeout_minutes, 45);
    }
}
