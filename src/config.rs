//! Configuration for moodwatch.

use crate::camera::CameraConfig;
use crate::core::emitter::EmitterConfig;
use crate::core::mood::ClassifierConfig;
use crate::core::observation::ObservationConfig;
use crate::core::range::RangePolicy;
use crate::core::stabilizer::StabilizerConfig;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stabilizer: StabilizerConfig,
    pub classifier: ClassifierConfig,
    pub emitter: EmitterConfig,
    pub observation: ObservationConfig,
    pub camera: CameraConfig,
    pub aggregation: AggregationConfig,
    pub server: ServerConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("moodwatch")
            .join("config.json")
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.stabilizer;
        if s.window == 0 {
            return Err(ConfigError::Invalid("stabilizer.window must be > 0".into()));
        }
        if s.min_hits == 0 || s.min_hits as usize > s.window {
            return Err(ConfigError::Invalid(format!(
                "stabilizer.min_hits must be in 1..={}",
                s.window
            )));
        }
        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(ConfigError::Invalid(
                "classifier.confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if !(self.camera.match_distance.is_finite() && self.camera.match_distance >= 0.0) {
            return Err(ConfigError::Invalid(
                "camera.match_distance must be a non-negative number".into(),
            ));
        }
        if self.aggregation.live_window < Duration::from_secs(60) {
            return Err(ConfigError::Invalid(
                "aggregation.live_window must be at least one minute".into(),
            ));
        }
        if self.aggregation.max_range_days <= 0 {
            return Err(ConfigError::Invalid(
                "aggregation.max_range_days must be > 0".into(),
            ));
        }
        self.aggregation.tz()?;
        Ok(())
    }
}

/// Local data directory for the database and persisted counters.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moodwatch")
}

/// Server-side bucketing and range rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Retention of the live minute view
    #[serde(with = "millis")]
    pub live_window: Duration,
    pub max_range_days: i64,
    /// Accepted `days` presets for range queries
    pub presets: Vec<u32>,
    /// IANA zone used to align hour buckets
    pub timezone: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let policy = RangePolicy::default();
        Self {
            live_window: Duration::from_secs(24 * 60 * 60),
            max_range_days: policy.max_days,
            presets: policy.presets,
            timezone: "UTC".to_string(),
        }
    }
}

impl AggregationConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone: {}", self.timezone)))
    }

    pub fn range_policy(&self) -> RangePolicy {
        RangePolicy {
            presets: self.presets.clone(),
            max_days: self.max_range_days,
        }
    }

    pub fn live_window_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.live_window).unwrap_or_else(|_| chrono::Duration::hours(24))
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: data_dir().join("moodwatch.db"),
        }
    }
}

/// Where the camera loop posts recognitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub base_url: String,
    #[serde(with = "millis")]
    pub timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
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
            ConfigError::Invalid(e) => write!(f, "Invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as integer milliseconds.
pub mod millis {
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
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
