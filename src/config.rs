//! Configuration for the session recorder.

use crate::policy::{DEFAULT_MAX_DURATION, DEFAULT_TARGET_SAMPLES};
use crate::sensors::SensorType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the platform config and data directories.
const APP_DIR: &str = "synheart-session-recorder";

/// High-frequency sensors recorded unless configured otherwise.
pub const DEFAULT_RECORDED_SENSORS: [SensorType; 5] = [
    SensorType::Accelerometer,
    SensorType::Gyroscope,
    SensorType::MagneticField,
    SensorType::LinearAcceleration,
    SensorType::Gravity,
];

/// Largest accepted `target_samples`.
pub const MAX_TARGET_SAMPLES: usize = 1_000_000;

/// Largest accepted `feed_capacity`.
pub const MAX_FEED_CAPACITY: usize = 1_000_000;

/// Main configuration for the recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Samples the leading channel must collect before a session completes
    pub target_samples: usize,

    /// Upper bound on a session's duration
    #[serde(with = "duration_serde")]
    pub max_duration: Duration,

    /// Sampling period requested from the host for high-frequency sensors
    pub high_freq_sample_period_us: u64,

    /// Sampling period requested from the host for low-frequency sensors
    pub low_freq_sample_period_us: u64,

    /// Minimum spacing between accepted samples of one sensor
    pub debounce_ms: Option<u64>,

    /// High-frequency sensors to record; unregistered ones are skipped
    pub recorded_sensors: Vec<SensorType>,

    /// Append the session id as a trailing `timestamp` CSV column
    pub include_timestamp_column: bool,

    /// Publish every normalized sample to sample subscribers
    pub stream_samples: bool,

    /// Capacity of each per-sensor delivery queue
    pub feed_capacity: usize,

    /// How often the dispatcher checks the duration bound when idle
    pub deadline_check_interval_ms: u64,

    /// Directory that receives session artifacts
    pub export_path: PathBuf,

    /// Directory for audit counters and other state
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            target_samples: DEFAULT_TARGET_SAMPLES,
            max_duration: DEFAULT_MAX_DURATION,
            high_freq_sample_period_us: 25_000, // 40 Hz
            low_freq_sample_period_us: 1_000_000,
            debounce_ms: None,
            recorded_sensors: DEFAULT_RECORDED_SENSORS.to_vec(),
            include_timestamp_column: true,
            stream_samples: false,
            feed_capacity: 10_000,
            deadline_check_interval_ms: 250,
            export_path: data_dir.join("sessions"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Path of the persisted audit counters.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Reject values the recorder cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_samples == 0 {
            return Err(ConfigError::Invalid("target_samples must be positive".into()));
        }
        if self.target_samples > MAX_TARGET_SAMPLES {
            return Err(ConfigError::Invalid(format!(
                "target_samples must be at most {MAX_TARGET_SAMPLES}"
            )));
        }
        if self.max_duration.is_zero() {
            return Err(ConfigError::Invalid("max_duration must be positive".into()));
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::Invalid("feed_capacity must be positive".into()));
        }
        if self.feed_capacity > MAX_FEED_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "feed_capacity must be at most {MAX_FEED_CAPACITY}"
            )));
        }
        if self.deadline_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "deadline_check_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn high_freq_period(&self) -> Duration {
        Duration::from_micros(self.high_freq_sample_period_us)
    }

    pub fn low_freq_period(&self) -> Duration {
        Duration::from_micros(self.low_freq_sample_period_us)
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce_ms.map(Duration::from_millis)
    }

    pub fn deadline_check_interval(&self) -> Duration {
        Duration::from_millis(self.deadline_check_interval_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration, as whole seconds.
mod duration_serde {
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
