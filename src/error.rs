//! Error types shared across the recorder.

use crate::config::ConfigError;
use crate::sensors::SensorType;
use std::path::PathBuf;
use thiserror::Error;

/// Failures building the sensor registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The primary motion sensor is absent; no session can ever start.
    #[error("mandatory sensor unavailable on this host: {0}")]
    MissingMandatorySensor(SensorType),
}

/// Failures reported by a sensor host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("sensor not available: {0}")]
    Unavailable(SensorType),

    #[error("failed to attach {sensor}: {reason}")]
    AttachFailed { sensor: SensorType, reason: String },
}

/// Reasons a single delivery is rejected by the dispatcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SampleError {
    #[error("{sensor} delivered {actual} values, expected at least {expected}")]
    Malformed {
        sensor: SensorType,
        expected: usize,
        actual: usize,
    },

    #[error("{sensor} delivered a non-finite value at index {index}")]
    NonFinite { sensor: SensorType, index: usize },

    #[error("{0} is not registered on this host")]
    Unregistered(SensorType),
}

/// Errors returned by the recorder control surface.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("a session is already recording")]
    AlreadyRecording,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors writing a session artifact.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session {0} has no high-frequency samples to write")]
    NoData(String),
}

impl PersistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
