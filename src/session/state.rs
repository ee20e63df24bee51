//! Session identity and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session in progress
    #[default]
    Idle,
    /// Samples are being collected
    Recording,
    /// Completion decided, producers being detached
    Stopping,
    /// Buffers frozen and handed off for persistence
    Finished,
}

impl SessionState {
    pub fn is_recording(self) -> bool {
        matches!(self, SessionState::Recording | SessionState::Stopping)
    }
}

/// Why a session finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FinishReason {
    /// The leading channel collected the target number of samples
    LeadingChannelFilled { key: String },
    /// The maximum session duration elapsed
    MaxDurationElapsed,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::LeadingChannelFilled { key } => write!(f, "leading channel {key} filled"),
            FinishReason::MaxDurationElapsed => write!(f, "maximum duration elapsed"),
        }
    }
}

/// Opaque session identifier, conventionally a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier derived from a wall-clock instant (milliseconds since epoch).
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis().to_string())
    }

    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
