//! Session termination policy.
//!
//! Sensor samplers are neither aligned nor stable: the accelerometer may
//! reach 800 samples while the gyroscope only has 600. Completion is
//! therefore driven by a single leading channel, with a wall-clock bound
//! for when no trustworthy leader exists or it never fills.

use crate::sensors::types::SensorType;
use crate::session::{FinishReason, Session};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Leading-channel candidates, most reliable sampler first.
///
/// Gyroscopes are left out on purpose; they sample too slowly to lead.
pub const LEADING_PRIORITY: [SensorType; 5] = [
    SensorType::Accelerometer,
    SensorType::LinearAcceleration,
    SensorType::Gravity,
    SensorType::MagneticField,
    SensorType::MagneticFieldUncalibrated,
];

/// Default number of samples the leading channel must collect.
pub const DEFAULT_TARGET_SAMPLES: usize = 800;

/// Default upper bound on a session's duration.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

/// Pick the single leading sensor among those active in a session.
///
/// Returns `None` when no priority candidate is active; the session then
/// ends only through the duration bound.
pub fn select_leading(active: &[SensorType]) -> Option<SensorType> {
    let leading = LEADING_PRIORITY
        .into_iter()
        .find(|candidate| active.contains(candidate));

    match leading {
        Some(sensor) => debug!(
            sensor = %sensor,
            key = sensor.leading_key(),
            "marking leading sensor"
        ),
        None => warn!("no leading sensor among active channels, relying on max duration"),
    }
    leading
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    pub target_samples: usize,
    pub max_duration: Duration,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SAMPLES, DEFAULT_MAX_DURATION)
    }
}

impl TerminationPolicy {
    pub fn new(target_samples: usize, max_duration: Duration) -> Self {
        Self {
            target_samples,
            max_duration,
        }
    }

    /// Whether a channel of this length has collected enough samples.
    pub fn is_full(&self, len: usize) -> bool {
        len >= self.target_samples
    }

    /// Decide whether the session is complete. Evaluated after every sample
    /// and on every timer pulse.
    pub fn check(&self, session: &Session, now: Instant) -> Option<FinishReason> {
        if let Some(key) = session
            .leading_keys()
            .iter()
            .find(|key| self.is_full(session.channel_len(key)))
        {
            debug!(key, "leading channel collected enough samples");
            return Some(FinishReason::LeadingChannelFilled {
                key: key.to_string(),
            });
        }

        let elapsed = session.elapsed(now);
        if elapsed >= self.max_duration {
            debug!(elapsed_secs = elapsed.as_secs(), "session too long, finishing");
            return Some(FinishReason::MaxDurationElapsed);
        }
        None
    }
}
