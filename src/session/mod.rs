//! Recording sessions.
//!
//! A [`Session`] owns every buffer for one recording window. When the
//! window completes, [`Session::freeze`] moves the buffers out by value into
//! a [`FrozenSession`] that can be written without touching live state.

pub mod channel;
pub mod normalize;
pub mod state;

pub use channel::{Channel, LowFreqReading};
pub use normalize::{round6, validate, Debouncer, DECIMAL_PLACES};
pub use state::{FinishReason, SessionId, SessionState};

use crate::sensors::types::SensorType;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Upper bound on the per-channel buffer reserved up front.
pub const MAX_PREALLOCATED_SAMPLES: usize = 4_096;

/// Live state of one recording window.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    state: SessionState,
    /// High-frequency channels in registration order
    channels: Vec<Channel>,
    index: HashMap<&'static str, usize>,
    low_freq: Vec<LowFreqReading>,
    sensors: Vec<SensorType>,
    satisfied: HashSet<SensorType>,
    leading_keys: Vec<&'static str>,
    debouncer: Debouncer,
    started_at: Instant,
    started_wall: DateTime<Utc>,
}

impl Session {
    /// Allocate fresh buffers for the given sensors.
    ///
    /// `high_freq` and `low_freq` must already be filtered down to sensors
    /// registered on the host, in registration order.
    pub fn new(
        id: SessionId,
        high_freq: &[SensorType],
        low_freq: &[SensorType],
        leading: Option<SensorType>,
        capacity: usize,
        debouncer: Debouncer,
        now: Instant,
    ) -> Self {
        let capacity = capacity.min(MAX_PREALLOCATED_SAMPLES);
        let mut channels = Vec::new();
        let mut index = HashMap::new();
        for &sensor in high_freq {
            for &key in sensor.channel_keys() {
                index.insert(key, channels.len());
                channels.push(Channel::new(key, sensor.role(), sensor, capacity));
            }
        }

        Self {
            id,
            state: SessionState::Recording,
            channels,
            index,
            low_freq: low_freq.iter().map(|&s| LowFreqReading::new(s)).collect(),
            sensors: high_freq.iter().chain(low_freq).copied().collect(),
            satisfied: HashSet::new(),
            leading_keys: leading.map(|s| s.leading_key()).into_iter().collect(),
            debouncer,
            started_at: now,
            started_wall: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_wall(&self) -> DateTime<Utc> {
        self.started_wall
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Sensors feeding this session, high-frequency first.
    pub fn sensors(&self) -> &[SensorType] {
        &self.sensors
    }

    pub fn records(&self, sensor: SensorType) -> bool {
        self.sensors.contains(&sensor)
    }

    pub fn leading_keys(&self) -> &[&'static str] {
        &self.leading_keys
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, key: &str) -> Option<&Channel> {
        self.index.get(key).map(|&i| &self.channels[i])
    }

    /// Number of samples in a channel, zero for unknown keys.
    pub fn channel_len(&self, key: &str) -> usize {
        self.channel(key).map(Channel::len).unwrap_or(0)
    }

    pub fn low_freq(&self) -> &[LowFreqReading] {
        &self.low_freq
    }

    /// Current fill level of every high-frequency channel.
    pub fn fill_levels(&self) -> Vec<(&'static str, usize)> {
        self.channels.iter().map(|c| (c.key, c.len())).collect()
    }

    pub fn is_satisfied(&self, sensor: SensorType) -> bool {
        self.satisfied.contains(&sensor)
    }

    pub(crate) fn mark_satisfied(&mut self, sensor: SensorType) {
        self.satisfied.insert(sensor);
    }

    pub(crate) fn debouncer_mut(&mut self) -> &mut Debouncer {
        &mut self.debouncer
    }

    /// Append to a channel, returning its new length. Unknown keys are ignored.
    pub(crate) fn append(&mut self, key: &str, value: f64) -> Option<usize> {
        let i = *self.index.get(key)?;
        Some(self.channels[i].append(value))
    }

    pub(crate) fn set_low_freq(&mut self, sensor: SensorType, value: f64) -> bool {
        match self.low_freq.iter_mut().find(|r| r.source == sensor) {
            Some(reading) => {
                reading.value = Some(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn begin_stopping(&mut self) {
        self.state = SessionState::Stopping;
    }

    /// Move the buffers out into an immutable snapshot.
    pub fn freeze(mut self, reason: FinishReason) -> FrozenSession {
        self.state = SessionState::Finished;
        FrozenSession {
            id: self.id,
            state: self.state,
            started_at: self.started_wall,
            finished_at: Utc::now(),
            reason,
            leading_keys: self.leading_keys,
            channels: self.channels,
            low_freq: self.low_freq,
        }
    }
}

/// Immutable snapshot of a finished session, owned by the persistence side.
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenSession {
    pub id: SessionId,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reason: FinishReason,
    pub leading_keys: Vec<&'static str>,
    /// High-frequency channels in registration order
    pub channels: Vec<Channel>,
    pub low_freq: Vec<LowFreqReading>,
}

impl FrozenSession {
    /// Channels that received at least one sample, in registration order.
    pub fn present_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(|c| !c.is_empty())
    }

    /// Length of the shortest present channel; the number of aligned rows.
    pub fn row_count(&self) -> usize {
        self.present_channels().map(Channel::len).min().unwrap_or(0)
    }

    pub fn channel(&self, key: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(high_freq: &[SensorType]) -> Session {
        Session::new(
            SessionId::new("test"),
            high_freq,
            &[SensorType::Light],
            Some(SensorType::Accelerometer),
            16,
            Debouncer::default(),
            Instant::now(),
        )
    }

    #[test]
    fn test_new_session_allocates_empty_channels() {
        let s = session(&[SensorType::Accelerometer, SensorType::Gyroscope]);
        assert_eq!(s.state(), SessionState::Recording);
        assert_eq!(s.channels().len(), 8);
        assert!(s.channels().iter().all(|c| c.is_empty()));
        assert_eq!(s.leading_keys(), &["raw_acc_x"]);
        assert!(s.records(SensorType::Light));
        assert!(!s.records(SensorType::Gravity));
    }

    #[test]
    fn test_huge_capacity_is_not_reserved_up_front() {
        let mut s = Session::new(
            SessionId::new("big"),
            &[SensorType::Accelerometer],
            &[],
            Some(SensorType::Accelerometer),
            usize::MAX / 4,
            Debouncer::default(),
            Instant::now(),
        );
        assert_eq!(s.append("raw_acc_x", 1.0), Some(1));
        assert_eq!(s.channel_len("raw_acc_x"), 1);
    }

    #[test]
    fn test_append_and_low_freq_overwrite() {
        let mut s = session(&[SensorType::Accelerometer]);
        assert_eq!(s.append("raw_acc_x", 1.0), Some(1));
        assert_eq!(s.append("raw_acc_x", 2.0), Some(2));
        assert_eq!(s.append("processed_gyro_x", 1.0), None);
        assert_eq!(s.channel_len("raw_acc_x"), 2);
        assert_eq!(s.channel_len("nope"), 0);

        assert!(s.set_low_freq(SensorType::Light, 100.0));
        assert!(s.set_low_freq(SensorType::Light, 120.0));
        assert!(!s.set_low_freq(SensorType::Pressure, 1.0));
        assert_eq!(s.low_freq()[0].value, Some(120.0));
    }

    #[test]
    fn test_freeze_moves_buffers() {
        let mut s = session(&[SensorType::Accelerometer, SensorType::Gravity]);
        for i in 0..5 {
            s.append("raw_acc_x", i as f64);
            s.append("raw_acc_y", i as f64);
        }
        s.append("processed_gravity_x", 9.8);

        let frozen = s.freeze(FinishReason::MaxDurationElapsed);
        assert_eq!(frozen.state, SessionState::Finished);
        assert_eq!(frozen.present_channels().count(), 3);
        assert_eq!(frozen.row_count(), 1);
        assert_eq!(frozen.channel("raw_acc_x").unwrap().len(), 5);
    }
}
