//! Applies raw sensor deliveries to a live session.
//!
//! One delivery from a high-frequency sensor fans out into one append per
//! axis plus one for its reference-time channel. A low-frequency delivery
//! overwrites the single stored reading.

use crate::error::SampleError;
use crate::policy::TerminationPolicy;
use crate::sensors::types::{SampleEvent, SensorType};
use crate::session::{round6, validate, Session};
use std::fmt;
use tracing::debug;

/// Interval, in samples, between fill-level debug reports.
const FILL_REPORT_INTERVAL: usize = 100;

/// A delivery that was accepted into the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// The delivery after normalization; values are rounded and trimmed to
    /// the sensor's payload length.
    pub normalized: SampleEvent,
    /// Length of the sensor's channels after the append (1 for low-frequency)
    pub fill: usize,
    /// The sensor has collected enough and should be detached
    pub satisfied: bool,
}

/// Why a delivery was not stored.
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// No session is recording
    NotRecording,
    /// Queued for a session that has since ended
    Stale,
    /// Payload failed validation
    Invalid(SampleError),
    /// Sensor is not part of the current session
    NotRecorded(SensorType),
    /// Sensor already collected enough samples this session
    Satisfied(SensorType),
    /// Arrived sooner than the configured debounce gap
    Debounced(SensorType),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotRecording => write!(f, "not recording"),
            DropReason::Stale => write!(f, "queued for an ended session"),
            DropReason::Invalid(e) => write!(f, "invalid payload: {e}"),
            DropReason::NotRecorded(s) => write!(f, "{s} is not recorded in this session"),
            DropReason::Satisfied(s) => write!(f, "{s} already has enough samples"),
            DropReason::Debounced(s) => write!(f, "{s} sample debounced"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingDispatcher {
    policy: TerminationPolicy,
}

impl SamplingDispatcher {
    pub fn new(policy: TerminationPolicy) -> Self {
        Self { policy }
    }

    /// Normalize one delivery and store it in `session`.
    pub fn apply(&self, session: &mut Session, event: &SampleEvent) -> Result<Applied, DropReason> {
        let sensor = event.sensor_type;

        validate(event).map_err(DropReason::Invalid)?;
        if !session.records(sensor) {
            return Err(DropReason::NotRecorded(sensor));
        }
        if session.is_satisfied(sensor) {
            return Err(DropReason::Satisfied(sensor));
        }
        if !session.debouncer_mut().accept(sensor, event.timestamp_ns) {
            return Err(DropReason::Debounced(sensor));
        }

        let values: Vec<f64> = event.values[..sensor.expected_values()]
            .iter()
            .map(|&v| round6(v))
            .collect();
        let normalized = SampleEvent::new(sensor, values, event.timestamp_ns);

        if !sensor.is_high_frequency() {
            session.set_low_freq(sensor, normalized.values[0]);
            // one reading per session is all a low-frequency sensor owes us
            session.mark_satisfied(sensor);
            return Ok(Applied {
                normalized,
                fill: 1,
                satisfied: true,
            });
        }

        let keys = sensor.channel_keys();
        let Some((timeref_key, value_keys)) = keys.split_last() else {
            return Err(DropReason::NotRecorded(sensor));
        };
        for (key, &value) in value_keys.iter().zip(&normalized.values) {
            session.append(key, value);
        }
        let fill = session
            .append(timeref_key, round6(event.reference_seconds()))
            .unwrap_or(0);

        if fill % FILL_REPORT_INTERVAL == 0 {
            debug!(
                session = %session.id(),
                sensor = %sensor,
                fill,
                "collected samples"
            );
        }

        let satisfied = self.policy.is_full(fill);
        if satisfied {
            session.mark_satisfied(sensor);
        }

        Ok(Applied {
            normalized,
            fill,
            satisfied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::select_leading;
    use crate::session::{Debouncer, SessionId};
    use std::time::{Duration, Instant};

    fn session(debounce: Option<Duration>) -> Session {
        let high_freq = [SensorType::Accelerometer, SensorType::MagneticFieldUncalibrated];
        Session::new(
            SessionId::new("dispatch"),
            &high_freq,
            &[SensorType::Pressure],
            select_leading(&high_freq),
            0,
            Debouncer::new(debounce),
            Instant::now(),
        )
    }

    fn dispatcher(target: usize) -> SamplingDispatcher {
        SamplingDispatcher::new(TerminationPolicy::new(target, Duration::from_secs(30)))
    }

    #[test]
    fn test_high_freq_fan_out() {
        let mut s = session(None);
        let event = SampleEvent::new(
            SensorType::Accelerometer,
            vec![0.12345678, -1.0, 9.80665449],
            2_000_000_000,
        );
        let applied = dispatcher(800).apply(&mut s, &event).unwrap();

        assert_eq!(applied.fill, 1);
        assert!(!applied.satisfied);
        assert_eq!(applied.normalized.values, vec![0.123457, -1.0, 9.806654]);
        assert_eq!(s.channel("raw_acc_x").unwrap().samples(), &[0.123457]);
        assert_eq!(s.channel("raw_acc_z").unwrap().samples(), &[9.806654]);
        assert_eq!(s.channel("raw_acc_timeref").unwrap().samples(), &[2.0]);
        assert_eq!(s.channel_len("raw_magnet_x"), 0);
    }

    #[test]
    fn test_six_axis_sensor_fills_bias_channels() {
        let mut s = session(None);
        let event = SampleEvent::new(
            SensorType::MagneticFieldUncalibrated,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            0,
        );
        dispatcher(800).apply(&mut s, &event).unwrap();
        assert_eq!(s.channel("raw_magnet_bias_z").unwrap().samples(), &[6.0]);
        assert_eq!(s.channel_len("raw_magnet_timeref"), 1);
    }

    #[test]
    fn test_satisfied_sensor_is_not_appended() {
        let mut s = session(None);
        let d = dispatcher(2);
        let event = SampleEvent::new(SensorType::Accelerometer, vec![0.0; 3], 0);

        assert!(!d.apply(&mut s, &event).unwrap().satisfied);
        assert!(d.apply(&mut s, &event).unwrap().satisfied);
        assert_eq!(
            d.apply(&mut s, &event),
            Err(DropReason::Satisfied(SensorType::Accelerometer))
        );
        assert_eq!(s.channel_len("raw_acc_x"), 2);
    }

    #[test]
    fn test_low_freq_overwrites_and_satisfies() {
        let mut s = session(None);
        let applied = dispatcher(800)
            .apply(
                &mut s,
                &SampleEvent::new(SensorType::Pressure, vec![1013.2500001], 0),
            )
            .unwrap();
        assert!(applied.satisfied);
        assert_eq!(s.low_freq()[0].value, Some(1013.25));
    }

    #[test]
    fn test_rejections_leave_session_untouched() {
        let mut s = session(Some(Duration::from_millis(100)));
        let d = dispatcher(800);

        let short = SampleEvent::new(SensorType::Accelerometer, vec![0.0], 0);
        assert!(matches!(d.apply(&mut s, &short), Err(DropReason::Invalid(_))));

        let gyro = SampleEvent::new(SensorType::Gyroscope, vec![0.0; 3], 0);
        assert_eq!(
            d.apply(&mut s, &gyro),
            Err(DropReason::NotRecorded(SensorType::Gyroscope))
        );

        let first = SampleEvent::new(SensorType::Accelerometer, vec![0.0; 3], 0);
        let too_soon = SampleEvent::new(SensorType::Accelerometer, vec![0.0; 3], 10_000_000);
        assert!(d.apply(&mut s, &first).is_ok());
        assert_eq!(
            d.apply(&mut s, &too_soon),
            Err(DropReason::Debounced(SensorType::Accelerometer))
        );
        assert_eq!(s.channel_len("raw_acc_x"), 1);
    }
}
