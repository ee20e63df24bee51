//! Sensor identities, channel layouts and the transient sample event.
//!
//! Every high-frequency sensor fans out into one channel per axis plus a
//! reference-time channel. Low-frequency sensors contribute a single value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NANOSECONDS_IN_SECOND: f64 = 1e9;

/// Kind of sensor capability a host may expose.
///
/// The numeric codes follow the host sensor subsystem numbering so that
/// unknown codes can still be reported by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Accelerometer,
    MagneticFieldUncalibrated,
    GyroscopeUncalibrated,
    Gravity,
    LinearAcceleration,
    MagneticField,
    Gyroscope,
    AmbientTemperature,
    Light,
    Pressure,
    Proximity,
    RelativeHumidity,
}

/// Role a channel plays within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Sampled many times per session, straight from hardware
    RawHighFreq,
    /// Sampled many times per session, derived by the host (software sensors)
    ProcessedHighFreq,
    /// Yields a single reading per session
    LowFreq,
}

impl ChannelRole {
    pub fn is_high_frequency(self) -> bool {
        !matches!(self, ChannelRole::LowFreq)
    }
}

impl SensorType {
    /// All known sensor types, in registration order.
    pub const ALL: [SensorType; 12] = [
        SensorType::Accelerometer,
        SensorType::MagneticFieldUncalibrated,
        SensorType::GyroscopeUncalibrated,
        SensorType::Gravity,
        SensorType::LinearAcceleration,
        SensorType::MagneticField,
        SensorType::Gyroscope,
        SensorType::AmbientTemperature,
        SensorType::Light,
        SensorType::Pressure,
        SensorType::Proximity,
        SensorType::RelativeHumidity,
    ];

    /// Numeric code used by the host sensor subsystem.
    pub fn code(self) -> i32 {
        match self {
            SensorType::Accelerometer => 1,
            SensorType::MagneticField => 2,
            SensorType::Gyroscope => 4,
            SensorType::Light => 5,
            SensorType::Pressure => 6,
            SensorType::Proximity => 8,
            SensorType::Gravity => 9,
            SensorType::LinearAcceleration => 10,
            SensorType::RelativeHumidity => 12,
            SensorType::AmbientTemperature => 13,
            SensorType::MagneticFieldUncalibrated => 14,
            SensorType::GyroscopeUncalibrated => 16,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn role(self) -> ChannelRole {
        match self {
            SensorType::Accelerometer
            | SensorType::MagneticFieldUncalibrated
            | SensorType::GyroscopeUncalibrated => ChannelRole::RawHighFreq,
            SensorType::Gravity
            | SensorType::LinearAcceleration
            | SensorType::MagneticField
            | SensorType::Gyroscope => ChannelRole::ProcessedHighFreq,
            SensorType::AmbientTemperature
            | SensorType::Light
            | SensorType::Pressure
            | SensorType::Proximity
            | SensorType::RelativeHumidity => ChannelRole::LowFreq,
        }
    }

    pub fn is_high_frequency(self) -> bool {
        self.role().is_high_frequency()
    }

    /// Human readable name used in logs and listings.
    pub fn default_nice_name(self) -> &'static str {
        match self {
            SensorType::Accelerometer => "raw accelerometer",
            SensorType::MagneticFieldUncalibrated => "raw magnetometer",
            SensorType::GyroscopeUncalibrated => "raw gyroscope",
            SensorType::Gravity => "gravity",
            SensorType::LinearAcceleration => "linear acceleration",
            SensorType::MagneticField => "calibrated magnetometer",
            SensorType::Gyroscope => "calibrated gyroscope",
            SensorType::AmbientTemperature => "ambient temperature",
            SensorType::Light => "light",
            SensorType::Pressure => "pressure",
            SensorType::Proximity => "proximity",
            SensorType::RelativeHumidity => "relative humidity",
        }
    }

    /// Minimum number of values a payload from this sensor must carry.
    pub fn expected_values(self) -> usize {
        match self {
            SensorType::MagneticFieldUncalibrated | SensorType::GyroscopeUncalibrated => 6,
            SensorType::Accelerometer
            | SensorType::Gravity
            | SensorType::LinearAcceleration
            | SensorType::MagneticField
            | SensorType::Gyroscope => 3,
            _ => 1,
        }
    }

    /// Channel keys this sensor writes to, in column order.
    ///
    /// For high-frequency sensors the last key is the reference-time channel.
    pub fn channel_keys(self) -> &'static [&'static str] {
        match self {
            SensorType::Accelerometer => &["raw_acc_x", "raw_acc_y", "raw_acc_z", "raw_acc_timeref"],
            SensorType::MagneticFieldUncalibrated => &[
                "raw_magnet_x",
                "raw_magnet_y",
                "raw_magnet_z",
                "raw_magnet_bias_x",
                "raw_magnet_bias_y",
                "raw_magnet_bias_z",
                "raw_magnet_timeref",
            ],
            SensorType::GyroscopeUncalibrated => &[
                "raw_gyro_x",
                "raw_gyro_y",
                "raw_gyro_z",
                "raw_gyro_drift_x",
                "raw_gyro_drift_y",
                "raw_gyro_drift_z",
                "raw_gyro_timeref",
            ],
            SensorType::Gravity => &[
                "processed_gravity_x",
                "processed_gravity_y",
                "processed_gravity_z",
                "processed_gravity_timeref",
            ],
            SensorType::LinearAcceleration => &[
                "processed_user_acc_x",
                "processed_user_acc_y",
                "processed_user_acc_z",
                "processed_user_acc_timeref",
            ],
            SensorType::MagneticField => &[
                "processed_magnet_x",
                "processed_magnet_y",
                "processed_magnet_z",
                "processed_magnet_timeref",
            ],
            SensorType::Gyroscope => &[
                "processed_gyro_x",
                "processed_gyro_y",
                "processed_gyro_z",
                "processed_gyro_timeref",
            ],
            SensorType::AmbientTemperature => &["temperature_ambient"],
            SensorType::Light => &["light"],
            SensorType::Pressure => &["pressure"],
            SensorType::Proximity => &["proximity_cm"],
            SensorType::RelativeHumidity => &["relative_humidity"],
        }
    }

    /// The measurement key whose fill level represents this sensor.
    pub fn leading_key(self) -> &'static str {
        self.channel_keys()[0]
    }

    /// Parse a comma-separated list of sensor names, skipping unknown entries.
    pub fn parse_list(s: &str) -> Vec<SensorType> {
        s.split(',')
            .filter_map(|name| name.trim().parse().ok())
            .collect()
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_nice_name())
    }
}

impl FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let sensor = match normalized.as_str() {
            "accelerometer" | "acc" => SensorType::Accelerometer,
            "magnetic_field_uncalibrated" | "raw_magnetometer" => {
                SensorType::MagneticFieldUncalibrated
            }
            "gyroscope_uncalibrated" | "raw_gyroscope" => SensorType::GyroscopeUncalibrated,
            "gravity" => SensorType::Gravity,
            "linear_acceleration" => SensorType::LinearAcceleration,
            "magnetic_field" | "magnetometer" => SensorType::MagneticField,
            "gyroscope" | "gyro" => SensorType::Gyroscope,
            "ambient_temperature" | "temperature" => SensorType::AmbientTemperature,
            "light" => SensorType::Light,
            "pressure" => SensorType::Pressure,
            "proximity" => SensorType::Proximity,
            "relative_humidity" | "humidity" => SensorType::RelativeHumidity,
            other => {
                return match other.parse::<i32>().ok().and_then(SensorType::from_code) {
                    Some(sensor) => Ok(sensor),
                    None => Err(format!("unknown sensor: {s}")),
                }
            }
        };
        Ok(sensor)
    }
}

/// A single raw delivery from the host sensor subsystem.
///
/// Consumed once by the dispatcher and never retained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    pub sensor_type: SensorType,
    pub values: Vec<f64>,
    /// Host sensor clock, in nanoseconds since an arbitrary epoch
    pub timestamp_ns: u64,
}

impl SampleEvent {
    pub fn new(sensor_type: SensorType, values: Vec<f64>, timestamp_ns: u64) -> Self {
        Self {
            sensor_type,
            values,
            timestamp_ns,
        }
    }

    /// Reference time in seconds, as stored in the `*_timeref` channels.
    pub fn reference_seconds(&self) -> f64 {
        self.timestamp_ns as f64 / NANOSECONDS_IN_SECOND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for sensor in SensorType::ALL {
            assert_eq!(SensorType::from_code(sensor.code()), Some(sensor));
        }
        assert_eq!(SensorType::from_code(99), None);
    }

    #[test]
    fn test_channel_layout() {
        for sensor in SensorType::ALL {
            let keys = sensor.channel_keys();
            if sensor.is_high_frequency() {
                // one key per value plus the reference-time channel
                assert_eq!(keys.len(), sensor.expected_values() + 1);
                assert!(keys.last().unwrap().ends_with("_timeref"));
            } else {
                assert_eq!(keys.len(), 1);
            }
        }
        assert_eq!(SensorType::Accelerometer.leading_key(), "raw_acc_x");
        assert_eq!(SensorType::LinearAcceleration.leading_key(), "processed_user_acc_x");
    }

    #[test]
    fn test_parse_list() {
        let sensors = SensorType::parse_list("gyroscope, gravity,bogus,2");
        assert_eq!(
            sensors,
            vec![
                SensorType::Gyroscope,
                SensorType::Gravity,
                SensorType::MagneticField
            ]
        );
    }

    #[test]
    fn test_reference_seconds() {
        let event = SampleEvent::new(SensorType::Accelerometer, vec![0.0; 3], 1_500_000_000);
        assert!((event.reference_seconds() - 1.5).abs() < 1e-12);
    }
}
