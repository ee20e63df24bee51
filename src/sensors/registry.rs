//! Registry of sensor capabilities actually present on the host.
//!
//! Built once at startup and immutable afterwards. Registration order
//! defines the column order of persisted artifacts.

use crate::error::RegistryError;
use crate::sensors::host::SensorHost;
use crate::sensors::types::{ChannelRole, SensorType};
use serde::Serialize;
use tracing::{error, info};

/// The primary motion sensor. Without it no session can start.
pub const MANDATORY_SENSOR: SensorType = SensorType::Accelerometer;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryEntry {
    pub sensor_type: SensorType,
    pub nice_name: String,
    pub role: ChannelRole,
    /// Channel key whose fill level stands for this sensor
    pub leading_key: &'static str,
}

impl RegistryEntry {
    pub fn is_high_frequency(&self) -> bool {
        self.role.is_high_frequency()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    entries: Vec<RegistryEntry>,
}

impl SensorRegistry {
    /// An empty registry; populate with [`SensorRegistry::try_register`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// Probe the host for every known sensor.
    ///
    /// Fails when the mandatory accelerometer is missing. Every other sensor
    /// is optional and simply left out when absent.
    pub fn build(host: &dyn SensorHost) -> Result<Self, RegistryError> {
        let mut registry = Self::empty();

        for sensor in SensorType::ALL {
            let added = registry.try_register(
                host,
                sensor,
                sensor.role(),
                sensor.default_nice_name(),
                sensor.leading_key(),
            );
            if !added && sensor == MANDATORY_SENSOR {
                error!(sensor = %sensor, "mandatory sensor missing, recording is impossible");
                return Err(RegistryError::MissingMandatorySensor(sensor));
            }
        }

        info!(
            high_freq = registry.registered_high_freq_types().len(),
            low_freq = registry.registered_low_freq_types().len(),
            "sensor registry built"
        );
        Ok(registry)
    }

    /// Register a sensor if the host has it. Returns false when the
    /// capability is absent or the leading key is already taken.
    pub fn try_register(
        &mut self,
        host: &dyn SensorHost,
        sensor_type: SensorType,
        role: ChannelRole,
        nice_name: &str,
        leading_key: &'static str,
    ) -> bool {
        if !host.is_available(sensor_type) {
            info!("No available sensor: {nice_name}");
            return false;
        }
        if self.is_registered(sensor_type) || self.entries.iter().any(|e| e.leading_key == leading_key)
        {
            info!("Sensor already registered: {nice_name}");
            return false;
        }

        if role.is_high_frequency() {
            info!("Adding hi-freq sensor: {nice_name}");
        } else {
            info!("Adding low-freq sensor: {nice_name}");
        }
        self.entries.push(RegistryEntry {
            sensor_type,
            nice_name: nice_name.to_string(),
            role,
            leading_key,
        });
        true
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn entry(&self, sensor: SensorType) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.sensor_type == sensor)
    }

    pub fn is_registered(&self, sensor: SensorType) -> bool {
        self.entry(sensor).is_some()
    }

    pub fn registered_high_freq_types(&self) -> Vec<SensorType> {
        self.types_where(|e| e.is_high_frequency())
    }

    pub fn registered_low_freq_types(&self) -> Vec<SensorType> {
        self.types_where(|e| !e.is_high_frequency())
    }

    pub fn registered_high_freq_keys(&self) -> Vec<&'static str> {
        self.keys_where(|e| e.is_high_frequency())
    }

    pub fn registered_low_freq_keys(&self) -> Vec<&'static str> {
        self.keys_where(|e| !e.is_high_frequency())
    }

    /// Human readable name for a host sensor code, or the code itself when unknown.
    pub fn nice_name(&self, code: i32) -> String {
        self.entries
            .iter()
            .find(|e| e.sensor_type.code() == code)
            .map(|e| e.nice_name.clone())
            .unwrap_or_else(|| code.to_string())
    }

    fn types_where(&self, pred: impl Fn(&RegistryEntry) -> bool) -> Vec<SensorType> {
        self.entries
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.sensor_type)
            .collect()
    }

    fn keys_where(&self, pred: impl Fn(&RegistryEntry) -> bool) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.leading_key)
            .collect()
    }
}
