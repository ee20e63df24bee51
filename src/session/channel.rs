//! Per-channel sample buffers.

use crate::sensors::types::{ChannelRole, SensorType};
use serde::Serialize;

/// Append-only series of normalized samples for one channel key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Channel {
    pub key: &'static str,
    pub role: ChannelRole,
    pub source: SensorType,
    samples: Vec<f64>,
}

impl Channel {
    pub fn new(key: &'static str, role: ChannelRole, source: SensorType, capacity: usize) -> Self {
        Self {
            key,
            role,
            source,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Append a sample and return the new length.
    pub fn append(&mut self, value: f64) -> usize {
        self.samples.push(value);
        self.samples.len()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

/// Latest value from a low-frequency sensor; each reading overwrites the last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowFreqReading {
    pub key: &'static str,
    pub source: SensorType,
    pub value: Option<f64>,
}

impl LowFreqReading {
    pub fn new(source: SensorType) -> Self {
        Self {
            key: source.leading_key(),
            source,
            value: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_append() {
        let mut channel = Channel::new("raw_acc_x", ChannelRole::RawHighFreq, SensorType::Accelerometer, 4);
        assert!(channel.is_empty());
        assert_eq!(channel.append(0.5), 1);
        assert_eq!(channel.append(-0.25), 2);
        assert_eq!(channel.samples(), &[0.5, -0.25]);
    }
}
