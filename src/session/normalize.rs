//! Sample normalization: validation, fixed-precision rounding and debounce.

use crate::error::SampleError;
use crate::sensors::types::{SampleEvent, SensorType};
use std::collections::HashMap;
use std::time::Duration;

/// Number of fractional digits kept for every stored value.
pub const DECIMAL_PLACES: usize = 6;

const SCALE: f64 = 1e6;

/// Round to six decimal places, half away from zero.
///
/// Rounding operates on the shortest decimal representation of `x`, so a
/// literal such as `1.2345675` rounds up even though its binary value sits
/// just below the tie. Non-finite values are returned unchanged, and
/// anything that rounds to zero comes back as positive zero.
pub fn round6(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    if x == 0.0 {
        return 0.0;
    }

    // Display for f64 is the shortest round-trip form and never uses exponents.
    let repr = format!("{}", x.abs());
    let Some((int_part, frac_part)) = repr.split_once('.') else {
        return x;
    };
    if frac_part.len() <= DECIMAL_PLACES {
        return x;
    }

    let round_up = frac_part.as_bytes()[DECIMAL_PLACES] >= b'5';
    let scaled = match format!("{int_part}{}", &frac_part[..DECIMAL_PLACES]).parse::<u64>() {
        Ok(v) => v,
        Err(_) => return x,
    };
    let scaled = if round_up { scaled + 1 } else { scaled };
    if scaled == 0 {
        return 0.0;
    }

    let magnitude = scaled as f64 / SCALE;
    if x.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    }
}

/// Reject payloads that are too short or carry non-finite values.
///
/// Extra trailing values are tolerated and ignored downstream.
pub fn validate(event: &SampleEvent) -> Result<(), SampleError> {
    let expected = event.sensor_type.expected_values();
    if event.values.len() < expected {
        return Err(SampleError::Malformed {
            sensor: event.sensor_type,
            expected,
            actual: event.values.len(),
        });
    }
    if let Some(index) = event.values[..expected].iter().position(|v| !v.is_finite()) {
        return Err(SampleError::NonFinite {
            sensor: event.sensor_type,
            index,
        });
    }
    Ok(())
}

/// Per-sensor minimum spacing between accepted samples, measured on the
/// host sensor clock. Disabled when constructed with `None`.
#[derive(Debug, Clone, Default)]
pub struct Debouncer {
    min_gap_ns: Option<u64>,
    last_accepted: HashMap<SensorType, u64>,
}

impl Debouncer {
    pub fn new(min_gap: Option<Duration>) -> Self {
        Self {
            min_gap_ns: min_gap.map(|gap| gap.as_nanos() as u64),
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true if the sample should be kept, recording it as accepted.
    pub fn accept(&mut self, sensor: SensorType, timestamp_ns: u64) -> bool {
        let Some(min_gap) = self.min_gap_ns else {
            return true;
        };
        if let Some(&last) = self.last_accepted.get(&sensor) {
            if timestamp_ns.saturating_sub(last) < min_gap {
                return false;
            }
        }
        self.last_accepted.insert(sensor, timestamp_ns);
        true
    }
}
