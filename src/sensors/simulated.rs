//! Synthetic sensor host.
//!
//! Spawns one producer thread per attached sensor and emits plausible
//! readings at the requested period, with a little jitter so that channels
//! drift apart the way real hardware samplers do. Used by the CLI and demos
//! on machines without motion hardware.

use crate::error::HostError;
use crate::sensors::host::SensorHost;
use crate::sensors::types::{SampleEvent, SensorType};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const STANDARD_GRAVITY: f64 = 9.80665;

struct Producer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct SimulatedHost {
    available: HashSet<SensorType>,
    /// Per-sensor period overrides, simulating hardware that ignores the request
    periods: HashMap<SensorType, Duration>,
    producers: Mutex<HashMap<SensorType, Producer>>,
    epoch: Instant,
}

impl SimulatedHost {
    /// A host exposing every known sensor.
    pub fn new() -> Self {
        Self::with_sensors(&SensorType::ALL)
    }

    pub fn with_sensors(sensors: &[SensorType]) -> Self {
        Self {
            available: sensors.iter().copied().collect(),
            periods: HashMap::new(),
            producers: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// Every known sensor except the given ones.
    pub fn without(missing: &[SensorType]) -> Self {
        let sensors: Vec<SensorType> = SensorType::ALL
            .into_iter()
            .filter(|s| !missing.contains(s))
            .collect();
        Self::with_sensors(&sensors)
    }

    /// Force a sensor to sample at `period` regardless of what is requested.
    pub fn with_period(mut self, sensor: SensorType, period: Duration) -> Self {
        self.periods.insert(sensor, period);
        self
    }

    fn stop_producer(producer: &mut Producer) {
        producer.running.store(false, Ordering::SeqCst);
    }
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorHost for SimulatedHost {
    fn is_available(&self, sensor: SensorType) -> bool {
        self.available.contains(&sensor)
    }

    fn attach(
        &self,
        sensor: SensorType,
        period: Duration,
        feed: Sender<SampleEvent>,
    ) -> Result<(), HostError> {
        if !self.is_available(sensor) {
            return Err(HostError::Unavailable(sensor));
        }

        let mut producers = self.producers.lock();
        if let Some(mut previous) = producers.remove(&sensor) {
            Self::stop_producer(&mut previous);
        }

        let period = self.periods.get(&sensor).copied().unwrap_or(period);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let epoch = self.epoch;

        let handle = thread::Builder::new()
            .name(format!("sim-{}", sensor.leading_key()))
            .spawn(move || produce(sensor, period, epoch, feed, flag))
            .map_err(|e| HostError::AttachFailed {
                sensor,
                reason: e.to_string(),
            })?;

        producers.insert(
            sensor,
            Producer {
                running,
                handle: Some(handle),
            },
        );
        Ok(())
    }

    fn detach(&self, sensor: SensorType) {
        if let Some(mut producer) = self.producers.lock().remove(&sensor) {
            Self::stop_producer(&mut producer);
        }
    }

    fn detach_all(&self) {
        for (_, mut producer) in self.producers.lock().drain() {
            Self::stop_producer(&mut producer);
        }
    }
}

impl Drop for SimulatedHost {
    fn drop(&mut self) {
        for (_, mut producer) in self.producers.lock().drain() {
            Self::stop_producer(&mut producer);
            if let Some(handle) = producer.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

fn produce(
    sensor: SensorType,
    period: Duration,
    epoch: Instant,
    feed: Sender<SampleEvent>,
    running: Arc<AtomicBool>,
) {
    let mut tick: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let t = epoch.elapsed();
        let event = SampleEvent::new(
            sensor,
            synthetic_values(sensor, t.as_secs_f64()),
            t.as_nanos() as u64,
        );
        match feed.try_send(event) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }

        // up to +20% jitter, cycling
        let jitter = period.mul_f64((tick % 5) as f64 * 0.05);
        thread::sleep(period + jitter);
        tick += 1;
    }
}

fn synthetic_values(sensor: SensorType, t: f64) -> Vec<f64> {
    let wobble = (t * 2.0).sin() * 0.2;
    match sensor {
        SensorType::Accelerometer => vec![wobble, 0.1 + wobble, STANDARD_GRAVITY + wobble],
        SensorType::Gravity => vec![0.0, 0.1, STANDARD_GRAVITY],
        SensorType::LinearAcceleration => vec![wobble, wobble * 0.5, wobble * 0.25],
        SensorType::MagneticField => vec![22.0 + wobble, -5.0, -40.0 + wobble],
        SensorType::MagneticFieldUncalibrated => {
            vec![30.0 + wobble, 3.0, -35.0 + wobble, 8.0, 8.0, 5.0]
        }
        SensorType::Gyroscope => vec![wobble * 0.1, -wobble * 0.1, 0.0],
        SensorType::GyroscopeUncalibrated => vec![wobble * 0.1, -wobble * 0.1, 0.0, 0.01, 0.01, 0.0],
        SensorType::AmbientTemperature => vec![21.5],
        SensorType::Light => vec![320.0 + wobble * 10.0],
        SensorType::Pressure => vec![1013.25],
        SensorType::Proximity => vec![5.0],
        SensorType::RelativeHumidity => vec![41.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_synthetic_payload_lengths() {
        for sensor in SensorType::ALL {
            assert!(synthetic_values(sensor, 1.0).len() >= sensor.expected_values());
        }
    }

    #[test]
    fn test_attached_sensor_produces_until_detached() {
        let host = SimulatedHost::with_sensors(&[SensorType::Accelerometer]);
        let (tx, rx) = bounded(1_000);
        host.attach(SensorType::Accelerometer, Duration::from_millis(1), tx)
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.sensor_type, SensorType::Accelerometer);
        assert_eq!(first.values.len(), 3);

        host.detach(SensorType::Accelerometer);
        thread::sleep(Duration::from_millis(50));
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unavailable_sensor() {
        let host = SimulatedHost::without(&[SensorType::Gyroscope]);
        assert!(!host.is_available(SensorType::Gyroscope));
        assert!(host.is_available(SensorType::Accelerometer));
        let (tx, _rx) = bounded(1);
        assert!(host
            .attach(SensorType::Gyroscope, Duration::from_millis(1), tx)
            .is_err());
    }
}
