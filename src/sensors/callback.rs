//! Host bridge for platform glue that receives sensor callbacks itself.
//!
//! The glue declares which capabilities exist and forwards each callback
//! through [`CallbackHost::deliver`]. Deliveries for sensors that are not
//! currently attached are refused, which is how detaching a satisfied
//! channel stops its producer.

use crate::error::HostError;
use crate::sensors::host::SensorHost;
use crate::sensors::types::{SampleEvent, SensorType};
use crossbeam_channel::{Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Outcome of forwarding one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    /// Nobody is listening for this sensor right now
    Detached,
    /// The feed queue is full; the sample was dropped
    QueueFull,
}

#[derive(Debug, Default)]
pub struct CallbackHost {
    available: HashSet<SensorType>,
    feeds: Mutex<HashMap<SensorType, (Duration, Sender<SampleEvent>)>>,
}

impl CallbackHost {
    pub fn with_sensors(sensors: &[SensorType]) -> Self {
        Self {
            available: sensors.iter().copied().collect(),
            feeds: Mutex::new(HashMap::new()),
        }
    }

    /// A host exposing every known sensor.
    pub fn full() -> Self {
        Self::with_sensors(&SensorType::ALL)
    }

    /// Forward a callback from the platform into the attached feed.
    pub fn deliver(&self, event: SampleEvent) -> Delivery {
        let feed = self
            .feeds
            .lock()
            .get(&event.sensor_type)
            .map(|(_, feed)| feed.clone());

        match feed {
            None => Delivery::Detached,
            Some(feed) => match feed.try_send(event) {
                Ok(()) => Delivery::Enqueued,
                Err(TrySendError::Full(_)) => Delivery::QueueFull,
                Err(TrySendError::Disconnected(_)) => Delivery::Detached,
            },
        }
    }

    pub fn is_attached(&self, sensor: SensorType) -> bool {
        self.feeds.lock().contains_key(&sensor)
    }

    /// Sensors currently attached, sorted.
    pub fn attached(&self) -> Vec<SensorType> {
        let mut sensors: Vec<SensorType> = self.feeds.lock().keys().copied().collect();
        sensors.sort();
        sensors
    }

    /// Sampling period requested for an attached sensor.
    pub fn requested_period(&self, sensor: SensorType) -> Option<Duration> {
        self.feeds.lock().get(&sensor).map(|(period, _)| *period)
    }
}

impl SensorHost for CallbackHost {
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
        self.feeds.lock().insert(sensor, (period, feed));
        Ok(())
    }

    fn detach(&self, sensor: SensorType) {
        self.feeds.lock().remove(&sensor);
    }

    fn detach_all(&self) {
        self.feeds.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_deliver_requires_attach() {
        let host = CallbackHost::with_sensors(&[SensorType::Accelerometer]);
        let event = SampleEvent::new(SensorType::Accelerometer, vec![0.0, 0.0, 9.8], 1);
        assert_eq!(host.deliver(event.clone()), Delivery::Detached);

        let (tx, rx) = bounded(1);
        host.attach(SensorType::Accelerometer, Duration::from_millis(25), tx)
            .unwrap();
        assert_eq!(host.deliver(event.clone()), Delivery::Enqueued);
        assert_eq!(host.deliver(event.clone()), Delivery::QueueFull);
        assert_eq!(rx.try_recv().unwrap(), event);

        host.detach(SensorType::Accelerometer);
        assert!(!host.is_attached(SensorType::Accelerometer));
        assert_eq!(host.deliver(event), Delivery::Detached);
    }

    #[test]
    fn test_attach_unavailable_sensor_fails() {
        let host = CallbackHost::with_sensors(&[SensorType::Accelerometer]);
        let (tx, _rx) = bounded(1);
        let result = host.attach(SensorType::Gyroscope, Duration::from_millis(25), tx);
        assert!(matches!(result, Err(HostError::Unavailable(SensorType::Gyroscope))));
    }
}
