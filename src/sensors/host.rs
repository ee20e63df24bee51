//! Host sensor subsystem abstraction.
//!
//! A host knows which sensor capabilities physically exist and pushes
//! deliveries for attached sensors into the feed it was handed. Deliveries
//! for different sensors may come from different threads; deliveries for one
//! sensor arrive in order.

use crate::error::HostError;
use crate::sensors::types::{SampleEvent, SensorType};
use crossbeam_channel::Sender;
use std::time::Duration;

pub trait SensorHost: Send + Sync {
    /// Whether the capability exists on this host.
    fn is_available(&self, sensor: SensorType) -> bool;

    /// Start delivering samples for `sensor` into `feed`, roughly every `period`.
    fn attach(
        &self,
        sensor: SensorType,
        period: Duration,
        feed: Sender<SampleEvent>,
    ) -> Result<(), HostError>;

    /// Stop soliciting deliveries for `sensor`. Must not block on in-flight samples.
    fn detach(&self, sensor: SensorType);

    /// Stop soliciting deliveries for every sensor.
    fn detach_all(&self);
}
