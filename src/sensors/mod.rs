//! Sensor capabilities, hosts and the registry.
//!
//! A [`SensorHost`] is the boundary to the platform sensor subsystem. The
//! [`SensorRegistry`] records which capabilities a host actually exposes.

pub mod callback;
pub mod host;
pub mod registry;
pub mod simulated;
pub mod types;

// Re-export commonly used types
pub use callback::{CallbackHost, Delivery};
pub use host::SensorHost;
pub use registry::{RegistryEntry, SensorRegistry, MANDATORY_SENSOR};
pub use simulated::SimulatedHost;
pub use types::{ChannelRole, SampleEvent, SensorType};
