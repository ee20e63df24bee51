//! Synheart Session Recorder - bounded multi-sensor recording sessions.
//!
//! Hardware sensors deliver samples at rates the host controls and never
//! align with each other. This library decides when a recording session has
//! gathered enough data, then writes it out as a row-aligned CSV with
//! per-channel summary statistics.
//!
//! # Guarantees
//!
//! - **One live session**: starting while recording is refused
//! - **Bounded sessions**: a leading channel filling up, or the maximum
//!   duration passing, always ends a session, even with zero samples
//! - **No stalls**: file I/O runs on its own worker, never under the session lock
//! - **No leakage**: every session starts from empty buffers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    Synheart Session Recorder                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │ SensorHost  │──▶│ Feed queues │──▶│ Dispatcher  │            │
//! │  │ (callbacks) │   │ (per sensor)│   │  (thread)   │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │                                             │                    │
//! │                                             ▼                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │  Persister  │◀──│   Frozen    │◀──│  Session +  │            │
//! │  │ (CSV/JSON)  │   │  snapshot   │   │ Termination │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use synheart_session_recorder::{Config, Persister, Recorder, SimulatedHost};
//!
//! let config = Config::default();
//! let sink = Persister::new(&config.export_path);
//! let recorder = Recorder::new(&config, Arc::new(SimulatedHost::new()), Box::new(sink))
//!     .expect("accelerometer missing");
//!
//! recorder.start_session("1700000000000").expect("already recording");
//! ```

pub mod audit;
pub mod broadcast;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod persist;
pub mod policy;
pub mod recorder;
pub mod sensors;
pub mod session;

// Re-export key types at crate root for convenience
pub use audit::{AuditLog, AuditStats, SharedAuditLog};
pub use broadcast::{SessionStateBroadcaster, StateChange};
pub use config::{Config, ConfigError};
pub use dispatcher::{Applied, DropReason, SamplingDispatcher};
pub use error::{HostError, PersistError, RecorderError, RegistryError, SampleError};
pub use persist::{ChannelSummary, Persister, SessionSink};
pub use policy::{select_leading, TerminationPolicy};
pub use recorder::Recorder;
pub use sensors::{
    CallbackHost, SampleEvent, SensorHost, SensorRegistry, SensorType, SimulatedHost,
};
pub use session::{round6, FinishReason, FrozenSession, Session, SessionId, SessionState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
