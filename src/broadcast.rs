//! Session state notifications and live sample preview.
//!
//! Subscribers get their own bounded queue. Publishing never blocks: a
//! subscriber whose queue is full misses that event, and subscribers that
//! hung up are pruned on the next publish.

use crate::sensors::types::SampleEvent;
use crate::session::SessionState;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

const STATE_QUEUE_CAPACITY: usize = 64;
const SAMPLE_QUEUE_CAPACITY: usize = 4_096;

/// A recording state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub recording: bool,
    pub state: SessionState,
}

impl StateChange {
    pub fn new(state: SessionState) -> Self {
        Self {
            recording: state.is_recording(),
            state,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStateBroadcaster {
    state_subscribers: Mutex<Vec<Sender<StateChange>>>,
    sample_subscribers: Mutex<Vec<Sender<SampleEvent>>>,
}

impl SessionStateBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every state transition from now on.
    pub fn subscribe_state(&self) -> Receiver<StateChange> {
        let (tx, rx) = bounded(STATE_QUEUE_CAPACITY);
        self.state_subscribers.lock().push(tx);
        rx
    }

    /// Receive every normalized sample accepted from now on.
    pub fn subscribe_samples(&self) -> Receiver<SampleEvent> {
        let (tx, rx) = bounded(SAMPLE_QUEUE_CAPACITY);
        self.sample_subscribers.lock().push(tx);
        rx
    }

    pub fn has_sample_subscribers(&self) -> bool {
        !self.sample_subscribers.lock().is_empty()
    }

    pub fn publish_state(&self, change: StateChange) {
        publish(&self.state_subscribers, change, "state");
    }

    pub fn publish_sample(&self, event: &SampleEvent) {
        let mut subscribers = self.sample_subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| !matches!(tx.try_send(event.clone()), Err(TrySendError::Disconnected(_))));
    }
}

fn publish<T: Clone>(subscribers: &Mutex<Vec<Sender<T>>>, event: T, kind: &str) {
    subscribers.lock().retain(|tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(kind, "subscriber queue full, event dropped");
            true
        }
        Err(TrySendError::Disconnected(_)) => false,
    });
}
