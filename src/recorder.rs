//! The recording engine.
//!
//! [`Recorder`] is a monitor around the single live [`Session`]. Every
//! mutation (append, satisfied flag, state transition) happens under one
//! session lock that is never held across I/O.
//!
//! Every session gets its own set of bounded feed queues, one per recorded
//! sensor, tagged with the session's generation. A dispatcher thread selects
//! over the current set and applies deliveries in arrival order; a delivery
//! whose generation no longer matches the live session is dropped, so nothing
//! queued for one session can land in the next. When the feeds go quiet the
//! dispatcher still wakes up periodically so a session that receives nothing
//! at all is bounded by the maximum duration. Finished sessions are frozen
//! and handed to a sink worker thread, so the next session can start before
//! the previous one is written.

use crate::audit::{create_shared_log, SharedAuditLog};
use crate::broadcast::{SessionStateBroadcaster, StateChange};
use crate::config::Config;
use crate::dispatcher::{Applied, DropReason, SamplingDispatcher};
use crate::error::{RecorderError, SampleError};
use crate::persist::SessionSink;
use crate::policy::{select_leading, TerminationPolicy};
use crate::sensors::{SampleEvent, SensorHost, SensorRegistry, SensorType};
use crate::session::{Debouncer, FinishReason, FrozenSession, Session, SessionId, SessionState};
use crossbeam_channel::{bounded, unbounded, Receiver, Select, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Settings copied out of [`Config`] at construction.
#[derive(Debug, Clone)]
struct Settings {
    recorded_sensors: Vec<SensorType>,
    high_freq_period: Duration,
    low_freq_period: Duration,
    debounce: Option<Duration>,
    stream_samples: bool,
    feed_capacity: usize,
    deadline_check_interval: Duration,
}

/// Receiving ends of one session's feeds.
struct FeedSet {
    generation: u64,
    receivers: Vec<Receiver<SampleEvent>>,
}

struct Shared {
    settings: Settings,
    registry: SensorRegistry,
    host: Arc<dyn SensorHost>,
    policy: TerminationPolicy,
    dispatcher: SamplingDispatcher,
    session: Mutex<Option<Session>>,
    /// Bumped under the session lock each time a session starts
    generation: AtomicU64,
    /// Sending ends of the live session's feeds
    feeds: Mutex<HashMap<SensorType, Sender<SampleEvent>>>,
    feed_sets: Sender<FeedSet>,
    broadcaster: SessionStateBroadcaster,
    sink_tx: Mutex<Option<Sender<FrozenSession>>>,
    audit: SharedAuditLog,
}

pub struct Recorder {
    shared: Arc<Shared>,
    shutdown_tx: Option<Sender<()>>,
    dispatch_thread: Option<JoinHandle<()>>,
    sink_thread: Option<JoinHandle<()>>,
}

impl Recorder {
    /// Build the registry against `host` and start the worker threads.
    ///
    /// Fails when the configuration is invalid or the host lacks the
    /// mandatory sensor.
    pub fn new(
        config: &Config,
        host: Arc<dyn SensorHost>,
        sink: Box<dyn SessionSink>,
    ) -> Result<Self, RecorderError> {
        Self::with_audit(config, host, sink, create_shared_log())
    }

    pub fn with_audit(
        config: &Config,
        host: Arc<dyn SensorHost>,
        sink: Box<dyn SessionSink>,
        audit: SharedAuditLog,
    ) -> Result<Self, RecorderError> {
        config.validate()?;
        let registry = SensorRegistry::build(host.as_ref()).map_err(|e| {
            error!("cannot record on this host: {e}");
            e
        })?;

        let policy = TerminationPolicy::new(config.target_samples, config.max_duration);
        let (sink_tx, sink_rx) = unbounded();
        let (feed_sets_tx, feed_sets_rx) = unbounded();

        let shared = Arc::new(Shared {
            settings: Settings {
                recorded_sensors: config.recorded_sensors.clone(),
                high_freq_period: config.high_freq_period(),
                low_freq_period: config.low_freq_period(),
                debounce: config.debounce(),
                stream_samples: config.stream_samples,
                feed_capacity: config.feed_capacity,
                deadline_check_interval: config.deadline_check_interval(),
            },
            registry,
            host,
            policy,
            dispatcher: SamplingDispatcher::new(policy),
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            feeds: Mutex::new(HashMap::new()),
            feed_sets: feed_sets_tx,
            broadcaster: SessionStateBroadcaster::new(),
            sink_tx: Mutex::new(Some(sink_tx)),
            audit,
        });

        let sink_audit = shared.audit.clone();
        let sink_thread = thread::Builder::new()
            .name("recorder-sink".into())
            .spawn(move || run_sink(sink, sink_rx, sink_audit))
            .map_err(RecorderError::Spawn)?;

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let dispatch_shared = shared.clone();
        let dispatch_thread = match thread::Builder::new()
            .name("recorder-dispatch".into())
            .spawn(move || run_dispatcher(dispatch_shared, shutdown_rx, feed_sets_rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                // let the sink worker exit before reporting
                shared.sink_tx.lock().take();
                let _ = sink_thread.join();
                return Err(RecorderError::Spawn(e));
            }
        };

        info!(
            high_freq = ?shared.registry.registered_high_freq_keys(),
            low_freq = ?shared.registry.registered_low_freq_keys(),
            target_samples = policy.target_samples,
            max_duration_secs = policy.max_duration.as_secs(),
            "recorder ready"
        );

        Ok(Self {
            shared,
            shutdown_tx: Some(shutdown_tx),
            dispatch_thread: Some(dispatch_thread),
            sink_thread: Some(sink_thread),
        })
    }

    pub fn start_session(&self, id: impl Into<SessionId>) -> Result<(), RecorderError> {
        self.start_session_at(id, Instant::now())
    }

    /// Start recording, with `now` as the session's start instant.
    pub fn start_session_at(&self, id: impl Into<SessionId>, now: Instant) -> Result<(), RecorderError> {
        self.shared.start(id.into(), now)
    }

    /// Abort the live session, discarding its buffers without persisting.
    ///
    /// Returns the aborted session's id, or `None` when nothing was recording.
    pub fn stop_session(&self) -> Option<SessionId> {
        self.shared.abort()
    }

    pub fn abort(&self) -> Option<SessionId> {
        self.shared.abort()
    }

    /// Apply one delivery directly, bypassing the feed queues.
    pub fn dispatch(&self, event: &SampleEvent) -> Result<Applied, DropReason> {
        self.shared.dispatch(event, Instant::now())
    }

    pub fn dispatch_at(&self, event: &SampleEvent, now: Instant) -> Result<Applied, DropReason> {
        self.shared.dispatch(event, now)
    }

    /// Finish the live session if the duration bound has passed.
    pub fn check_deadline(&self) -> bool {
        self.shared.check_deadline(Instant::now())
    }

    pub fn check_deadline_at(&self, now: Instant) -> bool {
        self.shared.check_deadline(now)
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }

    pub fn state(&self) -> SessionState {
        self.shared
            .session
            .lock()
            .as_ref()
            .map(Session::state)
            .unwrap_or_default()
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.shared.session.lock().as_ref().map(|s| s.id().clone())
    }

    /// Sample count per high-frequency channel of the live session.
    pub fn fill_levels(&self) -> Vec<(&'static str, usize)> {
        self.shared
            .session
            .lock()
            .as_ref()
            .map(Session::fill_levels)
            .unwrap_or_default()
    }

    pub fn registered_high_freq_channels(&self) -> Vec<&'static str> {
        self.shared.registry.registered_high_freq_keys()
    }

    pub fn registered_low_freq_channels(&self) -> Vec<&'static str> {
        self.shared.registry.registered_low_freq_keys()
    }

    pub fn registry(&self) -> &SensorRegistry {
        &self.shared.registry
    }

    /// Receive every recording state transition from now on.
    pub fn subscribe(&self) -> Receiver<StateChange> {
        self.shared.broadcaster.subscribe_state()
    }

    /// Receive normalized samples; only published when sample streaming is on.
    pub fn subscribe_samples(&self) -> Receiver<SampleEvent> {
        self.shared.broadcaster.subscribe_samples()
    }

    /// The live session's bounded delivery queue for a sensor.
    ///
    /// `None` while idle or when the sensor is not recorded. A sender kept
    /// past the end of its session only feeds a queue nobody applies.
    pub fn feed(&self, sensor: SensorType) -> Option<Sender<SampleEvent>> {
        self.shared.feeds.lock().get(&sensor).cloned()
    }

    pub fn audit(&self) -> &SharedAuditLog {
        &self.shared.audit
    }

    /// Abort any live session, stop the dispatcher and wait for pending
    /// sessions to be written. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.dispatch_thread.is_none() && self.sink_thread.is_none() {
            return;
        }
        if let Some(id) = self.shared.abort() {
            info!(session = %id, "recorder shutting down, live session discarded");
        }

        drop(self.shutdown_tx.take());
        if let Some(handle) = self.dispatch_thread.take() {
            if handle.join().is_err() {
                error!("dispatcher thread panicked");
            }
        }

        drop(self.shared.sink_tx.lock().take());
        if let Some(handle) = self.sink_thread.take() {
            if handle.join().is_err() {
                error!("sink thread panicked");
            }
        }

        if let Err(e) = self.shared.audit.save() {
            warn!("could not save audit counters: {e}");
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn start(&self, id: SessionId, now: Instant) -> Result<(), RecorderError> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let high_freq: Vec<SensorType> = self
            .registry
            .registered_high_freq_types()
            .into_iter()
            .filter(|sensor| self.settings.recorded_sensors.contains(sensor))
            .collect();
        let low_freq = self.registry.registered_low_freq_types();
        let leading = select_leading(&high_freq);

        let session = Session::new(
            id,
            &high_freq,
            &low_freq,
            leading,
            self.policy.target_samples,
            Debouncer::new(self.settings.debounce),
            now,
        );
        info!(
            session = %session.id(),
            sensors = session.sensors().len(),
            leading = ?session.leading_keys(),
            "starting session"
        );
        *slot = Some(session);
        self.open_feeds(high_freq.iter().chain(&low_freq).copied());

        for &sensor in &high_freq {
            self.attach(sensor, self.settings.high_freq_period);
        }
        for &sensor in &low_freq {
            self.attach(sensor, self.settings.low_freq_period);
        }

        self.broadcaster
            .publish_state(StateChange::new(SessionState::Recording));
        self.audit.record_session_started();
        Ok(())
    }

    /// Create fresh queues for a new session and hand them to the dispatcher.
    ///
    /// Called under the session lock.
    fn open_feeds(&self, sensors: impl Iterator<Item = SensorType>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let capacity = self.settings.feed_capacity.max(1);

        let mut senders = HashMap::new();
        let mut receivers = Vec::new();
        for sensor in sensors {
            let (tx, rx) = bounded(capacity);
            senders.insert(sensor, tx);
            receivers.push(rx);
        }
        *self.feeds.lock() = senders;
        if self.feed_sets.send(FeedSet { generation, receivers }).is_err() {
            warn!(generation, "dispatcher gone, deliveries will not be applied");
        }
    }

    /// Retire the live session's queues; anything still in them is dropped.
    fn close_feeds(&self) {
        self.feeds.lock().clear();
        let generation = self.generation.load(Ordering::SeqCst);
        let _ = self.feed_sets.send(FeedSet {
            generation,
            receivers: Vec::new(),
        });
    }

    fn attach(&self, sensor: SensorType, period: Duration) {
        let Some(feed) = self.feeds.lock().get(&sensor).cloned() else {
            return;
        };
        if let Err(e) = self.host.attach(sensor, period, feed) {
            warn!(sensor = %sensor, "could not attach sensor: {e}");
        }
    }

    fn abort(&self) -> Option<SessionId> {
        let mut slot = self.session.lock();
        let session = slot.take()?;
        self.host.detach_all();
        self.close_feeds();

        let id = session.id().clone();
        drop(session);
        info!(session = %id, "session aborted, buffers discarded");

        self.broadcaster.publish_state(StateChange::new(SessionState::Idle));
        self.audit.record_session_aborted();
        Some(id)
    }

    fn dispatch(&self, event: &SampleEvent, now: Instant) -> Result<Applied, DropReason> {
        let mut slot = self.session.lock();
        self.apply(&mut slot, event, now)
    }

    /// Apply a delivery taken from the feeds of session `generation`.
    fn dispatch_queued(
        &self,
        generation: u64,
        event: &SampleEvent,
        now: Instant,
    ) -> Result<Applied, DropReason> {
        let mut slot = self.session.lock();
        if slot.is_none() || self.generation.load(Ordering::SeqCst) != generation {
            debug!(sensor = %event.sensor_type, generation, "delivery from an ended session, dropped");
            self.audit.record_sample_dropped(&DropReason::Stale);
            return Err(DropReason::Stale);
        }
        self.apply(&mut slot, event, now)
    }

    fn apply(
        &self,
        slot: &mut Option<Session>,
        event: &SampleEvent,
        now: Instant,
    ) -> Result<Applied, DropReason> {
        let Some(session) = slot.as_mut() else {
            warn!(sensor = %event.sensor_type, "sample delivered while not recording, dropped");
            self.audit.record_sample_dropped(&DropReason::NotRecording);
            return Err(DropReason::NotRecording);
        };

        let result = if self.registry.is_registered(event.sensor_type) {
            self.dispatcher.apply(session, event)
        } else {
            Err(DropReason::Invalid(SampleError::Unregistered(event.sensor_type)))
        };
        match &result {
            Ok(applied) => {
                self.audit.record_sample_accepted();
                if applied.satisfied {
                    debug!(sensor = %event.sensor_type, fill = applied.fill, "sensor satisfied, detaching");
                    self.host.detach(event.sensor_type);
                }
                if self.settings.stream_samples {
                    self.broadcaster.publish_sample(&applied.normalized);
                }
            }
            Err(reason @ DropReason::Invalid(_)) => {
                warn!(session = %session.id(), "dropping sample: {reason}");
                self.audit.record_sample_dropped(reason);
            }
            Err(reason) => {
                debug!(session = %session.id(), "dropping sample: {reason}");
                self.audit.record_sample_dropped(reason);
            }
        }

        if let Some(reason) = self.policy.check(session, now) {
            self.finish(slot, reason);
        }
        result
    }

    fn check_deadline(&self, now: Instant) -> bool {
        let mut slot = self.session.lock();
        let Some(reason) = slot.as_ref().and_then(|s| self.policy.check(s, now)) else {
            return false;
        };
        self.finish(&mut slot, reason);
        true
    }

    /// Freeze the live session and hand it to the sink worker.
    fn finish(&self, slot: &mut Option<Session>, reason: FinishReason) {
        let Some(mut session) = slot.take() else {
            return;
        };
        session.begin_stopping();
        self.host.detach_all();
        self.close_feeds();

        info!(
            session = %session.id(),
            reason = %reason,
            fill = ?session.fill_levels(),
            "session complete"
        );
        let frozen = session.freeze(reason);

        match self.sink_tx.lock().as_ref() {
            Some(tx) => {
                if let Err(e) = tx.send(frozen) {
                    error!(session = %e.0.id, "sink worker gone, session lost");
                }
            }
            None => error!(session = %frozen.id, "recorder shut down, session lost"),
        }

        self.broadcaster
            .publish_state(StateChange::new(SessionState::Finished));
        self.audit.record_session_finished();
    }

}

enum Wake {
    Shutdown,
    Pulse,
    Feeds(FeedSet),
    Delivery(SampleEvent),
    Closed(usize),
}

fn run_dispatcher(shared: Arc<Shared>, shutdown: Receiver<()>, feed_sets: Receiver<FeedSet>) {
    let interval = shared.settings.deadline_check_interval;
    let mut current = FeedSet {
        generation: 0,
        receivers: Vec::new(),
    };

    loop {
        let wake = {
            let mut select = Select::new();
            let shutdown_index = select.recv(&shutdown);
            let feed_sets_index = select.recv(&feed_sets);
            for rx in &current.receivers {
                select.recv(rx);
            }
            let first_feed = feed_sets_index + 1;

            match select.select_timeout(interval) {
                Err(_) => Wake::Pulse,
                Ok(op) if op.index() == shutdown_index => {
                    let _ = op.recv(&shutdown);
                    Wake::Shutdown
                }
                Ok(op) if op.index() == feed_sets_index => match op.recv(&feed_sets) {
                    Ok(set) => Wake::Feeds(set),
                    Err(_) => Wake::Shutdown,
                },
                Ok(op) => {
                    let position = op.index() - first_feed;
                    match op.recv(&current.receivers[position]) {
                        Ok(event) => Wake::Delivery(event),
                        Err(_) => Wake::Closed(position),
                    }
                }
            }
        };

        match wake {
            Wake::Shutdown => break,
            Wake::Pulse => {
                shared.check_deadline(Instant::now());
            }
            Wake::Feeds(set) => {
                let discarded: usize = current.receivers.iter().map(|rx| rx.try_iter().count()).sum();
                if discarded > 0 {
                    debug!(discarded, generation = current.generation, "discarded stale deliveries");
                }
                current = set;
            }
            Wake::Delivery(event) => {
                let _ = shared.dispatch_queued(current.generation, &event, Instant::now());
            }
            Wake::Closed(position) => {
                current.receivers.swap_remove(position);
            }
        }
    }
    debug!("dispatcher stopped");
}

fn run_sink(mut sink: Box<dyn SessionSink>, sessions: Receiver<FrozenSession>, audit: SharedAuditLog) {
    for session in sessions.iter() {
        let id = session.id.clone();
        match sink.consume(session) {
            Ok(()) => audit.record_artifact_written(),
            Err(e) => {
                error!(session = %id, "failed to persist session: {e}");
                audit.record_artifact_failed();
            }
        }
    }
    debug!("sink worker stopped");
}
