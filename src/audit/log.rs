//! Cumulative recorder activity counters.
//!
//! Tracks how many samples were accepted or dropped, and how sessions ended,
//! so that a degraded host (missing sensors, malformed payloads, failing
//! disk) is visible without reading logs.

use crate::dispatcher::DropReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
pub struct AuditLog {
    samples_accepted: AtomicU64,
    samples_out_of_session: AtomicU64,
    samples_invalid: AtomicU64,
    samples_unrecorded: AtomicU64,
    samples_after_satisfied: AtomicU64,
    samples_debounced: AtomicU64,
    sessions_started: AtomicU64,
    sessions_finished: AtomicU64,
    sessions_aborted: AtomicU64,
    artifacts_written: AtomicU64,
    artifacts_failed: AtomicU64,
    /// When this process started counting
    started: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            samples_accepted: AtomicU64::new(0),
            samples_out_of_session: AtomicU64::new(0),
            samples_invalid: AtomicU64::new(0),
            samples_unrecorded: AtomicU64::new(0),
            samples_after_satisfied: AtomicU64::new(0),
            samples_debounced: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            sessions_finished: AtomicU64::new(0),
            sessions_aborted: AtomicU64::new(0),
            artifacts_written: AtomicU64::new(0),
            artifacts_failed: AtomicU64::new(0),
            started: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that continues from, and saves back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("could not load previous audit counters: {e}");
        }

        log
    }

    pub fn record_sample_accepted(&self) {
        self.samples_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_dropped(&self, reason: &DropReason) {
        let counter = match reason {
            DropReason::NotRecording | DropReason::Stale => &self.samples_out_of_session,
            DropReason::Invalid(_) => &self.samples_invalid,
            DropReason::NotRecorded(_) => &self.samples_unrecorded,
            DropReason::Satisfied(_) => &self.samples_after_satisfied,
            DropReason::Debounced(_) => &self.samples_debounced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_finished(&self) {
        self.sessions_finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_aborted(&self) {
        self.sessions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_artifact_written(&self) {
        self.artifacts_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_artifact_failed(&self) {
        self.artifacts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_out_of_session: self.samples_out_of_session.load(Ordering::Relaxed),
            samples_invalid: self.samples_invalid.load(Ordering::Relaxed),
            samples_unrecorded: self.samples_unrecorded.load(Ordering::Relaxed),
            samples_after_satisfied: self.samples_after_satisfied.load(Ordering::Relaxed),
            samples_debounced: self.samples_debounced.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_finished: self.sessions_finished.load(Ordering::Relaxed),
            sessions_aborted: self.sessions_aborted.load(Ordering::Relaxed),
            artifacts_written: self.artifacts_written.load(Ordering::Relaxed),
            artifacts_failed: self.artifacts_failed.load(Ordering::Relaxed),
            started: self.started,
            uptime_secs: (Utc::now() - self.started).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Recorder Statistics:\n\
             - Samples accepted: {}\n\
             - Samples dropped (not recording): {}\n\
             - Samples dropped (invalid payload): {}\n\
             - Samples dropped (sensor not recorded): {}\n\
             - Samples dropped (channel satisfied): {}\n\
             - Samples dropped (debounced): {}\n\
             - Sessions started: {}\n\
             - Sessions finished: {}\n\
             - Sessions aborted: {}\n\
             - Artifacts written: {}\n\
             - Artifacts lost: {}\n\
             - Uptime: {} seconds",
            stats.samples_accepted,
            stats.samples_out_of_session,
            stats.samples_invalid,
            stats.samples_unrecorded,
            stats.samples_after_satisfied,
            stats.samples_debounced,
            stats.sessions_started,
            stats.sessions_finished,
            stats.sessions_aborted,
            stats.artifacts_written,
            stats.artifacts_failed,
            stats.uptime_secs
        )
    }

    /// Save counters to disk, if this log has a persistence path.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let persisted = PersistedCounters::from_stats(&self.stats());
            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedCounters =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                let pairs = [
                    (&self.samples_accepted, persisted.samples_accepted),
                    (&self.samples_out_of_session, persisted.samples_out_of_session),
                    (&self.samples_invalid, persisted.samples_invalid),
                    (&self.samples_unrecorded, persisted.samples_unrecorded),
                    (&self.samples_after_satisfied, persisted.samples_after_satisfied),
                    (&self.samples_debounced, persisted.samples_debounced),
                    (&self.sessions_started, persisted.sessions_started),
                    (&self.sessions_finished, persisted.sessions_finished),
                    (&self.sessions_aborted, persisted.sessions_aborted),
                    (&self.artifacts_written, persisted.artifacts_written),
                    (&self.artifacts_failed, persisted.artifacts_failed),
                ];
                for (counter, value) in pairs {
                    counter.store(value, Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub samples_accepted: u64,
    pub samples_out_of_session: u64,
    pub samples_invalid: u64,
    pub samples_unrecorded: u64,
    pub samples_after_satisfied: u64,
    pub samples_debounced: u64,
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub sessions_aborted: u64,
    pub artifacts_written: u64,
    pub artifacts_failed: u64,
    pub started: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl AuditStats {
    pub fn samples_dropped(&self) -> u64 {
        self.samples_out_of_session
            + self.samples_invalid
            + self.samples_unrecorded
            + self.samples_after_satisfied
            + self.samples_debounced
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedCounters {
    samples_accepted: u64,
    #[serde(default)]
    samples_out_of_session: u64,
    #[serde(default)]
    samples_invalid: u64,
    #[serde(default)]
    samples_unrecorded: u64,
    #[serde(default)]
    samples_after_satisfied: u64,
    #[serde(default)]
    samples_debounced: u64,
    sessions_started: u64,
    sessions_finished: u64,
    sessions_aborted: u64,
    artifacts_written: u64,
    artifacts_failed: u64,
    last_updated: DateTime<Utc>,
}

impl PersistedCounters {
    fn from_stats(stats: &AuditStats) -> Self {
        Self {
            samples_accepted: stats.samples_accepted,
            samples_out_of_session: stats.samples_out_of_session,
            samples_invalid: stats.samples_invalid,
            samples_unrecorded: stats.samples_unrecorded,
            samples_after_satisfied: stats.samples_after_satisfied,
            samples_debounced: stats.samples_debounced,
            sessions_started: stats.sessions_started,
            sessions_finished: stats.sessions_finished,
            sessions_aborted: stats.sessions_aborted,
            artifacts_written: stats.artifacts_written,
            artifacts_failed: stats.artifacts_failed,
            last_updated: Utc::now(),
        }
    }
}

/// Thread-safe shared audit log.
pub type SharedAuditLog = Arc<AuditLog>;

pub fn create_shared_log() -> SharedAuditLog {
    Arc::new(AuditLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedAuditLog {
    Arc::new(AuditLog::with_persistence(path))
}
