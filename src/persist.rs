//! Session artifacts.
//!
//! A finished session is written as a directory holding:
//! - `high_freq.csv`: one row per sample index, one column per present channel
//! - `summary.txt`: `key, mean, min, max, stddev` per channel
//! - `session.json`: timing, finish reason, low-frequency readings, summaries
//!
//! Rows are aligned by truncating every channel to the shortest one. Channels
//! that received no samples at all are left out of the artifact.

use crate::error::PersistError;
use crate::session::{round6, Channel, FinishReason, FrozenSession, DECIMAL_PLACES};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const HIGH_FREQ_DATA_FILENAME: &str = "high_freq.csv";
pub const SUMMARY_FILENAME: &str = "summary.txt";
pub const METADATA_FILENAME: &str = "session.json";

/// Name of the optional trailing column carrying the session identifier.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "synheart-session-recorder";

/// Consumer of finished sessions, run off the sampling path.
pub trait SessionSink: Send {
    /// Take ownership of a finished session. Errors are logged by the caller
    /// and cost only this session's artifact.
    fn consume(&mut self, session: FrozenSession) -> Result<(), PersistError>;
}

/// Forwards finished sessions to another thread.
impl SessionSink for Sender<FrozenSession> {
    fn consume(&mut self, session: FrozenSession) -> Result<(), PersistError> {
        if self.send(session).is_err() {
            warn!("session receiver hung up, dropping session");
        }
        Ok(())
    }
}

/// Summary statistics over every sample a channel collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub key: String,
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl ChannelSummary {
    /// `None` for an empty channel.
    pub fn compute(channel: &Channel) -> Option<Self> {
        let samples = channel.samples();
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            key: channel.key.to_string(),
            count: samples.len(),
            sum: samples.iter().sum(),
            min: Statistics::min(samples.iter()),
            max: Statistics::max(samples.iter()),
            mean: Statistics::mean(samples.iter()),
            std_dev: Statistics::population_std_dev(samples.iter()),
        })
    }

    /// `key, mean, min, max, stddev`, always with `.` as decimal separator.
    pub fn to_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}",
            self.key,
            format_value(self.mean),
            format_value(self.min),
            format_value(self.max),
            format_value(self.std_dev),
        )
    }
}

/// Fixed six-decimal text of a value, rounded half up first.
pub fn format_value(value: f64) -> String {
    format!("{:.prec$}", round6(value), prec = DECIMAL_PLACES)
}

/// Per-channel summaries for every present channel, in column order.
pub fn summarize(session: &FrozenSession) -> Vec<ChannelSummary> {
    session
        .present_channels()
        .filter_map(ChannelSummary::compute)
        .collect()
}

pub fn render_summary(summaries: &[ChannelSummary]) -> String {
    summaries
        .iter()
        .map(|s| s.to_line() + "\n")
        .collect()
}

/// Render the row-aligned CSV for a session.
///
/// Writes exactly `row_count()` rows. Every present channel is at least that
/// long because the row count is the minimum over them.
pub fn render_csv(session: &FrozenSession, include_timestamp: bool) -> Result<String, PersistError> {
    let channels: Vec<&Channel> = session.present_channels().collect();
    if channels.is_empty() {
        return Err(PersistError::NoData(session.id.to_string()));
    }
    let rows = session.row_count();

    let mut out = String::new();
    let mut header: Vec<&str> = channels.iter().map(|c| c.key).collect();
    if include_timestamp {
        header.push(TIMESTAMP_COLUMN);
    }
    out.push_str(&header.join(","));
    out.push('\n');

    for i in 0..rows {
        for (col, channel) in channels.iter().enumerate() {
            debug_assert!(channel.len() > i, "channel {} shorter than row count", channel.key);
            if col > 0 {
                out.push(',');
            }
            out.push_str(&format_value(channel.samples()[i]));
        }
        if include_timestamp {
            let _ = write!(out, ",{}", session.id);
        }
        out.push('\n');
    }
    Ok(out)
}

/// Everything about a session that is not a raw sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub producer: String,
    pub version: String,
    pub instance_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub finish_reason: FinishReason,
    pub leading_keys: Vec<String>,
    pub rows: usize,
    pub channel_lengths: BTreeMap<String, usize>,
    pub low_frequency: BTreeMap<String, Option<f64>>,
    pub summaries: Vec<ChannelSummary>,
}

/// Paths of a written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub dir: PathBuf,
    pub data_path: PathBuf,
    pub summary_path: PathBuf,
    pub metadata_path: PathBuf,
    pub rows: usize,
}

/// Writes finished sessions under an export directory.
#[derive(Debug, Clone)]
pub struct Persister {
    export_dir: PathBuf,
    include_timestamp_column: bool,
    instance_id: Uuid,
}

impl Persister {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            include_timestamp_column: true,
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn with_timestamp_column(mut self, include: bool) -> Self {
        self.include_timestamp_column = include;
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn metadata(&self, session: &FrozenSession, summaries: &[ChannelSummary]) -> SessionMetadata {
        SessionMetadata {
            session_id: session.id.to_string(),
            producer: PRODUCER_NAME.to_string(),
            version: crate::VERSION.to_string(),
            instance_id: self.instance_id.to_string(),
            started_at: session.started_at.to_rfc3339(),
            finished_at: session.finished_at.to_rfc3339(),
            finish_reason: session.reason.clone(),
            leading_keys: session.leading_keys.iter().map(|k| k.to_string()).collect(),
            rows: session.row_count(),
            channel_lengths: session
                .channels
                .iter()
                .map(|c| (c.key.to_string(), c.len()))
                .collect(),
            low_frequency: session
                .low_freq
                .iter()
                .map(|r| (r.key.to_string(), r.value))
                .collect(),
            summaries: summaries.to_vec(),
        }
    }

    /// Write all three files for a session.
    pub fn persist(&self, session: &FrozenSession) -> Result<Artifact, PersistError> {
        let csv = render_csv(session, self.include_timestamp_column)?;
        let summaries = summarize(session);
        let metadata = serde_json::to_string_pretty(&self.metadata(session, &summaries))?;

        let dir = self.export_dir.join(session.id.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| PersistError::io(&dir, e))?;

        let artifact = Artifact {
            data_path: dir.join(HIGH_FREQ_DATA_FILENAME),
            summary_path: dir.join(SUMMARY_FILENAME),
            metadata_path: dir.join(METADATA_FILENAME),
            rows: session.row_count(),
            dir,
        };
        write_file(&artifact.data_path, &csv)?;
        write_file(&artifact.summary_path, &render_summary(&summaries))?;
        write_file(&artifact.metadata_path, &metadata)?;

        for summary in &summaries {
            info!(session = %session.id, "{}", summary.to_line());
        }
        info!(
            session = %session.id,
            rows = artifact.rows,
            path = %artifact.dir.display(),
            "session saved"
        );
        Ok(artifact)
    }
}

impl SessionSink for Persister {
    fn consume(&mut self, session: FrozenSession) -> Result<(), PersistError> {
        self.persist(&session).map(|_| ())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), PersistError> {
    std::fs::write(path, contents).map_err(|e| PersistError::io(path, e))
}
