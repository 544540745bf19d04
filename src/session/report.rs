//! Session counters and the end-of-run summary.
//!
//! Counters are owned by the single control loop, so they are plain
//! integers rather than atomics.

use crate::collector::supervisor::ConnectionState;
use crate::collector::timing::JitterStats;
use crate::collector::types::SourceMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// File name used for the persisted summary inside the data directory.
pub const LAST_SESSION_FILE: &str = "last_session.json";

/// Accumulates per-session statistics.
#[derive(Debug)]
pub struct SessionReporter {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    started: Instant,
    samples_processed: u64,
    signatures_generated: u64,
    parse_errors: u64,
    windows_dropped: u64,
    sink_errors: u64,
    fallbacks: u64,
    poor_quality_reports: u64,
}

impl SessionReporter {
    /// Start counting; the session id and start time are fixed here.
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            samples_processed: 0,
            signatures_generated: 0,
            parse_errors: 0,
            windows_dropped: 0,
            sink_errors: 0,
            fallbacks: 0,
            poor_quality_reports: 0,
        }
    }

    /// Random id of this session.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record_sample(&mut self) {
        self.samples_processed += 1;
    }

    pub fn record_signature(&mut self) {
        self.signatures_generated += 1;
    }

    /// Add malformed device lines skipped by the source.
    pub fn record_parse_errors(&mut self, count: u64) {
        self.parse_errors += count;
    }

    /// A window failed processing and was skipped.
    pub fn record_window_dropped(&mut self) {
        self.windows_dropped += 1;
    }

    /// An output sink rejected a record.
    pub fn record_sink_error(&mut self) {
        self.sink_errors += 1;
    }

    /// The hardware source was abandoned for synthetic data.
    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    pub fn record_poor_quality(&mut self) {
        self.poor_quality_reports += 1;
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    pub fn signatures_generated(&self) -> u64 {
        self.signatures_generated
    }

    /// Everything that was skipped rather than processed.
    pub fn errors_skipped(&self) -> u64 {
        self.parse_errors + self.windows_dropped + self.sink_errors
    }

    /// Freeze the counters into a summary.
    pub fn finish(
        &self,
        mode: SourceMode,
        connection: Option<ConnectionState>,
        jitter: JitterStats,
    ) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            ended_at: Utc::now(),
            duration_seconds: self.started.elapsed().as_secs_f64(),
            mode,
            connection,
            samples_processed: self.samples_processed,
            signatures_generated: self.signatures_generated,
            errors_skipped: self.errors_skipped(),
            parse_errors: self.parse_errors,
            windows_dropped: self.windows_dropped,
            sink_errors: self.sink_errors,
            fallbacks: self.fallbacks,
            poor_quality_reports: self.poor_quality_reports,
            max_lateness_ms: jitter.max_lateness.as_secs_f64() * 1000.0,
            mean_lateness_ms: jitter.mean_lateness.as_secs_f64() * 1000.0,
            timing_resyncs: jitter.resyncs,
        }
    }
}

impl Default for SessionReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot published at shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Random id of this session
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall time from start to finish
    pub duration_seconds: f64,
    /// Source mode at the end of the session
    pub mode: SourceMode,
    /// Final hardware connection state, if hardware was attempted
    pub connection: Option<ConnectionState>,
    pub samples_processed: u64,
    pub signatures_generated: u64,
    /// Sum of the three error counters below
    pub errors_skipped: u64,
    /// Malformed device lines
    pub parse_errors: u64,
    /// Windows that failed processing
    pub windows_dropped: u64,
    /// Records an output sink rejected
    pub sink_errors: u64,
    /// Switches from hardware to synthetic data
    pub fallbacks: u64,
    /// Quality intervals graded poor
    pub poor_quality_reports: u64,
    pub max_lateness_ms: f64,
    pub mean_lateness_ms: f64,
    /// Times synthetic pacing was re-anchored
    pub timing_resyncs: u64,
}

impl SessionSummary {
    /// Human-readable summary for the terminal.
    pub fn summary(&self) -> String {
        let connection = self
            .connection
            .map(|c| c.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "Session Summary ({}):\n\
             - Mode: {}\n\
             - Hardware connection: {}\n\
             - Duration: {:.1} seconds\n\
             - Samples processed: {}\n\
             - Signatures generated: {}\n\
             - Errors skipped: {} (parse {}, dropped windows {}, output {})\n\
             - Timing: max lateness {:.2} ms, mean {:.3} ms, {} resyncs",
            self.session_id,
            self.mode,
            connection,
            self.duration_seconds,
            self.samples_processed,
            self.signatures_generated,
            self.errors_skipped,
            self.parse_errors,
            self.windows_dropped,
            self.sink_errors,
            self.max_lateness_ms,
            self.mean_lateness_ms,
            self.timing_resyncs,
        )
    }

    /// Save the summary as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load a previously saved summary, if any.
    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let summary = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(summary))
    }
}
