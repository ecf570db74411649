//! # Stage: Telemetry Sink
//!
//! ## Responsibility
//! Post-hoc audit trail for the evolution loop: every selection decision,
//! every discard with its reason, every archive change.  Events are
//! (label, JSON payload) appends; the label doubles as the file name under
//! the run directory, so one run leaves behind `archive.log`,
//! `invalid_agents.log`, and friends.
//!
//! Telemetry is not required for correctness — a failed write is a warning,
//! never an error the loop can see.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Append-only event sink.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, label: &str, payload: serde_json::Value);
}

/// Writes each label's events as JSON lines under a run directory.
pub struct FileTelemetry {
    dir: PathBuf,
}

impl FileTelemetry {
    /// Create the sink, making the run directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

impl TelemetrySink for FileTelemetry {
    fn record(&self, label: &str, payload: serde_json::Value) {
        let path = self.dir.join(label);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "{}", payload));
        if let Err(e) = result {
            tracing::warn!(label, error = %e, "failed to write telemetry event");
        }
    }
}

/// Discards everything.  Default for tests.
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&self, _label: &str, _payload: serde_json::Value) {}
}
