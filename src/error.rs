//! Crate-level error type.
//!
//! Only one failure in the whole system is fatal to a run: the seed agent
//! failing to load or score ([`EvolveError::SeedInit`]).  Everything else is
//! absorbed at the layer that detects it — a bad sample becomes a non-success,
//! a bad mutation becomes a logged discard — so these variants mostly surface
//! during setup (dataset files, run directory) rather than mid-loop.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    /// The seed agent could not be loaded or did not expose `run_agent`.
    /// This aborts the run; there is nothing to evolve from.
    #[error("seed agent failed to initialize: {0}")]
    SeedInit(String),

    /// A candidate's `run` raised instead of returning a string.  Callers in
    /// the evaluation harness catch this per-sample; it never propagates past
    /// a single question.
    #[error("candidate run failed: {0}")]
    CandidateRun(String),

    /// Dataset file missing, unreadable, or malformed.  Surfaced before the
    /// loop starts.
    #[error("dataset error in {}: {detail}", .path.display())]
    Dataset { path: PathBuf, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, EvolveError>;
