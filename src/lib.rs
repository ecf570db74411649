//! Evolutionary search over self-improving GSM8K question-answering agents.
//!
//! The crate maintains an archive of agent versions (generated Python
//! scripts), repeatedly selects promising parents by a sigmoid-fitness /
//! novelty weight, mines their training failures, asks an LLM "developer"
//! to rewrite them, gates the proposal with textual checks, then loads,
//! scores, and archives the survivors.
//!
//! Module map, leaf to root:
//! - [`dataset`] — GSM8K JSONL loading and split partitioning
//! - [`candidate`] — the plugin boundary: load a generated script, run it
//! - [`eval`] — scoring, answer normalization, failure mining
//! - [`gate`] — pre-execution checks on proposed mutations
//! - [`archive`] / [`selection`] — the population record and who reproduces
//! - [`developer`] — the external mutation proposer
//! - [`evolution`] — the loop that ties it all together

pub mod archive;
pub mod candidate;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod developer;
pub mod error;
pub mod eval;
pub mod evolution;
pub mod gate;
pub mod selection;
pub mod telemetry;

pub use archive::{AgentRecord, Archive};
pub use candidate::{CandidateLoader, CandidateRunner, LoadOutcome, PythonProcessLoader};
pub use config::EvolutionParams;
pub use dataset::{Dataset, Sample};
pub use developer::{DeveloperAgent, MutationProposer, MutationRequest, UsageStats};
pub use error::{EvolveError, Result};
pub use eval::{extract_final_answer, mine_failures, score, MinedExample};
pub use evolution::EvolutionLoop;
pub use gate::{GateDecision, ValidationGate};
pub use selection::{select_parents, select_parents_with_rng};
pub use telemetry::{FileTelemetry, NullTelemetry, TelemetrySink};
