//! # Stage: Validation Gate
//!
//! ## Responsibility
//! Immune system for proposed mutations.  Every proposal runs through an
//! ordered sequence of structural checks on its raw source text *before* it
//! is ever persisted, loaded, or scored.
//!
//! Check pipeline (in order, short-circuiting on first failure):
//! 1. presence — an empty or whitespace-only proposal is rejected
//! 2. novelty — a proposal byte-identical to its parent (after whitespace
//!    trim) is rejected; no-op mutations are not useful population members
//! 3. model_policy — the proposal may not bind `model = "…"` to a
//!    vendor-prefixed literal (`gpt-…`, `claude-…`, `gemini-…`) other than
//!    the single task model sanctioned for this run
//!
//! The policy scan is textual and therefore heuristic: generated source is
//! untyped, and an obfuscated literal (string concat, format string) will
//! slip through.  That is an accepted limit of gating generated code, not a
//! bug to tighten here.
//!
//! ## Guarantees
//! - Pure: checking never executes or mutates the proposal.
//! - Auditable: a rejection names the specific check and carries a reason.

use once_cell::sync::Lazy;
use regex::Regex;

/// Vendor-prefixed model literal bound to a `model` configuration key.
static MODEL_BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)model\s*=\s*['"](gpt-[\w.-]+|claude-[\w.-]+|gemini-[\w.-]+)['"]"#).unwrap()
});

/// Outcome of one gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accepted,
    Rejected { check: &'static str, reason: String },
}

impl GateDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateDecision::Accepted)
    }

    /// Compact text for logs.
    pub fn summary(&self) -> String {
        match self {
            GateDecision::Accepted => "ACCEPT".to_string(),
            GateDecision::Rejected { check, reason } => {
                format!("REJECT[{}]: {}", check, reason)
            }
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// The validation gate.  Holds the one piece of run configuration the checks
/// need: the sanctioned task model.
pub struct ValidationGate {
    task_model: String,
}

impl ValidationGate {
    pub fn new(task_model: impl Into<String>) -> Self {
        Self { task_model: task_model.into() }
    }

    pub fn task_model(&self) -> &str {
        &self.task_model
    }

    /// Run all checks against `proposal`, given its parent's source text.
    pub fn check(&self, proposal: &str, parent_source: &str) -> GateDecision {
        // 1. presence
        if proposal.trim().is_empty() {
            return GateDecision::Rejected {
                check: "presence",
                reason: "proposal is empty".into(),
            };
        }

        // 2. novelty
        if proposal.trim() == parent_source.trim() {
            return GateDecision::Rejected {
                check: "novelty",
                reason: "proposal is identical to parent".into(),
            };
        }

        // 3. model policy
        for cap in MODEL_BINDING.captures_iter(proposal) {
            let found = cap[1].trim().to_string();
            if found != self.task_model.trim() {
                return GateDecision::Rejected {
                    check: "model_policy",
                    reason: format!(
                        "proposal binds model \"{}\", sanctioned model is \"{}\"",
                        found, self.task_model
                    ),
                };
            }
        }

        GateDecision::Accepted
    }
}
