//! # Stage: Evolution Loop
//!
//! ## Responsibility
//! The orchestrator.  Owns the archive for the run's duration and drives
//! iterations: select parents → mine each parent's training failures →
//! request a mutation from the developer → gate the proposal → persist and
//! load the child → score it → archive or discard.
//!
//! ## Guarantees
//! - One fatal error only: the seed agent failing to load or score.  Every
//!   other failure is absorbed where it happens — a skipped parent, a logged
//!   discard — and the run always completes with a best-known result.
//! - Sequential: one mutation attempt runs to completion before the next
//!   begins; the archive is never written concurrently.
//! - Version ids are never reused: the counter advances for every attempted
//!   child, including ones the gate or loader discards.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::archive::{AgentRecord, Archive};
use crate::candidate::{CandidateLoader, LoadOutcome};
use crate::config::EvolutionParams;
use crate::dataset::Dataset;
use crate::developer::{MutationProposer, MutationRequest};
use crate::error::{EvolveError, Result};
use crate::eval::{mine_failures, score};
use crate::gate::{GateDecision, ValidationGate};
use crate::selection::select_parents;
use crate::telemetry::TelemetrySink;

/// Archive log label; one JSON line per accepted record.
const ARCHIVE_LOG: &str = "archive.log";
/// Discard log label; one JSON line per rejected attempt, with reason.
const INVALID_LOG: &str = "invalid_agents.log";
/// Iteration-level decisions (selections, skips).
const EVOLUTION_LOG: &str = "evolution.log";

pub struct EvolutionLoop<'a> {
    params: EvolutionParams,
    /// Directory where accepted child artifacts are persisted.
    agents_dir: PathBuf,
    gate: ValidationGate,
    loader: &'a dyn CandidateLoader,
    proposer: &'a dyn MutationProposer,
    telemetry: &'a dyn TelemetrySink,
    archive: Archive,
    /// Monotone version counter.  Advances per attempted child, accepted or
    /// not, so discarded attempts still consume their id.
    version_counter: u32,
}

impl<'a> EvolutionLoop<'a> {
    pub fn new(
        params: EvolutionParams,
        task_model: impl Into<String>,
        agents_dir: &Path,
        loader: &'a dyn CandidateLoader,
        proposer: &'a dyn MutationProposer,
        telemetry: &'a dyn TelemetrySink,
    ) -> Self {
        Self {
            params,
            agents_dir: agents_dir.to_path_buf(),
            gate: ValidationGate::new(task_model),
            loader,
            proposer,
            telemetry,
            archive: Archive::new(),
            version_counter: 0,
        }
    }

    /// Read access to the population record (for reporting and tests).
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Run the full evolution: seed init, `T` iterations, best-record report.
    ///
    /// Only seed initialization can fail; the returned record is the
    /// best-scoring archive member (the seed itself when no mutation ever
    /// survived).
    pub async fn run(&mut self, seed_path: &Path, dataset: &Dataset) -> Result<AgentRecord> {
        self.init_seed(seed_path, dataset)?;

        for iteration in 1..=self.params.iterations {
            let parents = select_parents(
                &self.archive,
                self.params.parents_per_iteration,
                self.params.sigmoid_lambda,
                self.params.sigmoid_alpha0,
            );

            if parents.is_empty() {
                tracing::info!(iteration, "no parents selectable, ending evolution early");
                break;
            }

            let parent_ids: Vec<&str> =
                parents.iter().filter_map(|&i| self.archive.get(i)).map(|r| r.id.as_str()).collect();
            tracing::info!(iteration, total = self.params.iterations, parents = ?parent_ids, "iteration start");
            self.telemetry.record(
                EVOLUTION_LOG,
                json!({ "iteration": iteration, "selected_parents": parent_ids }),
            );

            for parent_idx in parents {
                self.attempt_child(parent_idx, dataset).await;
            }
        }

        let sorted: Vec<&AgentRecord> = self.archive.sorted_by_score();
        self.telemetry.record(
            "archive_final.json",
            serde_json::to_value(&sorted).unwrap_or_default(),
        );
        for (rank, record) in sorted.iter().enumerate() {
            tracing::info!(
                rank = rank + 1,
                id = %record.id,
                parent = record.parent_id.as_deref().unwrap_or("-"),
                score = record.score,
                children = record.children_count,
                "final archive"
            );
        }

        // The seed is always present, so best() cannot be empty here.
        self.archive
            .best()
            .cloned()
            .ok_or_else(|| EvolveError::SeedInit("archive empty after run".into()))
    }

    /// Load and score the seed agent as `v0`.  The only fatal path in a run.
    fn init_seed(&mut self, seed_path: &Path, dataset: &Dataset) -> Result<()> {
        let runner = match self.loader.load(seed_path, "v0") {
            LoadOutcome::Loaded(r) => r,
            LoadOutcome::Failed { detail } => return Err(EvolveError::SeedInit(detail)),
        };

        let seed_score = score(runner.as_ref(), &dataset.validation);
        tracing::info!(score = seed_score, "seed agent v0 initialized");

        let record = AgentRecord {
            id: "v0".to_string(),
            path: seed_path.to_path_buf(),
            score: seed_score,
            children_count: 0,
            parent_id: None,
        };
        self.telemetry.record(ARCHIVE_LOG, json!(record));
        self.archive.push(record);
        Ok(())
    }

    /// One parent's mutation attempt, end to end.  Every failure past this
    /// point is absorbed: logged, telemetered, and dropped.
    async fn attempt_child(&mut self, parent_idx: usize, dataset: &Dataset) {
        let (parent_id, parent_path, parent_score) = match self.archive.get(parent_idx) {
            Some(p) => (p.id.clone(), p.path.clone(), p.score),
            None => return,
        };
        tracing::info!(parent = %parent_id, score = parent_score, "processing parent");

        // Fresh instance per attempt; the archive's record of the parent is
        // metadata, not a live runner.
        let parent_runner = match self.loader.load(&parent_path, &parent_id) {
            LoadOutcome::Loaded(r) => r,
            LoadOutcome::Failed { detail } => {
                tracing::warn!(parent = %parent_id, detail = %detail, "could not reload parent, skipping");
                return;
            }
        };

        let (failures, mut successes) = mine_failures(
            parent_runner.as_ref(),
            &dataset.train,
            self.params.max_failures_per_child,
        );

        if failures.is_empty() {
            // Nothing to fix: a legitimate no-signal outcome, not an error.
            tracing::info!(parent = %parent_id, "no training failures, skipping parent");
            self.telemetry.record(
                EVOLUTION_LOG,
                json!({ "parent": parent_id, "skipped": "no training failures" }),
            );
            return;
        }
        successes.truncate(self.params.successes_to_send);

        let parent_source = match std::fs::read_to_string(&parent_path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(parent = %parent_id, error = %e, "could not read parent source, skipping");
                return;
            }
        };

        let request = MutationRequest {
            parent_id: parent_id.clone(),
            parent_source: parent_source.clone(),
            failures: failures.clone(),
            successes: successes.clone(),
            task_model: self.gate.task_model().to_string(),
        };

        let proposal = match self.proposer.propose(&request).await {
            Some(p) => p,
            None => {
                tracing::warn!(parent = %parent_id, "developer produced no code, child discarded");
                self.telemetry.record(
                    INVALID_LOG,
                    json!({ "parent": parent_id, "reason": "proposer returned no code" }),
                );
                return;
            }
        };

        // Every attempted child consumes an id, even if it is about to be
        // rejected.
        self.version_counter += 1;
        let child_id = format!("v{}", self.version_counter);

        if let GateDecision::Rejected { check, reason } = self.gate.check(&proposal, &parent_source)
        {
            tracing::warn!(child = %child_id, parent = %parent_id, check, reason = %reason, "gate rejected child");
            self.telemetry.record(
                INVALID_LOG,
                json!({ "child": child_id, "parent": parent_id, "check": check, "reason": reason }),
            );
            return;
        }

        let child_path = self.agents_dir.join(format!("agent_{}.py", child_id));
        if let Err(e) = std::fs::create_dir_all(&self.agents_dir)
            .and_then(|_| std::fs::write(&child_path, &proposal))
        {
            tracing::warn!(child = %child_id, error = %e, "could not persist child artifact");
            return;
        }

        // Evidence trail: what this child was asked to fix.
        self.telemetry.record(
            &format!("child_{}_generation.json", child_id),
            json!({
                "child_id": child_id,
                "parent_id": parent_id,
                "failures_sent": failures,
                "successes_sent": successes,
            }),
        );

        let child_runner = match self.loader.load(&child_path, &child_id) {
            LoadOutcome::Loaded(r) => r,
            LoadOutcome::Failed { detail } => {
                tracing::warn!(child = %child_id, detail = %detail, "child not functional, discarded");
                self.telemetry.record(
                    INVALID_LOG,
                    json!({ "child": child_id, "parent": parent_id, "reason": format!("load failed: {}", detail) }),
                );
                // A discarded child leaves no artifact behind.
                let _ = std::fs::remove_file(&child_path);
                return;
            }
        };

        if let Some(parent) = self.archive.get_mut(parent_idx) {
            parent.children_count += 1;
        }

        let child_score = score(child_runner.as_ref(), &dataset.validation);
        let record = AgentRecord {
            id: child_id.clone(),
            path: child_path,
            score: child_score,
            children_count: 0,
            parent_id: Some(parent_id),
        };
        tracing::info!(child = %child_id, score = child_score, "child accepted into archive");
        self.telemetry.record(ARCHIVE_LOG, json!(record));
        self.archive.push(record);
    }
}
