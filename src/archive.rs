//! # Stage: Archive
//!
//! ## Responsibility
//! The population record: every agent version that survived validation,
//! loading, and scoring, in creation order, with score and lineage.
//!
//! ## Guarantees
//! - Append-only: records are never removed; a record's id, score, and parent
//!   never change after insertion.  The single exception is `children_count`,
//!   bumped in place each time a child of that record is accepted.
//! - Lineage is a forest rooted at the seed: every non-seed record's parent
//!   id names an earlier record.

use std::path::PathBuf;

use serde::Serialize;

/// One archived agent version.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRecord {
    /// Unique, monotonically assigned version id (`v0`, `v1`, …).
    pub id: String,
    /// Where this version's source artifact lives on disk.
    pub path: PathBuf,
    /// Validation-split accuracy in [0, 1], fixed at insertion.
    pub score: f64,
    /// How many accepted children this record has produced.
    pub children_count: u32,
    /// Parent version id; `None` only for the seed.
    pub parent_id: Option<String>,
}

/// Ordered, append-only collection of [`AgentRecord`]s.  Exclusively owned
/// and written by the evolution loop; selection and reporting only read.
#[derive(Debug, Default)]
pub struct Archive {
    records: Vec<AgentRecord>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.  Ids come from the loop's monotone version counter,
    /// so a duplicate here is a logic error.
    pub fn push(&mut self, record: AgentRecord) {
        debug_assert!(
            !self.records.iter().any(|r| r.id == record.id),
            "duplicate version id {}",
            record.id
        );
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&AgentRecord> {
        self.records.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut AgentRecord> {
        self.records.get_mut(idx)
    }

    pub fn records(&self) -> &[AgentRecord] {
        &self.records
    }

    /// Records sorted by score descending; stable, so ties keep creation
    /// order (an older record wins over an equally scored newer one).
    pub fn sorted_by_score(&self) -> Vec<&AgentRecord> {
        let mut sorted: Vec<&AgentRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
        sorted
    }

    /// The best-scoring record, if any.
    pub fn best(&self) -> Option<&AgentRecord> {
        self.sorted_by_score().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: f64, parent: Option<&str>) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            path: PathBuf::from(format!("agents/{}.py", id)),
            score,
            children_count: 0,
            parent_id: parent.map(|p| p.to_string()),
        }
    }

    #[test]
    fn test_empty_archive_has_no_best() {
        assert!(Archive::new().best().is_none());
    }

    #[test]
    fn test_best_is_highest_score() {
        let mut a = Archive::new();
        a.push(record("v0", 0.2, None));
        a.push(record("v1", 0.6, Some("v0")));
        a.push(record("v2", 0.4, Some("v0")));
        assert_eq!(a.best().unwrap().id, "v1");
    }

    #[test]
    fn test_best_tie_prefers_older_record() {
        let mut a = Archive::new();
        a.push(record("v0", 0.5, None));
        a.push(record("v1", 0.5, Some("v0")));
        assert_eq!(a.best().unwrap().id, "v0");
    }

    #[test]
    fn test_sorted_by_score_is_descending() {
        let mut a = Archive::new();
        a.push(record("v0", 0.1, None));
        a.push(record("v1", 0.9, Some("v0")));
        a.push(record("v2", 0.5, Some("v0")));
        let ids: Vec<&str> = a.sorted_by_score().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v2", "v0"]);
    }

    #[test]
    fn test_children_count_mutable_in_place() {
        let mut a = Archive::new();
        a.push(record("v0", 0.2, None));
        a.get_mut(0).unwrap().children_count += 1;
        assert_eq!(a.get(0).unwrap().children_count, 1);
    }
}
