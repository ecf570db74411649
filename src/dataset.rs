//! # Stage: Dataset Provider
//!
//! ## Responsibility
//! Load GSM8K-style JSONL files and partition them into the three disjoint
//! splits the loop consumes: train (failure mining), validation (scoring),
//! test (held out for final reporting).
//!
//! Answers follow the GSM8K convention: free-form reasoning terminated by a
//! `#### <number>` marker.  This module does not interpret answers — that is
//! the evaluation harness's job — it only carries them.
//!
//! ## Guarantees
//! - Deterministic: partitioning shuffles with a fixed seed, so the same
//!   input files always yield the same splits.
//! - Disjoint: validation is carved from the tail of the train subset, test
//!   comes from the separate test file.
//! - Fail-fast: a missing file or malformed line is a setup error surfaced
//!   before the evolution loop starts.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{EvolveError, Result};

/// Seed for the partition shuffle.  Fixed so runs are comparable.
const PARTITION_SEED: u64 = 42;

/// One (question, reference-answer) pair.  Read-only once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sample {
    pub question: String,
    pub answer: String,
}

/// The three disjoint splits the loop works against.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Split sizes for [`load_and_partition`].
#[derive(Debug, Clone, Copy)]
pub struct PartitionSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

impl Default for PartitionSizes {
    fn default() -> Self {
        // Small fixed subsets for rapid evolution runs.
        Self { train: 185, validation: 15, test: 50 }
    }
}

/// Read one JSONL file of samples.
pub fn read_jsonl(path: &Path) -> Result<Vec<Sample>> {
    let file = File::open(path).map_err(|e| EvolveError::Dataset {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut samples = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: Sample = serde_json::from_str(&line).map_err(|e| EvolveError::Dataset {
            path: path.to_path_buf(),
            detail: format!("line {}: {}", lineno + 1, e),
        })?;
        samples.push(sample);
    }
    Ok(samples)
}

/// Load the train and test files, shuffle deterministically, and carve out
/// the three working splits.  Validation samples come from the train file,
/// immediately after the train subset, so they never overlap.
pub fn load_and_partition(
    train_path: &Path,
    test_path: &Path,
    sizes: PartitionSizes,
) -> Result<Dataset> {
    let mut train_full = read_jsonl(train_path)?;
    let mut test_full = read_jsonl(test_path)?;

    let needed = sizes.train + sizes.validation;
    if train_full.len() < needed {
        return Err(EvolveError::Dataset {
            path: train_path.to_path_buf(),
            detail: format!(
                "needs {} samples for train+validation, file has {}",
                needed,
                train_full.len()
            ),
        });
    }

    let mut rng = StdRng::seed_from_u64(PARTITION_SEED);
    train_full.shuffle(&mut rng);
    test_full.shuffle(&mut rng);

    let validation = train_full[sizes.train..needed].to_vec();
    train_full.truncate(sizes.train);
    test_full.truncate(sizes.test.min(test_full.len()));

    tracing::info!(
        train = train_full.len(),
        validation = validation.len(),
        test = test_full.len(),
        "dataset partitioned"
    );

    Ok(Dataset { train: train_full, validation, test: test_full })
}
