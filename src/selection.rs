//! # Stage: Parent Selection
//!
//! ## Responsibility
//! Pick which archive members reproduce next.  Each eligible record gets the
//! weight
//!
//! ```text
//! w = sigmoid(λ · (score − α0)) · 1 / (1 + children_count)
//! ```
//!
//! The sigmoid factor biases selection toward higher scorers (sharpness λ,
//! midpoint α0); the second factor penalizes records that have already
//! produced many children, spreading exploration across lineages instead of
//! funneling every mutation attempt through one.
//!
//! ## Guarantees
//! - Read-only: selection returns indices into the archive and never mutates
//!   a record.
//! - Total: a non-empty archive always yields `k` parents — perfect scorers
//!   are excluded while imperfect ones exist, and an all-zero weight vector
//!   falls back to a uniform draw.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::archive::Archive;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Select `k` parent indices with replacement using the caller's RNG.
///
/// Eligibility prefers records with score < 1.0; when every record is
/// perfect, the whole archive becomes eligible.  An empty archive selects
/// nothing.
pub fn select_parents_with_rng<R: Rng>(
    archive: &Archive,
    k: usize,
    lambda: f64,
    alpha0: f64,
    rng: &mut R,
) -> Vec<usize> {
    if archive.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut eligible: Vec<usize> = archive
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.score < 1.0)
        .map(|(i, _)| i)
        .collect();

    if eligible.is_empty() {
        tracing::info!("all archive members are perfect, selecting from entire archive");
        eligible = (0..archive.len()).collect();
    }

    let weights: Vec<f64> = eligible
        .iter()
        .map(|&i| {
            let r = &archive.records()[i];
            sigmoid(lambda * (r.score - alpha0)) / (1.0 + f64::from(r.children_count))
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        // Sigmoid underflow can zero every weight; a uniform draw keeps the
        // loop making progress.
        return (0..k).map(|_| eligible[rng.gen_range(0..eligible.len())]).collect();
    }

    match WeightedIndex::new(&weights) {
        Ok(dist) => (0..k).map(|_| eligible[dist.sample(rng)]).collect(),
        Err(e) => {
            tracing::warn!(error = %e, "weighted sampling failed, falling back to uniform");
            (0..k).map(|_| eligible[rng.gen_range(0..eligible.len())]).collect()
        }
    }
}

/// [`select_parents_with_rng`] with the thread-local RNG.
pub fn select_parents(archive: &Archive, k: usize, lambda: f64, alpha0: f64) -> Vec<usize> {
    select_parents_with_rng(archive, k, lambda, alpha0, &mut rand::thread_rng())
}
