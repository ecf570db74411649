//! # Stage: Evaluation Harness
//!
//! ## Responsibility
//! Judge candidates against labeled splits.  Two operations:
//!
//! - [`score`] — exact-match accuracy over a split, used on the validation
//!   split to rank archive members.
//! - [`mine_failures`] — capped, randomized search over the training split
//!   for samples the candidate gets wrong, producing the evidence the
//!   mutation proposer learns from.
//!
//! Both sides of every comparison go through [`extract_final_answer`], so the
//! reference answer and the candidate output are normalized identically.
//!
//! ## Guarantees
//! - Sample-granular fault tolerance: a candidate that raises on one question
//!   costs exactly that question (a non-success in `score`, a recorded
//!   failure in mining), never the surrounding evaluation.
//! - Mining shuffles fresh on every call, so repeated mining of the same
//!   parent samples different regions of the training split.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::candidate::CandidateRunner;
use crate::dataset::Sample;

/// Numeric run following the GSM8K terminal marker.
static MARKED_ANSWER: Lazy<Regex> = Lazy::new(|| Regex::new(r"####\s*([0-9,.]+)").unwrap());
/// Any numeric run, for the marker-less fallback.
static ANY_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9,.]+").unwrap());

/// Extract the final numeric answer from GSM8K-formatted text.
///
/// Takes the last numeric run after a `####` marker when one exists, else the
/// last numeric run anywhere in the text.  Comma thousands-separators are
/// stripped, as are trailing periods (interior decimal points survive, so
/// `"7.5"` stays `"7.5"` while `"3."` becomes `"3"`).  Returns the empty
/// string when the text contains no numeric run at all.
///
/// The marker-less fallback can pick up an incidental number; existing scored
/// baselines depend on that exact behavior, so it is preserved.
pub fn extract_final_answer(text: &str) -> String {
    let raw = MARKED_ANSWER
        .captures_iter(text)
        .last()
        .map(|c| c[1].to_string())
        .or_else(|| ANY_NUMBER.find_iter(text).last().map(|m| m.as_str().to_string()));

    match raw {
        Some(s) => s.replace(',', "").trim().trim_end_matches('.').to_string(),
        None => String::new(),
    }
}

/// Normalized-exact-match for one sample: equal after normalization and the
/// normalized reference is non-empty.
fn is_correct(agent_output: &str, reference: &str) -> bool {
    let reference_final = extract_final_answer(reference);
    !reference_final.is_empty() && extract_final_answer(agent_output) == reference_final
}

/// Accuracy of `runner` over `split`, in [0, 1].
///
/// An empty split scores 0.0.  A runner error on a sample counts as a
/// non-success and evaluation continues.
pub fn score(runner: &dyn CandidateRunner, split: &[Sample]) -> f64 {
    if split.is_empty() {
        return 0.0;
    }

    let mut successes = 0usize;
    for sample in split {
        match runner.run(&sample.question) {
            Ok(output) if is_correct(&output, &sample.answer) => successes += 1,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "runtime error during evaluation, counted as miss");
            }
        }
    }

    let accuracy = successes as f64 / split.len() as f64;
    tracing::info!(successes, total = split.len(), accuracy, "evaluation complete");
    accuracy
}

/// One mined training example: the question, the raw reference answer, and
/// what the candidate actually produced.  Consumed once by the mutation
/// proposer as evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinedExample {
    pub question: String,
    pub correct_answer: String,
    pub agent_output: String,
}

/// Walk `split` in a freshly shuffled order, classifying each sample until
/// `max_failures` failures have accumulated.
///
/// Every sample processed before the cap lands in one of the two lists; only
/// failures are capped.  A runner error is itself a failure — the error
/// detail becomes the observed output, so crashes reach the proposer as
/// training signal rather than vanishing.
pub fn mine_failures(
    runner: &dyn CandidateRunner,
    split: &[Sample],
    max_failures: usize,
) -> (Vec<MinedExample>, Vec<MinedExample>) {
    let mut failures = Vec::new();
    let mut successes = Vec::new();

    let mut order: Vec<&Sample> = split.iter().collect();
    order.shuffle(&mut rand::thread_rng());

    for sample in order {
        if failures.len() >= max_failures {
            tracing::debug!(max_failures, "failure budget reached, stopping mining");
            break;
        }

        match runner.run(&sample.question) {
            Ok(output) if is_correct(&output, &sample.answer) => {
                successes.push(MinedExample {
                    question: sample.question.clone(),
                    correct_answer: sample.answer.clone(),
                    agent_output: output,
                });
            }
            Ok(output) => {
                failures.push(MinedExample {
                    question: sample.question.clone(),
                    correct_answer: sample.answer.clone(),
                    agent_output: format!("Wrong Answer: {}", output),
                });
            }
            Err(e) => {
                failures.push(MinedExample {
                    question: sample.question.clone(),
                    correct_answer: sample.answer.clone(),
                    agent_output: format!("Runtime Error: {}", e),
                });
            }
        }
    }

    tracing::info!(
        failures = failures.len(),
        successes = successes.len(),
        "failure mining complete"
    );
    (failures, successes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvolveError;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::collections::HashMap;

    /// Answers each question from a fixed table; unknown questions raise.
    struct ScriptedRunner {
        answers: HashMap<String, String>,
    }

    impl ScriptedRunner {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self {
                answers: pairs.iter().map(|(q, a)| (q.to_string(), a.to_string())).collect(),
            }
        }
    }

    impl CandidateRunner for ScriptedRunner {
        fn run(&self, question: &str) -> crate::error::Result<String> {
            self.answers
                .get(question)
                .cloned()
                .ok_or_else(|| EvolveError::CandidateRun(format!("no script for {}", question)))
        }
    }

    fn sample(q: &str, a: &str) -> Sample {
        Sample { question: q.into(), answer: a.into() }
    }

    // -------------------------------------------------------------------
    // extract_final_answer
    // -------------------------------------------------------------------

    #[rstest]
    #[case("#### 1,234.", "1234")]
    #[case("#### 7.5", "7.5")]
    #[case("The answer is #### 3.", "3")]
    #[case("#### 2 then later #### 5", "5")]
    #[case("no marker but 12 apples and 42 pears", "42")]
    #[case("costs 1,000,000 dollars", "1000000")]
    #[case("no digits here at all", "")]
    #[case("", "")]
    #[case("trailing dots 9...", "9")]
    fn test_extract_final_answer(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(extract_final_answer(input), expected);
    }

    #[test]
    fn test_extract_punctuation_only_run_is_empty() {
        // The fallback run can match bare periods; normalization erases them.
        assert_eq!(extract_final_answer("wait..."), "");
    }

    proptest! {
        #[test]
        fn test_extract_is_idempotent(s in ".{0,80}") {
            let once = extract_final_answer(&s);
            prop_assert_eq!(extract_final_answer(&once), once);
        }
    }

    // -------------------------------------------------------------------
    // score
    // -------------------------------------------------------------------

    #[test]
    fn test_score_empty_split_is_zero() {
        let runner = ScriptedRunner::new(&[]);
        assert_eq!(score(&runner, &[]), 0.0);
    }

    #[test]
    fn test_score_counts_normalized_matches() {
        let runner = ScriptedRunner::new(&[("q1", "I think #### 1,234."), ("q2", "#### 9")]);
        let split = vec![sample("q1", "work #### 1234"), sample("q2", "work #### 8")];
        assert!((score(&runner, &split) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_runner_error_is_miss_not_abort() {
        let runner = ScriptedRunner::new(&[("q2", "#### 3")]);
        let split = vec![
            sample("q1", "#### 1"), // unknown to runner: raises
            sample("q2", "#### 3"),
        ];
        assert!((score(&runner, &split) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_score_empty_reference_never_matches() {
        // Reference with no digits normalizes to ""; even an identical output
        // must not count as a success.
        let runner = ScriptedRunner::new(&[("q", "none")]);
        let split = vec![sample("q", "none")];
        assert_eq!(score(&runner, &split), 0.0);
    }

    #[test]
    fn test_score_all_errors_is_zero() {
        let runner = ScriptedRunner::new(&[]);
        let split = vec![sample("q1", "#### 1"), sample("q2", "#### 2")];
        assert_eq!(score(&runner, &split), 0.0);
    }

    // -------------------------------------------------------------------
    // mine_failures
    // -------------------------------------------------------------------

    fn all_failing_split(n: usize) -> (ScriptedRunner, Vec<Sample>) {
        let split: Vec<Sample> =
            (0..n).map(|i| sample(&format!("q{}", i), &format!("#### {}", i))).collect();
        let runner = ScriptedRunner::new(
            &split
                .iter()
                .map(|s| (s.question.as_str(), "#### 999999"))
                .collect::<Vec<_>>(),
        );
        (runner, split)
    }

    #[test]
    fn test_mining_stops_at_failure_cap() {
        let (runner, split) = all_failing_split(10);
        let (failures, successes) = mine_failures(&runner, &split, 3);
        assert_eq!(failures.len(), 3);
        assert!(successes.is_empty());
        // Stopped early: only the capped prefix was processed.
        assert!(failures.len() + successes.len() < split.len());
    }

    #[test]
    fn test_mining_records_wrong_answers_with_raw_output() {
        let (runner, split) = all_failing_split(2);
        let (failures, _) = mine_failures(&runner, &split, 5);
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.agent_output.starts_with("Wrong Answer:")));
    }

    #[test]
    fn test_mining_records_runtime_errors_as_failures() {
        let runner = ScriptedRunner::new(&[]); // raises on everything
        let split = vec![sample("q1", "#### 1")];
        let (failures, successes) = mine_failures(&runner, &split, 5);
        assert_eq!(failures.len(), 1);
        assert!(successes.is_empty());
        assert!(failures[0].agent_output.starts_with("Runtime Error:"));
    }

    #[test]
    fn test_mining_successes_are_uncapped() {
        let split: Vec<Sample> =
            (0..8).map(|i| sample(&format!("q{}", i), &format!("#### {}", i))).collect();
        let pairs: Vec<(String, String)> =
            (0..8).map(|i| (format!("q{}", i), format!("#### {}", i))).collect();
        let runner = ScriptedRunner::new(
            &pairs.iter().map(|(q, a)| (q.as_str(), a.as_str())).collect::<Vec<_>>(),
        );
        let (failures, successes) = mine_failures(&runner, &split, 1);
        assert!(failures.is_empty());
        assert_eq!(successes.len(), 8);
    }

    #[test]
    fn test_mining_classifies_every_processed_sample() {
        let (runner, split) = all_failing_split(4);
        let (failures, successes) = mine_failures(&runner, &split, 10);
        assert_eq!(failures.len() + successes.len(), split.len());
    }
}
