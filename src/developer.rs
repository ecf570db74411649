//! # Stage: Mutation Proposer ("developer agent")
//!
//! ## Responsibility
//! Turn a parent agent plus mined evidence into replacement source text.
//! The production implementation asks an OpenAI-compatible chat-completions
//! endpoint (driven by the *meta* model) to rewrite the parent, given its
//! failures and a few contrastive successes, while pinning the child's
//! internal model to the sanctioned *task* model.
//!
//! ## Guarantees
//! - Allowed to fail: any API error, missing content, or transport problem
//!   returns `None` — the loop records a discard and moves on.  Nothing in
//!   this module aborts a run.
//! - Accounted: every call's token usage is folded into an injected
//!   [`UsageStats`], summarized read-only at run end.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::token_prices;
use crate::eval::MinedExample;

/// Everything the proposer needs for one mutation attempt.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    /// Version id of the parent being evolved (for the prompt only).
    pub parent_id: String,
    /// The parent's full source text.
    pub parent_source: String,
    /// Mined failing examples (the signal to fix).
    pub failures: Vec<MinedExample>,
    /// Bounded successful examples (contrastive context).
    pub successes: Vec<MinedExample>,
    /// The one model the child is allowed to use internally.
    pub task_model: String,
}

/// Proposer seam.  Tests inject scripted proposers; production wires in
/// [`DeveloperAgent`].
#[async_trait]
pub trait MutationProposer: Send + Sync {
    /// Returns replacement source text, or `None` when the proposer failed.
    async fn propose(&self, request: &MutationRequest) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Token / cost accounting
// ---------------------------------------------------------------------------

/// Cumulative meta-model API usage for one run.  Injected into the proposer
/// at construction, read once at run end.
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl UsageStats {
    pub fn record(&mut self, model: &str, prompt_tokens: u64, completion_tokens: u64) {
        let (prompt_price, completion_price) = token_prices(model);
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
        self.cost_usd +=
            prompt_tokens as f64 * prompt_price + completion_tokens as f64 * completion_price;
    }

    pub fn summary(&self) -> String {
        format!(
            "prompt tokens: {} | completion tokens: {} | estimated cost: ${:.6}",
            self.prompt_tokens, self.completion_tokens, self.cost_usd
        )
    }
}

// ---------------------------------------------------------------------------
// Markdown fence stripping
// ---------------------------------------------------------------------------

static PYTHON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```python\s*(.+?)\s*```").unwrap());
static BARE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```\s*(.+?)\s*```").unwrap());

/// Extract code from a reply that may or may not be fenced.  Models are told
/// to return raw code, but they fence it anyway often enough that stripping
/// here is cheaper than re-prompting.
pub fn clean_generated_code(reply: &str) -> String {
    if let Some(cap) = PYTHON_FENCE.captures(reply) {
        return cap[1].trim().to_string();
    }
    if let Some(cap) = BARE_FENCE.captures(reply) {
        return cap[1].trim().to_string();
    }
    reply.trim().to_string()
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

// ---------------------------------------------------------------------------
// DeveloperAgent
// ---------------------------------------------------------------------------

/// Production proposer backed by an OpenAI-compatible endpoint.
pub struct DeveloperAgent {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    /// Model that drives the rewriting itself (not the child's model).
    meta_model: String,
    usage: Arc<Mutex<UsageStats>>,
}

impl DeveloperAgent {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        meta_model: impl Into<String>,
        usage: Arc<Mutex<UsageStats>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            meta_model: meta_model.into(),
            usage,
        }
    }
}

fn render_examples(examples: &[MinedExample]) -> String {
    examples
        .iter()
        .map(|e| {
            format!(
                "- Q: {}\n  A (Correct): {}\n  A (Agent): {}\n",
                e.question, e.correct_answer, e.agent_output
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt(request: &MutationRequest) -> String {
    format!(
        "You are an elite Python programmer specializing in LLM agents.\n\
         Analyze, debug, and SUBSTANTIALLY IMPROVE an existing agent's code \
         (version {id}).\n\n\
         CRITICAL GOAL: YOU MUST PROPOSE CHANGES. Returning the same code is a \
         failure and will be discarded.\n\
         Update the agent's system prompt so it thinks step-by-step, uses its \
         tools for all calculations, uses tool results instead of re-calling \
         tools, and ends its final response with the format: #### <number>.\n\n\
         CRITICAL INSTRUCTIONS:\n\
         1. Your ENTIRE response MUST be the raw, complete Python code. No \
         explanations, no markdown, no ``` fences.\n\
         2. The script MUST preserve the function: def run_agent(question: str) -> str:\n\
         3. The script MUST preserve the standalone `if __name__ == \"__main__\":` block.\n\
         4. The agent's internal LLM MUST be model=\"{task_model}\".",
        id = request.parent_id,
        task_model = request.task_model,
    )
}

fn user_prompt(request: &MutationRequest) -> String {
    let success_report = if request.successes.is_empty() {
        "No successful examples were provided for reference.".to_string()
    } else {
        render_examples(&request.successes)
    };
    format!(
        "### AGENT CODE ({id}) ###\n{code}\n\n\
         ### ANALYSIS REPORT ###\n\
         Failed examples from the training set:\n{failures}\n\n\
         Successful examples (for reference):\n{successes}\n\n\
         ### YOUR TASK ###\n\
         Generate the complete raw Python code for the next version that fixes \
         these failures. Preserve run_agent and the __main__ block, and keep \
         the internal model set to model=\"{task_model}\".",
        id = request.parent_id,
        code = request.parent_source,
        failures = render_examples(&request.failures),
        successes = success_report,
        task_model = request.task_model,
    )
}

#[async_trait]
impl MutationProposer for DeveloperAgent {
    async fn propose(&self, request: &MutationRequest) -> Option<String> {
        tracing::info!(
            parent = %request.parent_id,
            meta_model = %self.meta_model,
            failures = request.failures.len(),
            successes = request.successes.len(),
            "calling developer agent"
        );

        let body = ChatRequest {
            model: self.meta_model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system_prompt(request) },
                ChatMessage { role: "user", content: user_prompt(request) },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "developer agent API call failed");
                return None;
            }
        };

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "developer agent returned unparseable body");
                return None;
            }
        };

        if let (Some(usage), Ok(mut stats)) = (parsed.usage, self.usage.lock()) {
            stats.record(&self.meta_model, usage.prompt_tokens, usage.completion_tokens);
        }

        let content = parsed.choices.into_iter().next().and_then(|c| c.message.content)?;
        Some(clean_generated_code(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn example(q: &str, correct: &str, got: &str) -> MinedExample {
        MinedExample {
            question: q.into(),
            correct_answer: correct.into(),
            agent_output: got.into(),
        }
    }

    fn request() -> MutationRequest {
        MutationRequest {
            parent_id: "v3".into(),
            parent_source: "def run_agent(q):\n    return ''\n".into(),
            failures: vec![example("q1", "#### 4", "Wrong Answer: #### 5")],
            successes: vec![],
            task_model: "gpt-4o-mini".into(),
        }
    }

    // -------------------------------------------------------------------
    // clean_generated_code
    // -------------------------------------------------------------------

    #[rstest]
    #[case("```python\nx = 1\n```", "x = 1")]
    #[case("```\nx = 1\n```", "x = 1")]
    #[case("  x = 1\n", "x = 1")]
    #[case("prose\n```python\nx = 1\n```\nmore prose", "x = 1")]
    fn test_clean_generated_code(#[case] reply: &str, #[case] expected: &str) {
        assert_eq!(clean_generated_code(reply), expected);
    }

    #[test]
    fn test_clean_prefers_python_fence_over_bare() {
        let reply = "```\nnot code\n```\n```python\nreal = True\n```";
        assert_eq!(clean_generated_code(reply), "real = True");
    }

    #[test]
    fn test_clean_empty_reply_stays_empty() {
        assert_eq!(clean_generated_code("   "), "");
    }

    // -------------------------------------------------------------------
    // UsageStats
    // -------------------------------------------------------------------

    #[test]
    fn test_usage_accumulates_across_calls() {
        let mut u = UsageStats::default();
        u.record("gpt-4o", 1000, 500);
        u.record("gpt-4o", 1000, 500);
        assert_eq!(u.prompt_tokens, 2000);
        assert_eq!(u.completion_tokens, 1000);
        assert!(u.cost_usd > 0.0);
    }

    #[test]
    fn test_usage_unknown_model_costs_nothing() {
        let mut u = UsageStats::default();
        u.record("mystery-model", 1_000_000, 1_000_000);
        assert_eq!(u.cost_usd, 0.0);
    }

    #[test]
    fn test_usage_summary_mentions_cost() {
        let mut u = UsageStats::default();
        u.record("gpt-4o-mini", 100, 100);
        assert!(u.summary().contains('$'));
    }

    // -------------------------------------------------------------------
    // Prompt construction
    // -------------------------------------------------------------------

    #[test]
    fn test_system_prompt_pins_task_model() {
        let p = system_prompt(&request());
        assert!(p.contains("model=\"gpt-4o-mini\""));
        assert!(p.contains("run_agent"));
    }

    #[test]
    fn test_user_prompt_carries_failures_and_source() {
        let p = user_prompt(&request());
        assert!(p.contains("Wrong Answer: #### 5"));
        assert!(p.contains("def run_agent"));
    }

    #[test]
    fn test_user_prompt_notes_missing_successes() {
        let p = user_prompt(&request());
        assert!(p.contains("No successful examples"));
    }
}
