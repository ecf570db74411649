use std::path::PathBuf;

use clap::Parser;

use crate::config::{self, EvolutionParams};
use crate::dataset::PartitionSizes;

#[derive(Parser)]
#[command(name = "gsm-evolve")]
#[command(version = "0.3.0")]
#[command(about = "Evolutionary search over self-improving GSM8K question-answering agents")]
pub struct Args {
    /// GSM8K training split (JSONL with question/answer fields)
    #[arg(long, default_value = "data/train.jsonl")]
    pub train_file: PathBuf,

    /// GSM8K test split (JSONL with question/answer fields)
    #[arg(long, default_value = "data/test.jsonl")]
    pub test_file: PathBuf,

    /// Seed agent script (must define run_agent and a __main__ block)
    #[arg(long, default_value = "agents/agent_v0.py")]
    pub seed_agent: PathBuf,

    /// Directory where accepted child agents are persisted
    #[arg(long, default_value = "agents")]
    pub agents_dir: PathBuf,

    /// Directory that receives one telemetry subdirectory per run
    #[arg(long, default_value = "runs")]
    pub runs_dir: PathBuf,

    /// Evolution iteration budget T
    #[arg(long, short = 't', default_value_t = config::DEFAULT_ITERATIONS)]
    pub iterations: u32,

    /// Parents selected per iteration k (with replacement)
    #[arg(long, short = 'k', default_value_t = config::DEFAULT_PARENTS_PER_ITERATION)]
    pub parents: usize,

    /// Stop mining a parent once this many training failures are found
    #[arg(long, default_value_t = config::DEFAULT_MAX_FAILURES_PER_CHILD)]
    pub max_failures: usize,

    /// Successful examples sent to the developer for contrast
    #[arg(long, default_value_t = config::DEFAULT_SUCCESSES_TO_SEND)]
    pub successes: usize,

    /// The one model evolved agents may use internally
    #[arg(long, default_value = config::DEFAULT_TASK_MODEL)]
    pub task_model: String,

    /// Model that drives the developer agent itself
    #[arg(long, default_value = config::DEFAULT_META_MODEL)]
    pub meta_model: String,

    /// Selection sharpness λ; derived from the iteration budget when omitted
    #[arg(long)]
    pub lambda: Option<f64>,

    /// Selection sigmoid midpoint α0
    #[arg(long, default_value_t = config::DEFAULT_SIGMOID_ALPHA0)]
    pub alpha0: f64,

    /// Python interpreter used to run candidate agents
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// OpenAI-compatible API base URL
    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub api_base: String,

    /// Training subset size
    #[arg(long, default_value_t = 185)]
    pub train_size: usize,

    /// Validation subset size (carved from the training file)
    #[arg(long, default_value_t = 15)]
    pub validation_size: usize,

    /// Test subset size
    #[arg(long, default_value_t = 50)]
    pub test_size: usize,
}

impl Args {
    /// Evolution knobs, with λ derived from the iteration budget unless
    /// explicitly overridden.
    pub fn evolution_params(&self) -> EvolutionParams {
        EvolutionParams {
            iterations: self.iterations,
            parents_per_iteration: self.parents,
            max_failures_per_child: self.max_failures,
            successes_to_send: self.successes,
            sigmoid_lambda: self
                .lambda
                .unwrap_or_else(|| config::lambda_for_iterations(self.iterations)),
            sigmoid_alpha0: self.alpha0,
        }
    }

    pub fn partition_sizes(&self) -> PartitionSizes {
        PartitionSizes {
            train: self.train_size,
            validation: self.validation_size,
            test: self.test_size,
        }
    }
}
