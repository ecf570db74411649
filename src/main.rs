use std::env;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use gsm_evolve::{
    cli, dataset, eval, CandidateLoader, DeveloperAgent, EvolutionLoop, FileTelemetry,
    LoadOutcome, PythonProcessLoader, UsageStats,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = cli::Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(args: cli::Args) -> gsm_evolve::Result<()> {
    let api_key = match env::var("OPENAI_API_KEY") {
        Ok(k) if !k.is_empty() => k,
        _ => {
            eprintln!("{}", "OPENAI_API_KEY environment variable not set".red());
            std::process::exit(1);
        }
    };

    println!("{}", "=".repeat(52).cyan());
    println!("{}", "  gsm-evolve — evolutionary agent search".cyan().bold());
    println!("{}", "=".repeat(52).cyan());

    let dataset =
        dataset::load_and_partition(&args.train_file, &args.test_file, args.partition_sizes())?;

    let run_stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let telemetry = FileTelemetry::new(args.runs_dir.join(format!("run_{}", run_stamp)))?;
    println!("telemetry: {}", telemetry.dir().display().to_string().dimmed());

    let usage = Arc::new(Mutex::new(UsageStats::default()));
    let proposer =
        DeveloperAgent::new(&args.api_base, api_key, &args.meta_model, Arc::clone(&usage));
    let loader = PythonProcessLoader::new(&args.python);

    let mut evolution = EvolutionLoop::new(
        args.evolution_params(),
        &args.task_model,
        &args.agents_dir,
        &loader,
        &proposer,
        &telemetry,
    );
    let best = evolution.run(&args.seed_agent, &dataset).await?;

    println!();
    println!(
        "best agent: {} (parent: {}) — validation score {:.4}",
        best.id.green().bold(),
        best.parent_id.as_deref().unwrap_or("-"),
        best.score,
    );

    // Held-out check of the winner; a load failure here only skips the report.
    match loader.load(&best.path, &best.id) {
        LoadOutcome::Loaded(runner) => {
            let test_score = eval::score(runner.as_ref(), &dataset.test);
            println!("test score:  {:.4} ({} samples)", test_score, dataset.test.len());
        }
        LoadOutcome::Failed { detail } => {
            tracing::warn!(detail = %detail, "best agent could not be reloaded for test scoring");
        }
    }

    if let Ok(usage) = usage.lock() {
        println!("{}", format!("meta-model usage — {}", usage.summary()).dimmed());
    }

    Ok(())
}
