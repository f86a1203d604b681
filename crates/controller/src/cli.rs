//! Command line entry point.

use anyhow::Result;
use clap::Parser;
use jouletune_artifacts::{ArtifactStore, RunPaths};
use jouletune_energy::EnergySampler;
use jouletune_llm::{backend_for, Evaluator, Generator};
use jouletune_regression::Validator;
use jouletune_suite::BenchmarkId;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::RunConfig;
use crate::controller::Controller;

/// Iteratively rewrites a benchmark program with an LLM, keeps only the
/// variants that stay correct, and tracks their measured energy.
#[derive(Parser, Debug)]
#[command(name = "jouletune", version, about)]
pub struct Cli {
    /// Benchmark to optimize, e.g. `nbody.gpp-8.c++`.
    pub benchmark: String,

    /// Generation model: `openai` for the hosted backend, or an Ollama
    /// model name for a local one.
    pub model: String,

    /// Directory containing `benchmarks/`, `out/` and `logs/`.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Successful optimizations to collect before stopping.
    #[arg(long, default_value_t = 5)]
    pub target_successes: u32,

    /// Hard cap on loop iterations.
    #[arg(long, default_value_t = 50)]
    pub max_iterations: u64,

    /// Write the final report even when the run aborts on a baseline
    /// failure.
    #[arg(long)]
    pub report_on_fatal: bool,

    /// Also write the run summary to this file as JSON.
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let id = BenchmarkId::parse(&cli.benchmark)?;
    let generation = backend_for(&cli.model)?;
    let evaluation = backend_for(&cli.model)?;
    info!(
        benchmark = %id,
        model = %generation.name(),
        root = %cli.root.display(),
        "starting optimization run"
    );

    let paths = RunPaths::new(&cli.root);
    let config = RunConfig {
        target_successes: cli.target_successes,
        max_iterations: cli.max_iterations,
        report_on_fatal: cli.report_on_fatal,
        ..RunConfig::default()
    };

    let mut controller = Controller::new(
        id,
        config,
        paths.clone(),
        ArtifactStore::new(&paths, &id),
        Generator::new(generation, &paths),
        Evaluator::new(evaluation, &paths),
        Validator::new(&paths, &id),
        EnergySampler::new(&paths, &id),
    );
    let summary = controller.run()?;

    if let Some(path) = &cli.summary {
        fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}
