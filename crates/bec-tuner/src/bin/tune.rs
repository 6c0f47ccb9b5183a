use std::path::PathBuf;

use anyhow::{Context, Result};
use bec_optimizer::SeedMode;
use bec_tuner::{RunConfig, RunSummary};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Bayesian tuning of BEC experiment parameters",
    long_about = None
)]
struct Args {
    /// JSON run configuration. Built-in defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fixed random seed. Debug only: makes every proposal reproducible.
    #[arg(long)]
    seed: Option<u64>,

    /// Total number of trials
    #[arg(long)]
    calls: Option<usize>,

    /// Random trials before the surrogate model takes over
    #[arg(long)]
    initial_points: Option<usize>,

    /// Write the run summary with full history to this JSON file
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Print the default configuration as JSON and exit
    #[arg(long)]
    print_default_config: bool,
}

fn load_config(args: &Args) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.optimizer.seed = SeedMode::Fixed(seed);
    }
    if let Some(calls) = args.calls {
        config.optimizer.n_calls = calls;
    }
    if let Some(initial) = args.initial_points {
        config.optimizer.n_initial_points = initial;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if args.print_default_config {
        println!("{}", serde_json::to_string_pretty(&RunConfig::default())?);
        return Ok(());
    }

    let config = load_config(&args)?;
    let result = bec_tuner::run(&config).await.context("Tuning run failed")?;

    let summary = RunSummary::from(&result);
    println!("{summary}");

    if let Some(path) = &args.summary {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
    }
    Ok(())
}
