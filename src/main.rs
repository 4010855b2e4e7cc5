//! Shuffle-Split Eval CLI
//!
//! Aggregates recorded batch results and validates experiment configurations.

use clap::{Parser, Subcommand, ValueEnum};
use shuffle_split_eval::report::per_sample_markdown;
use shuffle_split_eval::{ExperimentConfig, ExperimentReport, ExperimentResult};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shuffle-split-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate recorded batch results into experiment statistics
    Aggregate {
        /// JSON file holding the experiment (class lists and batches)
        #[arg(long)]
        batches: PathBuf,

        /// Experiment name shown in the report
        #[arg(long)]
        name: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Suppress confidence intervals (iterations were not independent)
        #[arg(long)]
        no_error_bars: bool,

        /// Number of ranked features to show
        #[arg(long, default_value = "15")]
        display: usize,
    },

    /// Show how consistently each sample was predicted across splits
    PerSample {
        /// JSON file holding the experiment (class lists and batches)
        #[arg(long)]
        batches: PathBuf,
    },

    /// Validate an experiment configuration against a feature space
    CheckConfig {
        /// YAML configuration file
        #[arg(long)]
        config: PathBuf,

        /// Number of features available in the dataset
        #[arg(long)]
        num_features: usize,
    },
}

fn load_experiment(path: &Path) -> anyhow::Result<ExperimentResult> {
    let content = std::fs::read_to_string(path)?;
    let experiment = serde_json::from_str(&content)?;
    Ok(experiment)
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Aggregate {
            batches,
            name,
            format,
            no_error_bars,
            display,
        } => {
            tracing::info!(path = %batches.display(), "Aggregating batch results");

            let mut experiment = match load_experiment(&batches) {
                Ok(experiment) => experiment,
                Err(e) => {
                    eprintln!("Failed to load batch results: {e}");
                    std::process::exit(1);
                }
            };
            if let Some(name) = name {
                experiment = experiment.with_name(name);
            }
            if no_error_bars {
                experiment = experiment.with_error_bars(false);
            }

            let report = match ExperimentReport::from_experiment(&mut experiment, display) {
                Ok(report) => report,
                Err(e) => {
                    eprintln!("Aggregation failed: {e}");
                    std::process::exit(1);
                }
            };

            match format {
                OutputFormat::Markdown => println!("{}", report.to_markdown()),
                OutputFormat::Json => match report.to_json() {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Failed to serialize report: {e}");
                        std::process::exit(1);
                    }
                },
            }
        }
        Commands::PerSample { batches } => {
            tracing::info!(path = %batches.display(), "Computing per-sample statistics");

            let report = load_experiment(&batches).and_then(|experiment| {
                experiment
                    .per_sample_statistics()
                    .map_err(anyhow::Error::from)
            });
            match report {
                Ok(report) => println!("{}", per_sample_markdown(&report)),
                Err(e) => {
                    eprintln!("Per-sample statistics failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::CheckConfig {
            config,
            num_features,
        } => {
            let loaded = match ExperimentConfig::load(&config) {
                Ok(loaded) => loaded,
                Err(e) => {
                    eprintln!("Failed to load configuration: {e}");
                    std::process::exit(1);
                }
            };

            match loaded.validate(num_features) {
                Ok(top_k) => {
                    println!("Configuration: {}", config.display());
                    println!("=================");
                    println!("Name: {}", loaded.name.as_deref().unwrap_or("(unnamed)"));
                    println!("Iterations: {}", loaded.iterations);
                    println!(
                        "Features: {top_k} of {num_features} ({})",
                        loaded.features_size
                    );
                    println!("Random state: {}", loaded.random_state);
                    println!(
                        "Confidence intervals: {}",
                        if loaded.random_state.use_error_bars() {
                            "enabled"
                        } else {
                            "disabled"
                        }
                    );
                }
                Err(e) => {
                    eprintln!("Invalid configuration: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}
