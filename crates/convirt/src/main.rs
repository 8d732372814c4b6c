//! ConVIRT CLI - Zero-shot evaluation of medical image/text encoders.
//!
//! Scores a benchmark split of chest radiographs against generated class
//! prompts and reports accuracy over repeated prompt-sampling trials.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate on MIMIC 5x200 with CheXpert templates (5 trials, seed 42)
//! convirt evaluate --dataset mimic-5x200
//!
//! # COVID split with report sentences for the normal class
//! convirt evaluate --dataset covid19-test --prompts covid --sentences mimic-sentence-label.csv
//!
//! # Inspect the prompts a seed produces
//! convirt prompts --seed 7
//!
//! # View configuration
//! convirt config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// ConVIRT - Zero-shot evaluation of medical image/text encoders.
#[derive(Parser, Debug)]
#[command(name = "convirt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run zero-shot classification trials on a benchmark split
    Evaluate(cli::evaluate::EvaluateArgs),

    /// Generate and print one prompt set
    Prompts(cli::prompts::PromptsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match convirt_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `convirt config path`."
            );
            convirt_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("ConVIRT v{}", convirt_core::VERSION);

    match cli.command {
        Commands::Evaluate(args) => cli::evaluate::execute(args).await,
        Commands::Prompts(args) => cli::prompts::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
