//! The `convirt config` command for configuration management.

use clap::{Args, Subcommand};
use convirt_core::{Checkpoint, Config, DatasetSpec};

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Check that the configured checkpoint and dataset are in place
    Check,
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::load()?;
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();

            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let config = Config::default();
            std::fs::write(&path, config.to_toml()?)?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }

        ConfigCommand::Check => {
            let config = Config::load()?;
            let problems = check(&config);
            if problems.is_empty() {
                println!("Configuration OK");
            } else {
                for problem in &problems {
                    println!("  - {problem}");
                }
                anyhow::bail!("{} problem(s) found", problems.len());
            }
        }
    }

    Ok(())
}

/// Describe every missing checkpoint file or dataset manifest.
fn check(config: &Config) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = Checkpoint::open(&config.checkpoint_dir()) {
        problems.push(e.to_string());
    }

    match DatasetSpec::find(&config.evaluation.dataset) {
        Ok(spec) => {
            let manifest = config.data_dir().join(format!("{}-meta.csv", spec.name));
            if !manifest.exists() {
                problems.push(format!("Dataset manifest not found: {}", manifest.display()));
            }
        }
        Err(e) => problems.push(e.to_string()),
    }

    problems
}
