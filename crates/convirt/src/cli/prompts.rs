//! The `convirt prompts` command, plus prompt options shared with `evaluate`.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use convirt_core::config::{expand, PromptsConfig};
use convirt_core::{Config, PromptDomain, PromptPlan, PromptSource};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Built-in prompt presets.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PromptPreset {
    /// CheXpert competition templates
    Chexpert,
    /// "No Finding" report sentences as Normal, plus COVID templates
    Covid,
}

/// Prompt source options.
#[derive(Args, Debug, Default)]
pub struct PromptArgs {
    /// Prompt preset (replaces configured sources)
    #[arg(long = "prompts", value_enum)]
    pub preset: Option<PromptPreset>,

    /// Sentence-label table (CSV); alone, prompts every task column from it
    #[arg(long)]
    pub sentences: Option<PathBuf>,

    /// Prompts sampled per class
    #[arg(long, conflicts_with = "all_prompts")]
    pub per_class: Option<usize>,

    /// Keep every candidate prompt instead of sampling
    #[arg(long)]
    pub all_prompts: bool,
}

impl PromptArgs {
    /// Apply overrides to the prompt section of `config`.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        let sentences = self.sentences.as_deref().map(expand);
        match (self.preset, sentences) {
            (Some(PromptPreset::Chexpert), None) => {
                config.prompts.sources = vec![PromptSource::Template {
                    domain: PromptDomain::Chexpert,
                }];
                config.prompts.aliases.clear();
            }
            (Some(PromptPreset::Chexpert), Some(table)) => {
                config.prompts.sources = vec![
                    PromptSource::Template {
                        domain: PromptDomain::Chexpert,
                    },
                    PromptSource::Sentences {
                        table,
                        tasks: vec![],
                    },
                ];
                config.prompts.aliases.clear();
            }
            (Some(PromptPreset::Covid), Some(table)) => {
                let per_class = config.prompts.per_class;
                config.prompts = PromptsConfig::covid(table);
                config.prompts.per_class = per_class;
            }
            (Some(PromptPreset::Covid), None) => {
                anyhow::bail!(
                    "--prompts covid needs a sentence table for the Normal class\n\n  \
                     Hint: pass --sentences <table.csv> with a \"No Finding\" column."
                );
            }
            (None, Some(table)) => {
                config.prompts.sources = vec![PromptSource::Sentences {
                    table,
                    tasks: vec![],
                }];
                config.prompts.aliases.clear();
            }
            (None, None) => {}
        }

        if let Some(n) = self.per_class {
            config.prompts.per_class = Some(n);
        }
        if self.all_prompts {
            config.prompts.per_class = None;
        }
        Ok(())
    }
}

/// Arguments for the `prompts` command.
#[derive(Args, Debug)]
pub struct PromptsArgs {
    #[command(flatten)]
    pub prompts: PromptArgs,

    /// Seed for prompt sampling (defaults to the configured seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print only the set's fingerprint
    #[arg(long)]
    pub fingerprint: bool,
}

/// Execute the prompts command.
pub async fn execute(args: PromptsArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    args.prompts.apply(&mut config)?;
    config.validate()?;

    let plan = PromptPlan::from_config(&config.prompts, &config.data_dir())?;
    let seed = args.seed.unwrap_or(config.evaluation.seed);
    let prompts = plan.generate(&mut StdRng::seed_from_u64(seed))?;

    for (class, count) in prompts.counts() {
        tracing::info!("{}: {} prompts", class, count);
    }

    if args.fingerprint {
        println!("{}", prompts.fingerprint());
    } else {
        println!("{}", serde_json::to_string_pretty(&prompts)?);
    }
    Ok(())
}
