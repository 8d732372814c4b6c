//! The `convirt evaluate` command: multi-trial zero-shot accuracy.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use convirt_core::config::expand;
use convirt_core::{
    Checkpoint, Config, EvaluationReport, Evaluator, PromptPlan, Reduction, ZeroShotClassifier,
    ZeroShotDataset,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::prompts::PromptArgs;

/// How per-prompt logits collapse into one class score.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReductionArg {
    /// Average over prompts (prompt ensembling)
    Mean,
    /// Best-matching prompt
    Max,
}

impl From<ReductionArg> for Reduction {
    fn from(arg: ReductionArg) -> Self {
        match arg {
            ReductionArg::Mean => Reduction::Mean,
            ReductionArg::Max => Reduction::Max,
        }
    }
}

/// Arguments for the `evaluate` command.
#[derive(Args, Debug, Default)]
pub struct EvaluateArgs {
    /// Benchmark split: chexpert-5x200, mimic-5x200, iuxray-5x200, covid19-test
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Number of prompt-sampling trials
    #[arg(short, long)]
    pub trials: Option<usize>,

    /// Images per forward pass
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Prompt reduction
    #[arg(long, value_enum)]
    pub reduction: Option<ReductionArg>,

    /// Seed for prompt sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Checkpoint directory (overrides model_dir/checkpoint from config)
    #[arg(long, env = "CONVIRT_CHECKPOINT")]
    pub checkpoint: Option<PathBuf>,

    /// Directory holding dataset manifests
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[command(flatten)]
    pub prompts: PromptArgs,

    /// Write the full report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl EvaluateArgs {
    /// Apply overrides to `config` and re-validate it.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(ref dataset) = self.dataset {
            config.evaluation.dataset = dataset.clone();
        }
        if let Some(trials) = self.trials {
            config.evaluation.trials = trials;
        }
        if let Some(batch_size) = self.batch_size {
            config.evaluation.batch_size = batch_size;
        }
        if let Some(reduction) = self.reduction {
            config.evaluation.reduction = reduction.into();
        }
        if let Some(seed) = self.seed {
            config.evaluation.seed = seed;
        }
        if let Some(ref data_dir) = self.data_dir {
            config.general.data_dir = data_dir.clone();
        }
        self.prompts.apply(config)?;
        config.validate()?;
        Ok(())
    }

    fn checkpoint_dir(&self, config: &Config) -> PathBuf {
        match self.checkpoint {
            Some(ref dir) => expand(dir),
            None => config.checkpoint_dir(),
        }
    }
}

/// Execute the evaluate command.
pub async fn execute(args: EvaluateArgs) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    args.apply(&mut config)?;

    let checkpoint_dir = args.checkpoint_dir(&config);
    let checkpoint = Checkpoint::open(&checkpoint_dir).map_err(|e| {
        anyhow::anyhow!(
            "{e}\n\n  Hint: export image_encoder.onnx, text_encoder.onnx and tokenizer.json \
             into {}, or pass --checkpoint.",
            checkpoint_dir.display()
        )
    })?;

    let data_dir = config.data_dir();
    let dataset = ZeroShotDataset::load(
        &data_dir,
        &config.evaluation.dataset,
        config.model.image_size,
    )?;
    let plan = PromptPlan::from_config(&config.prompts, &data_dir)?;
    let tokenizer = checkpoint.load_tokenizer(&config.model)?;
    let model = checkpoint.load_model(&config.model)?;
    let classifier = ZeroShotClassifier::new(model, config.evaluation.reduction);

    let evaluator = Evaluator::new(
        classifier,
        tokenizer,
        dataset,
        plan,
        config.evaluation.batch_size,
    );

    let trials = config.evaluation.trials;
    let seed = config.evaluation.seed;
    let progress = create_progress_bar((trials * evaluator.dataset().len()) as u64);
    let pb = progress.clone();

    let report = tokio::task::spawn_blocking(move || {
        let mut rng = StdRng::seed_from_u64(seed);
        evaluator.run(trials, &mut rng, &mut |n| pb.inc(n as u64))
    })
    .await??;

    progress.finish_and_clear();

    print!("{}", format_report(&report));

    if let Some(ref output) = args.output {
        let output = expand(output);
        std::fs::write(&output, serde_json::to_string_pretty(&report)?)?;
        tracing::info!("Report written to {:?}", output);
    }

    Ok(())
}

/// Per-trial accuracies followed by the `mean, std` summary line.
fn format_report(report: &EvaluationReport) -> String {
    let mut out = String::new();
    for trial in &report.trials {
        out.push_str(&format!("{:.4}\n", trial.accuracy));
    }
    out.push_str(&format!("mean: {:.4}, std: {:.2}\n", report.mean, report.std));
    out
}

/// Create a progress bar counting images across all trials.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images ({percent}%)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use convirt_core::TrialReport;
    use std::collections::BTreeMap;

    fn trial(trial: usize, accuracy: f64) -> TrialReport {
        TrialReport {
            trial,
            accuracy,
            prompt_fingerprint: String::new(),
            prompt_counts: BTreeMap::new(),
        }
    }

    #[test]
    fn format_report_lines() {
        let report = EvaluationReport {
            dataset: "mimic-5x200".to_string(),
            reduction: Reduction::Mean,
            images: 1000,
            trials: vec![trial(0, 0.412), trial(1, 0.43)],
            mean: 0.421,
            std: 0.009,
        };
        assert_eq!(
            format_report(&report),
            "0.4120\n0.4300\nmean: 0.4210, std: 0.01\n"
        );
    }

    #[test]
    fn overrides_apply_to_config() {
        let mut config = Config::default();
        let args = EvaluateArgs {
            dataset: Some("chexpert-5x200".to_string()),
            trials: Some(2),
            reduction: Some(ReductionArg::Max),
            seed: Some(7),
            ..Default::default()
        };
        args.apply(&mut config).unwrap();

        assert_eq!(config.evaluation.dataset, "chexpert-5x200");
        assert_eq!(config.evaluation.trials, 2);
        assert_eq!(config.evaluation.reduction, Reduction::Max);
        assert_eq!(config.evaluation.seed, 7);
        assert_eq!(config.evaluation.batch_size, 128);
    }

    #[test]
    fn zero_trials_rejected() {
        let mut config = Config::default();
        let args = EvaluateArgs {
            trials: Some(0),
            ..Default::default()
        };
        assert!(args.apply(&mut config).is_err());
    }

    #[test]
    fn explicit_checkpoint_wins() {
        let config = Config::default();
        let args = EvaluateArgs {
            checkpoint: Some(PathBuf::from("/models/convirt")),
            ..Default::default()
        };
        assert_eq!(args.checkpoint_dir(&config), PathBuf::from("/models/convirt"));
        assert_eq!(
            EvaluateArgs::default().checkpoint_dir(&config),
            config.checkpoint_dir()
        );
    }
}
