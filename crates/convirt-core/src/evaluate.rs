//! Multi-trial zero-shot evaluation.
//!
//! Each trial draws a fresh prompt set from the [`PromptPlan`], tokenizes
//! it, classifies every image batch, and scores the predictions against the
//! dataset labels. Trials share one seeded RNG, so a run is reproducible from
//! its seed while individual trials see different prompt samples.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::classifier::{ClassSimilarities, Reduction, ZeroShotClassifier};
use crate::dataset::ZeroShotDataset;
use crate::error::{ConfigError, EvalError};
use crate::math::{argmax, mean_std};
use crate::prompts::{PromptPlan, PromptSet, PromptTokenizer};

/// Outcome of a single trial.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrialReport {
    /// Zero-based trial index
    pub trial: usize,
    pub accuracy: f64,
    /// BLAKE3 fingerprint of the prompt set used
    pub prompt_fingerprint: String,
    /// Prompts per class
    pub prompt_counts: BTreeMap<String, usize>,
}

/// Outcome of a full evaluation run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluationReport {
    pub dataset: String,
    pub reduction: Reduction,
    pub images: usize,
    pub trials: Vec<TrialReport>,
    pub mean: f64,
    /// Population standard deviation of trial accuracies
    pub std: f64,
}

impl EvaluationReport {
    fn from_trials(dataset: &ZeroShotDataset, reduction: Reduction, trials: Vec<TrialReport>) -> Self {
        let accuracies: Vec<f64> = trials.iter().map(|t| t.accuracy).collect();
        let (mean, std) = mean_std(&accuracies);
        Self {
            dataset: dataset.name().to_string(),
            reduction,
            images: dataset.len(),
            trials,
            mean,
            std,
        }
    }

    pub fn accuracies(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.accuracy).collect()
    }
}

/// Map each dataset class to its column in `similarities`.
fn class_columns(
    similarities: &ClassSimilarities,
    class_names: &[String],
) -> Result<Vec<usize>, ConfigError> {
    class_names
        .iter()
        .map(|class| {
            similarities.column(class).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "Dataset class {class:?} has no prompts (prompt classes: {})",
                    similarities.class_names.join(", ")
                ))
            })
        })
        .collect()
}

/// Predicted dataset class index per image.
///
/// Only the columns of dataset classes compete; ties resolve to the earlier
/// dataset class.
pub fn aligned_predictions(
    similarities: &ClassSimilarities,
    class_names: &[String],
) -> Result<Vec<usize>, ConfigError> {
    let columns = class_columns(similarities, class_names)?;
    let logits = similarities.logits.select(ndarray::Axis(1), &columns);
    Ok(logits
        .rows()
        .into_iter()
        .map(|row| argmax(row).unwrap_or(0))
        .collect())
}

/// Fraction of images whose aligned prediction equals the label.
pub fn accuracy(
    similarities: &ClassSimilarities,
    labels: &[usize],
    class_names: &[String],
) -> Result<f64, ConfigError> {
    let predictions = aligned_predictions(similarities, class_names)?;
    if predictions.len() != labels.len() {
        return Err(ConfigError::ValidationError(format!(
            "{} predictions for {} labels",
            predictions.len(),
            labels.len()
        )));
    }
    if labels.is_empty() {
        return Ok(0.0);
    }
    let correct = predictions
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    Ok(correct as f64 / labels.len() as f64)
}

/// Runs trials of zero-shot classification over one dataset.
pub struct Evaluator {
    classifier: ZeroShotClassifier,
    tokenizer: PromptTokenizer,
    dataset: ZeroShotDataset,
    plan: PromptPlan,
    batch_size: usize,
}

impl Evaluator {
    pub fn new(
        classifier: ZeroShotClassifier,
        tokenizer: PromptTokenizer,
        dataset: ZeroShotDataset,
        plan: PromptPlan,
        batch_size: usize,
    ) -> Self {
        Self {
            classifier,
            tokenizer,
            dataset,
            plan,
            batch_size,
        }
    }

    pub fn dataset(&self) -> &ZeroShotDataset {
        &self.dataset
    }

    pub fn plan(&self) -> &PromptPlan {
        &self.plan
    }

    /// Score one frozen prompt set against the whole dataset.
    ///
    /// `on_batch` receives the number of images in each finished batch.
    pub fn run_trial(
        &self,
        trial: usize,
        prompts: &PromptSet,
        on_batch: &mut dyn FnMut(usize),
    ) -> Result<TrialReport, EvalError> {
        if self.dataset.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Dataset {:?} has no images",
                self.dataset.name()
            ))
            .into());
        }
        let class_names = self.dataset.class_names();
        let missing: Vec<&str> = class_names
            .iter()
            .filter(|c| prompts.get(c).is_none())
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "Dataset classes without prompts: {}",
                missing.join(", ")
            ))
            .into());
        }

        let tokenized = self.tokenizer.tokenize_prompts(prompts)?;

        let mut correct = 0usize;
        let mut seen = 0usize;
        for batch in self.dataset.batches(self.batch_size) {
            let batch = batch?;
            let similarities = self.classifier.classify(batch.pixels.view(), &tokenized)?;
            let predictions = aligned_predictions(&similarities, class_names)?;
            correct += predictions
                .iter()
                .zip(&batch.labels)
                .filter(|(p, l)| p == l)
                .count();
            seen += batch.labels.len();
            on_batch(batch.labels.len());
        }

        let accuracy = correct as f64 / seen as f64;
        tracing::info!("Trial {}: accuracy {:.4}", trial, accuracy);

        Ok(TrialReport {
            trial,
            accuracy,
            prompt_fingerprint: prompts.fingerprint(),
            prompt_counts: prompts.counts().into_iter().collect(),
        })
    }

    /// Run `trials` trials, each with a prompt set freshly drawn from `rng`.
    pub fn run<R: Rng + ?Sized>(
        &self,
        trials: usize,
        rng: &mut R,
        on_batch: &mut dyn FnMut(usize),
    ) -> Result<EvaluationReport, EvalError> {
        tracing::info!(
            "Evaluating {} images of {} over {} trials (reduction: {})",
            self.dataset.len(),
            self.dataset.name(),
            trials,
            self.classifier.reduction()
        );

        let mut reports = Vec::with_capacity(trials);
        for trial in 0..trials {
            let prompts = self.plan.generate(rng)?;
            tracing::debug!(
                "Trial {} prompt set {} ({} classes)",
                trial,
                prompts.fingerprint(),
                prompts.len()
            );
            reports.push(self.run_trial(trial, &prompts, on_batch)?);
        }

        Ok(EvaluationReport::from_trials(
            &self.dataset,
            self.classifier.reduction(),
            reports,
        ))
    }
}
