//! Sub-configuration structs with defaults matching the pretrained ConVIRT setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::classifier::Reduction;
use crate::prompts::{PromptDomain, PromptSource};

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding checkpoint directories
    pub model_dir: PathBuf,

    /// Directory holding dataset manifests (`{name}-meta.csv`) and sentence tables
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.convirt/checkpoints"),
            data_dir: PathBuf::from("~/.convirt/data"),
        }
    }
}

/// Dual encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Checkpoint directory name under `general.model_dir`
    pub checkpoint: String,

    /// Width of the shared embedding space
    pub embedding_dim: usize,

    /// Logit temperature (similarities are divided by this)
    pub temperature: f32,

    /// Weight of the image-to-text direction in the contrastive loss
    pub lambda: f32,

    /// Square image input size
    pub image_size: u32,

    /// Token truncation limit for prompts
    pub max_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            checkpoint: "convirt-pretrain".to_string(),
            embedding_dim: 512,
            temperature: 0.1,
            lambda: 0.75,
            image_size: 224,
            max_length: 77,
        }
    }
}

/// Prompt generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Prompts sampled per class; `None` keeps every candidate
    pub per_class: Option<usize>,

    /// Prompt sources, merged in order
    pub sources: Vec<PromptSource>,

    /// Class renames applied after generation (generated name -> evaluated name)
    pub aliases: BTreeMap<String, String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            per_class: Some(10),
            sources: vec![PromptSource::Template {
                domain: PromptDomain::Chexpert,
            }],
            aliases: BTreeMap::new(),
        }
    }
}

impl PromptsConfig {
    /// COVID preset: "No Finding" report sentences as the normal class plus
    /// the COVID template, evaluated against the `Normal`/`COVID` labels.
    pub fn covid(sentence_table: PathBuf) -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("No Finding".to_string(), "Normal".to_string());
        Self {
            per_class: Some(10),
            sources: vec![
                PromptSource::Sentences {
                    table: sentence_table,
                    tasks: vec!["No Finding".to_string()],
                },
                PromptSource::Template {
                    domain: PromptDomain::Covid,
                },
            ],
            aliases,
        }
    }
}

/// Evaluation loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Benchmark split to evaluate
    pub dataset: String,

    /// Number of repeated trials
    pub trials: usize,

    /// Images per forward pass
    pub batch_size: usize,

    /// Seed for prompt sampling
    pub seed: u64,

    /// How per-prompt logits collapse into one class score
    pub reduction: Reduction,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dataset: "mimic-5x200".to_string(),
            trials: 5,
            batch_size: 128,
            seed: 42,
            reduction: Reduction::Mean,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
