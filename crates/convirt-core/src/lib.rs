//! ConVIRT Core - Zero-shot evaluation of medical image/text encoders.
//!
//! Scores chest radiographs against natural-language class prompts using a
//! contrastively pretrained dual encoder, and reports classification accuracy
//! over several trials of randomly sampled prompts.
//!
//! # Architecture
//!
//! ```text
//! Templates / Sentences → PromptSet → Tokenize ┐
//!                                               ├→ DualEncoder → Reduce → Accuracy
//! Manifest → Decode → Preprocess → Batches ────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use convirt_core::{Checkpoint, Config, Evaluator, PromptPlan, ZeroShotClassifier, ZeroShotDataset};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = Config::load()?;
//! let checkpoint = Checkpoint::open(&config.checkpoint_dir())?;
//! let classifier = ZeroShotClassifier::new(
//!     checkpoint.load_model(&config.model)?,
//!     config.evaluation.reduction,
//! );
//! let evaluator = Evaluator::new(
//!     classifier,
//!     checkpoint.load_tokenizer(&config.model)?,
//!     ZeroShotDataset::load(&config.data_dir(), "mimic-5x200", config.model.image_size)?,
//!     PromptPlan::from_config(&config.prompts, &config.data_dir())?,
//!     config.evaluation.batch_size,
//! );
//! let report = evaluator.run(5, &mut StdRng::seed_from_u64(42), &mut |_| {})?;
//! println!("mean: {:.4}, std: {:.2}", report.mean, report.std);
//! ```

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod math;
pub mod model;
pub mod prompts;

pub use classifier::{ClassSimilarities, Reduction, ZeroShotClassifier};
pub use config::Config;
pub use dataset::{DatasetSpec, ImageBatch, ZeroShotDataset, DATASETS};
pub use error::{ConfigError, DataError, EvalError, ModelError, PromptError, Result};
pub use evaluate::{accuracy, EvaluationReport, Evaluator, TrialReport};
pub use model::onnx::Checkpoint;
pub use model::{DualEncoder, ForwardOutput, ImageEncoder, TextEncoder};
pub use prompts::{PromptDomain, PromptPlan, PromptSet, PromptSource, PromptTokenizer};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
