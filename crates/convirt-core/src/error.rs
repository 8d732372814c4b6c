//! Error types for the zero-shot evaluation harness.
//!
//! Errors are organized by stage so a failed run says where it stopped
//! (config, prompts, model, data) along with the file or class involved.
//! Every error is fatal: an evaluation run either completes or halts.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for evaluation runs.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Prompt generation and tokenization errors
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// Checkpoint loading and inference errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Dataset and table errors
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Prompt generation and tokenization errors.
#[derive(Error, Debug)]
pub enum PromptError {
    /// Requested task is not a label column of the sentence table
    #[error("Unknown task {task:?} (available: {})", .available.join(", "))]
    UnknownTask {
        task: String,
        available: Vec<String>,
    },

    /// A class ended up with no prompts and cannot be reduced
    #[error("Class {class:?} has no prompts")]
    EmptyClass { class: String },

    /// Tokenizer failed to load or encode
    #[error("Tokenization failed: {message}")]
    Tokenization { message: String },
}

/// Checkpoint loading and inference errors.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A checkpoint file is missing
    #[error("Checkpoint file not found: {path}")]
    NotFound { path: PathBuf },

    /// A checkpoint file exists but could not be loaded
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// ONNX inference failed
    #[error("Inference failed: {message}")]
    Inference { message: String },

    /// Encoder output does not match the expected shape
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// Image and text batch sizes differ where an identity alignment is required
    #[error("Batch size mismatch: {images} images vs {texts} texts")]
    BatchMismatch { images: usize, texts: usize },
}

/// Dataset, manifest, and sentence-table errors.
#[derive(Error, Debug)]
pub enum DataError {
    /// Failed to read or parse a CSV file
    #[error("Failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent
    #[error("Missing column {column:?} in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// A row could not be interpreted
    #[error("Malformed row {row} in {path}: {message}")]
    MalformedRow {
        path: PathBuf,
        row: usize,
        message: String,
    },

    /// An image in the dataset failed to decode
    #[error("Failed to load image {path}: {message}")]
    Image { path: PathBuf, message: String },

    /// Dataset name is not one of the known benchmark splits
    #[error("Unknown dataset {name:?} (available: {})", .available.join(", "))]
    UnknownDataset {
        name: String,
        available: Vec<String>,
    },

    /// Dataset manifest does not exist
    #[error("Dataset manifest not found: {0}")]
    NotFound(PathBuf),
}

/// Convenience type alias for evaluation results.
pub type Result<T> = std::result::Result<T, EvalError>;
