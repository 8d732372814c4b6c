//! ONNX Runtime backed encoders and checkpoint loading.
//!
//! A checkpoint directory holds both encoders exported with their projection
//! heads, plus the text tokenizer:
//!
//! ```text
//! {model_dir}/{checkpoint}/
//!   image_encoder.onnx   pixel_values [N,3,224,224] -> image_embeds [N,512]
//!   text_encoder.onnx    input_ids, attention_mask [M,L] -> text_embeds [M,512]
//!   tokenizer.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array2, ArrayView4};
use ort::session::Session;
use ort::value::Value;

use crate::config::ModelConfig;
use crate::error::{EvalError, ModelError};
use crate::prompts::{PromptTokenizer, TokenizedBatch};

use super::{DualEncoder, ImageEncoder, TextEncoder};

const IMAGE_MODEL_FILENAME: &str = "image_encoder.onnx";
const TEXT_MODEL_FILENAME: &str = "text_encoder.onnx";
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Output names tried in order before falling back to the first output.
const IMAGE_OUTPUTS: &[&str] = &["image_embeds", "embeddings"];
const TEXT_OUTPUTS: &[&str] = &["text_embeds", "embeddings"];

/// A checkpoint directory with every required file present.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    /// Open a checkpoint directory, failing on the first missing file.
    pub fn open(dir: &Path) -> Result<Self, ModelError> {
        for name in [IMAGE_MODEL_FILENAME, TEXT_MODEL_FILENAME, TOKENIZER_FILENAME] {
            let path = dir.join(name);
            if !path.exists() {
                return Err(ModelError::NotFound { path });
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn image_model_path(&self) -> PathBuf {
        self.dir.join(IMAGE_MODEL_FILENAME)
    }

    pub fn text_model_path(&self) -> PathBuf {
        self.dir.join(TEXT_MODEL_FILENAME)
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILENAME)
    }

    /// Load both encoders into a [`DualEncoder`].
    pub fn load_model(&self, config: &ModelConfig) -> Result<DualEncoder, ModelError> {
        tracing::info!("Loading ConVIRT checkpoint from {:?}", self.dir);
        let image = OnnxImageEncoder::load(&self.image_model_path())?;
        let text = OnnxTextEncoder::load(&self.text_model_path())?;
        tracing::info!("Checkpoint loaded");
        Ok(DualEncoder::new(Box::new(image), Box::new(text), config))
    }

    /// Load the prompt tokenizer with the configured truncation limit.
    pub fn load_tokenizer(&self, config: &ModelConfig) -> Result<PromptTokenizer, EvalError> {
        Ok(PromptTokenizer::from_file(
            &self.tokenizer_path(),
            config.max_length,
        )?)
    }
}

fn build_session(path: &Path) -> Result<Session, ModelError> {
    Session::builder()
        .map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: format!("Failed to create ONNX session builder: {e}"),
        })?
        .commit_from_file(path)
        .map_err(|e| ModelError::Load {
            path: path.to_path_buf(),
            message: format!("Failed to load ONNX model: {e}"),
        })
}

/// Pick the first preferred output name present, else the first output.
fn choose_output(available: &[String], preferred: &[&str]) -> Option<String> {
    preferred
        .iter()
        .find(|p| available.iter().any(|a| a == *p))
        .map(|p| p.to_string())
        .or_else(|| available.first().cloned())
}

/// Reshape a flat `[rows, dim]` tensor into a matrix.
fn to_matrix(shape: &[usize], data: &[f32], what: &str) -> Result<Array2<f32>, ModelError> {
    if shape.len() != 2 {
        return Err(ModelError::ShapeMismatch {
            message: format!("{what} output has shape {shape:?}, expected [batch, dim]"),
        });
    }
    Array2::from_shape_vec((shape[0], shape[1]), data.to_vec()).map_err(|e| {
        ModelError::ShapeMismatch {
            message: format!("{what} output data does not fit {shape:?}: {e}"),
        }
    })
}

/// Image backbone and projection head in one ONNX graph.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct OnnxImageEncoder {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxImageEncoder {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let session = build_session(path)?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());
        let outputs: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let output_name =
            choose_output(&outputs, IMAGE_OUTPUTS).ok_or_else(|| ModelError::Load {
                path: path.to_path_buf(),
                message: "Model declares no outputs".to_string(),
            })?;

        tracing::debug!(
            "Loaded image encoder from {:?} (input: {:?}, output: {:?})",
            path,
            input_name,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl ImageEncoder for OnnxImageEncoder {
    fn encode(&self, pixels: ArrayView4<f32>) -> Result<Array2<f32>, ModelError> {
        let shape: Vec<i64> = pixels.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = pixels.iter().copied().collect();

        let input_value =
            Value::from_array((shape, flat_data)).map_err(|e| ModelError::Inference {
                message: format!("Failed to create pixel tensor: {e}"),
            })?;

        let mut session = self.session.lock().map_err(|e| ModelError::Inference {
            message: format!("Image session lock poisoned: {e}"),
        })?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| ModelError::Inference {
                message: format!("Image encoder inference failed: {e}"),
            })?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference {
                message: format!("Failed to extract {}: {e}", self.output_name),
            })?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        to_matrix(&dims, data, "image encoder")
    }
}

/// Text backbone pooled output and projection head in one ONNX graph.
pub struct OnnxTextEncoder {
    session: Mutex<Session>,
    output_name: String,
    /// BERT exports often also take `token_type_ids`; fed as zeros.
    needs_token_type_ids: bool,
}

impl OnnxTextEncoder {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let session = build_session(path)?;

        let inputs: Vec<String> = session
            .inputs()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        for required in ["input_ids", "attention_mask"] {
            if !inputs.iter().any(|i| i == required) {
                return Err(ModelError::Load {
                    path: path.to_path_buf(),
                    message: format!("Text encoder has no {required:?} input (inputs: {inputs:?})"),
                });
            }
        }
        let needs_token_type_ids = inputs.iter().any(|i| i == "token_type_ids");

        let outputs: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        let output_name =
            choose_output(&outputs, TEXT_OUTPUTS).ok_or_else(|| ModelError::Load {
                path: path.to_path_buf(),
                message: "Model declares no outputs".to_string(),
            })?;

        tracing::debug!(
            "Loaded text encoder from {:?} (inputs: {:?}, output: {:?})",
            path,
            inputs,
            output_name
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            needs_token_type_ids,
        })
    }
}

impl TextEncoder for OnnxTextEncoder {
    fn encode(&self, batch: &TokenizedBatch) -> Result<Array2<f32>, ModelError> {
        let shape = vec![batch.len() as i64, batch.seq_len() as i64];
        let tensor = |data: Vec<i64>, name: &str| {
            Value::from_array((shape.clone(), data)).map_err(|e| ModelError::Inference {
                message: format!("Failed to create {name} tensor: {e}"),
            })
        };
        let input_ids = tensor(batch.input_ids.iter().copied().collect(), "input_ids")?;
        let attention_mask = tensor(
            batch.attention_mask.iter().copied().collect(),
            "attention_mask",
        )?;

        let mut session = self.session.lock().map_err(|e| ModelError::Inference {
            message: format!("Text session lock poisoned: {e}"),
        })?;

        let run = if self.needs_token_type_ids {
            let token_type_ids = tensor(vec![0i64; batch.input_ids.len()], "token_type_ids")?;
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask
            ])
        };
        let outputs = run.map_err(|e| ModelError::Inference {
            message: format!("Text encoder inference failed: {e}"),
        })?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference {
                message: format!("Failed to extract {}: {e}", self.output_name),
            })?;
        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();

        to_matrix(&dims, data, "text encoder")
    }
}
