//! ConVIRT dual encoder.
//!
//! Images and texts are encoded by separate backbones into a shared
//! 512-dimensional space. Both embeddings are L2-normalized and their dot
//! products, divided by the temperature, form the logit matrix.
//!
//! # Usage
//!
//! ```rust,ignore
//! use convirt_core::model::{Checkpoint, DualEncoder};
//!
//! let checkpoint = Checkpoint::open(&config.checkpoint_dir())?;
//! let model = checkpoint.load_model(&config.model)?;
//! let out = model.forward(pixels.view(), &text_batch, false)?;
//! // out.logits is [images, texts]
//! ```

pub mod loss;
pub mod onnx;
pub mod preprocess;

pub use loss::contrastive_loss;
pub use onnx::{Checkpoint, OnnxImageEncoder, OnnxTextEncoder};

use ndarray::{Array2, ArrayView2, ArrayView4};

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::math::l2_normalize_rows;
use crate::prompts::TokenizedBatch;

/// Image backbone plus projection head.
///
/// Returns projected embeddings of shape `[N, D]`; normalization happens in
/// [`DualEncoder`].
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, pixels: ArrayView4<f32>) -> Result<Array2<f32>, ModelError>;
}

/// Text backbone pooled output plus projection head, shape `[M, D]`.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, batch: &TokenizedBatch) -> Result<Array2<f32>, ModelError>;
}

/// Result of a forward pass.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// Unit-norm image embeddings, `[images, D]`
    pub image_embeds: Array2<f32>,
    /// Unit-norm text embeddings, `[texts, D]`
    pub text_embeds: Array2<f32>,
    /// `image_embeds · text_embeds^T / temperature`, `[images, texts]`
    pub logits: Array2<f32>,
    /// Transpose of `logits`
    pub logits_per_text: Array2<f32>,
    /// Contrastive loss, when requested
    pub loss: Option<f32>,
}

/// Image and text encoders sharing one embedding space.
///
/// Parameters are read-only after loading, so one model serves every class
/// of every trial.
pub struct DualEncoder {
    image_encoder: Box<dyn ImageEncoder>,
    text_encoder: Box<dyn TextEncoder>,
    embedding_dim: usize,
    temperature: f32,
    lambda: f32,
}

impl DualEncoder {
    pub fn new(
        image_encoder: Box<dyn ImageEncoder>,
        text_encoder: Box<dyn TextEncoder>,
        config: &ModelConfig,
    ) -> Self {
        Self {
            image_encoder,
            text_encoder,
            embedding_dim: config.embedding_dim,
            temperature: config.temperature,
            lambda: config.lambda,
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Encode and L2-normalize an image batch `[N, 3, H, W]`.
    pub fn encode_images(&self, pixels: ArrayView4<f32>) -> Result<Array2<f32>, ModelError> {
        let raw = self.image_encoder.encode(pixels)?;
        self.check_shape("image", &raw, pixels.shape()[0])?;
        Ok(l2_normalize_rows(raw.view()))
    }

    /// Encode and L2-normalize a tokenized text batch.
    pub fn encode_text(&self, batch: &TokenizedBatch) -> Result<Array2<f32>, ModelError> {
        let raw = self.text_encoder.encode(batch)?;
        self.check_shape("text", &raw, batch.len())?;
        Ok(l2_normalize_rows(raw.view()))
    }

    /// Similarity logits between normalized embeddings.
    pub fn logits(&self, image_embeds: ArrayView2<f32>, text_embeds: ArrayView2<f32>) -> Array2<f32> {
        image_embeds.dot(&text_embeds.t()) / self.temperature
    }

    /// Full forward pass over an image batch and a text batch.
    pub fn forward(
        &self,
        pixels: ArrayView4<f32>,
        text: &TokenizedBatch,
        return_loss: bool,
    ) -> Result<ForwardOutput, ModelError> {
        let image_embeds = self.encode_images(pixels)?;
        self.forward_embedded(image_embeds, text, return_loss)
    }

    /// Forward pass reusing image embeddings from [`Self::encode_images`].
    pub fn forward_embedded(
        &self,
        image_embeds: Array2<f32>,
        text: &TokenizedBatch,
        return_loss: bool,
    ) -> Result<ForwardOutput, ModelError> {
        let text_embeds = self.encode_text(text)?;
        let logits = self.logits(image_embeds.view(), text_embeds.view());
        let logits_per_text = logits.t().to_owned();
        let loss = if return_loss {
            Some(contrastive_loss(logits.view(), self.lambda)?)
        } else {
            None
        };
        Ok(ForwardOutput {
            image_embeds,
            text_embeds,
            logits,
            logits_per_text,
            loss,
        })
    }

    fn check_shape(&self, what: &str, raw: &Array2<f32>, rows: usize) -> Result<(), ModelError> {
        if raw.ncols() != self.embedding_dim {
            return Err(ModelError::ShapeMismatch {
                message: format!(
                    "{what} encoder produced {}-dim embeddings, expected {}",
                    raw.ncols(),
                    self.embedding_dim
                ),
            });
        }
        if raw.nrows() != rows {
            return Err(ModelError::ShapeMismatch {
                message: format!(
                    "{what} encoder returned {} embeddings for a batch of {rows}",
                    raw.nrows()
                ),
            });
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_embeddings_are_unit_norm() {
        let model = small_model(4);
        let pixels = pixels_of(&[[1.0, 2.0, 3.0], [0.5, -0.5, 0.0], [9.0, 0.0, 0.0]]);
        let text = batch_of(&[&[0, 1, 1], &[2], &[3, 3, 3, 0]]);

        let out = model.forward(pixels.view(), &text, false).unwrap();
        for row in out.image_embeds.rows().into_iter().chain(out.text_embeds.rows()) {
            let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
        }
    }

    #[test]
    fn test_logits_are_scaled_cosines() {
        let model = small_model(4);
        // Image 0 points along slot 0, image 1 along slot 1
        let pixels = pixels_of(&[[1.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        let text = batch_of(&[&[0], &[1], &[0, 1]]);

        let out = model.forward(pixels.view(), &text, false).unwrap();
        assert_eq!(out.logits.shape(), &[2, 3]);
        assert!((out.logits[[0, 0]] - 10.0).abs() < 1e-4);
        assert!(out.logits[[0, 1]].abs() < 1e-4);
        assert!((out.logits[[1, 2]] - 10.0 / 2f32.sqrt()).abs() < 1e-4);
        assert_eq!(out.logits_per_text, out.logits.t());
        assert!(out.loss.is_none());
    }

    #[test]
    fn test_forward_with_loss_requires_square_batch() {
        let model = small_model(4);
        let pixels = pixels_of(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);

        let square = batch_of(&[&[0], &[1]]);
        let out = model.forward(pixels.view(), &square, true).unwrap();
        assert!(out.loss.unwrap().is_finite());

        let wide = batch_of(&[&[0], &[1], &[2]]);
        let err = model.forward(pixels.view(), &wide, true).unwrap_err();
        assert!(matches!(
            err,
            ModelError::BatchMismatch {
                images: 2,
                texts: 3
            }
        ));
    }

    #[test]
    fn test_embedding_width_mismatch_is_error() {
        let model = DualEncoder::new(
            Box::new(ChannelMeanEncoder { dim: 4 }),
            Box::new(BagOfIdsEncoder { dim: 4 }),
            &ModelConfig::default(),
        );
        let pixels = pixels_of(&[[1.0, 0.0, 0.0]]);
        let err = model.encode_images(pixels.view()).unwrap_err();
        assert!(err.to_string().contains("expected 512"));
    }
}
