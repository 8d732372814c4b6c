//! Symmetric InfoNCE loss of the pretraining objective.
//!
//! Not used for zero-shot scoring; exposed so a checkpoint can be sanity
//! checked against paired image/report batches.

use ndarray::{ArrayView2, Axis};

use crate::error::ModelError;
use crate::math::log_sum_exp;

/// Mean cross-entropy of each row against its diagonal entry.
///
/// Row `i` is treated as class scores whose correct class is `i`.
pub fn identity_cross_entropy(logits: ArrayView2<f32>) -> Result<f32, ModelError> {
    let (rows, cols) = logits.dim();
    if rows != cols {
        return Err(ModelError::BatchMismatch {
            images: rows,
            texts: cols,
        });
    }
    if rows == 0 {
        return Ok(0.0);
    }
    let total: f32 = logits
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| log_sum_exp(row) - row[i])
        .sum();
    Ok(total / rows as f32)
}

/// `lambda * CE(logits, I) + (1 - lambda) * CE(logits^T, I)`.
pub fn contrastive_loss(logits: ArrayView2<f32>, lambda: f32) -> Result<f32, ModelError> {
    let image_loss = identity_cross_entropy(logits)?;
    let caption_loss = identity_cross_entropy(logits.t())?;
    Ok(lambda * image_loss + (1.0 - lambda) * caption_loss)
}
