//! Prompt tokenization into padded id / attention-mask batches.
//!
//! Each class's prompts become one batch: truncated at `max_length` tokens
//! (special tokens included), right-padded to the longest prompt in that
//! batch, with an attention mask of 1 for real tokens and 0 for padding.

use std::path::Path;

use ndarray::Array2;
use tokenizers::{Tokenizer, TruncationParams};

use crate::error::PromptError;

use super::PromptSet;

/// Token ids and attention mask for a batch of texts, shape `[texts, seq_len]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
}

impl TokenizedBatch {
    /// Number of texts in the batch.
    pub fn len(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.nrows() == 0
    }

    /// Padded sequence length.
    pub fn seq_len(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// One tokenized batch per class, in prompt set order.
#[derive(Debug, Clone, Default)]
pub struct TokenizedPromptSet {
    classes: Vec<(String, TokenizedBatch)>,
}

impl TokenizedPromptSet {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenizedBatch)> {
        self.classes
            .iter()
            .map(|(name, batch)| (name.as_str(), batch))
    }

    pub fn get(&self, class: &str) -> Option<&TokenizedBatch> {
        self.classes
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, batch)| batch)
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, class: &str, batch: TokenizedBatch) {
        self.classes.push((class.to_string(), batch));
    }
}

/// HuggingFace tokenizer configured for prompt batches.
pub struct PromptTokenizer {
    tokenizer: Tokenizer,
    max_length: usize,
    pad_id: u32,
}

impl PromptTokenizer {
    /// Load `tokenizer.json` and truncate at `max_length` tokens.
    pub fn from_file(path: &Path, max_length: usize) -> Result<Self, PromptError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| PromptError::Tokenization {
            message: format!("Failed to load tokenizer from {:?}: {e}", path),
        })?;
        tracing::debug!("Loaded tokenizer from {:?}", path);
        Self::from_tokenizer(tokenizer, max_length)
    }

    /// Wrap an existing tokenizer.
    ///
    /// The pad id is taken from the tokenizer's padding config, else the
    /// `[PAD]` token, else 0. Padding itself is done here, per batch.
    pub fn from_tokenizer(mut tokenizer: Tokenizer, max_length: usize) -> Result<Self, PromptError> {
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| PromptError::Tokenization {
                message: format!("Invalid truncation length {max_length}: {e}"),
            })?;
        tokenizer.with_padding(None);

        Ok(Self {
            tokenizer,
            max_length,
            pad_id,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Tokenize a batch of texts.
    pub fn tokenize(&self, texts: &[String]) -> Result<TokenizedBatch, PromptError> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PromptError::Tokenization {
                message: format!("{e}"),
            })?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(self.max_length))
            .max()
            .unwrap_or(0);

        let mut input_ids = Array2::<i64>::from_elem((texts.len(), seq_len), self.pad_id as i64);
        let mut attention_mask = Array2::<i64>::zeros((texts.len(), seq_len));
        for (i, encoding) in encodings.iter().enumerate() {
            for (j, &id) in encoding.get_ids().iter().take(seq_len).enumerate() {
                input_ids[[i, j]] = id as i64;
                attention_mask[[i, j]] = 1;
            }
        }

        Ok(TokenizedBatch {
            input_ids,
            attention_mask,
        })
    }

    /// Tokenize every class of a prompt set.
    pub fn tokenize_prompts(&self, prompts: &PromptSet) -> Result<TokenizedPromptSet, PromptError> {
        let mut classes = Vec::with_capacity(prompts.len());
        for (class, texts) in prompts.iter() {
            if texts.is_empty() {
                return Err(PromptError::EmptyClass {
                    class: class.to_string(),
                });
            }
            let batch = self.tokenize(texts)?;
            tracing::debug!(
                "Tokenized {} prompts for {} (seq_len {})",
                batch.len(),
                class,
                batch.seq_len()
            );
            classes.push((class.to_string(), batch));
        }
        Ok(TokenizedPromptSet { classes })
    }

    /// Decode ids back to text, skipping special tokens.
    pub fn decode(&self, ids: &[u32]) -> Result<String, PromptError> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| PromptError::Tokenization {
                message: format!("{e}"),
            })
    }

    /// Decode one row of a batch, ignoring padded positions.
    pub fn decode_row(&self, batch: &TokenizedBatch, row: usize) -> Result<String, PromptError> {
        let ids: Vec<u32> = batch
            .input_ids
            .row(row)
            .iter()
            .zip(batch.attention_mask.row(row).iter())
            .filter(|(_, &mask)| mask == 1)
            .map(|(&id, _)| id as u32)
            .collect();
        self.decode(&ids)
    }
}

/// Word-level tokenizer over a small radiology vocabulary, for tests.
#[cfg(test)]
pub(crate) fn test_tokenizer() -> Tokenizer {
    use std::str::FromStr;

    let words = [
        "[PAD]",
        "[UNK]",
        "mild",
        "minimal",
        "linear",
        "atelectasis",
        "at",
        "the",
        "lung",
        "bases",
        "pulmonary",
        "edema",
        "cardiomegaly",
        "pleural",
        "effusion",
        "left",
        "right",
        "no",
        "acute",
        "process",
    ];
    let vocab = words
        .iter()
        .enumerate()
        .map(|(i, w)| format!("\"{w}\": {i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let json = format!(
        r#"{{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": {{ "type": "Whitespace" }},
            "post_processor": null,
            "decoder": null,
            "model": {{ "type": "WordLevel", "vocab": {{ {vocab} }}, "unk_token": "[UNK]" }}
        }}"#
    );
    Tokenizer::from_str(&json).unwrap()
}
