//! Zero-shot classifier head.
//!
//! For every class, the image batch is scored against that class's prompts
//! and the resulting `[images, prompts]` logits collapse to one score per
//! image. Stacking the per-class columns gives an argmax-ready
//! `[images, classes]` similarity matrix.

use ndarray::{Array1, Array2, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EvalError, PromptError};
use crate::math::argmax;
use crate::model::DualEncoder;
use crate::prompts::TokenizedPromptSet;

/// How per-prompt logits collapse into one class score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Arithmetic mean over prompts (prompt ensembling)
    #[default]
    Mean,
    /// Best-matching prompt wins
    Max,
}

impl Reduction {
    /// Reduce `[images, prompts]` logits along the prompt axis.
    ///
    /// Returns `None` when there are no prompts.
    pub fn reduce(self, logits: ArrayView2<f32>) -> Option<Array1<f32>> {
        if logits.ncols() == 0 {
            return None;
        }
        match self {
            Self::Mean => logits.mean_axis(Axis(1)),
            Self::Max => Some(logits.fold_axis(Axis(1), f32::NEG_INFINITY, |acc, &x| acc.max(x))),
        }
    }
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "mean"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// Per-class similarity scores for one image batch.
#[derive(Debug, Clone)]
pub struct ClassSimilarities {
    /// `[images, classes]`, columns in `class_names` order
    pub logits: Array2<f32>,
    pub class_names: Vec<String>,
}

impl ClassSimilarities {
    /// Index into `class_names` of the best class for each image.
    pub fn predictions(&self) -> Vec<usize> {
        self.logits
            .axis_iter(Axis(0))
            .map(|row| argmax(row).unwrap_or(0))
            .collect()
    }

    /// Column index of a class.
    pub fn column(&self, class: &str) -> Option<usize> {
        self.class_names.iter().position(|c| c == class)
    }
}

/// Dual encoder plus a reduction policy.
pub struct ZeroShotClassifier {
    model: DualEncoder,
    reduction: Reduction,
}

impl ZeroShotClassifier {
    pub fn new(model: DualEncoder, reduction: Reduction) -> Self {
        Self { model, reduction }
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn model(&self) -> &DualEncoder {
        &self.model
    }

    /// Score an image batch against every class of a tokenized prompt set.
    ///
    /// The image batch is encoded once and shared across classes; each class
    /// runs the text side with the loss disabled. A class with no prompts is
    /// an error.
    pub fn classify(
        &self,
        pixels: ArrayView4<f32>,
        prompts: &TokenizedPromptSet,
    ) -> Result<ClassSimilarities, EvalError> {
        let image_embeds = self.model.encode_images(pixels)?;

        let mut columns: Vec<Array1<f32>> = Vec::with_capacity(prompts.len());
        let mut class_names = Vec::with_capacity(prompts.len());
        for (class, batch) in prompts.iter() {
            if batch.is_empty() {
                return Err(PromptError::EmptyClass {
                    class: class.to_string(),
                }
                .into());
            }
            let output = self
                .model
                .forward_embedded(image_embeds.clone(), batch, false)?;
            let scores =
                self.reduction
                    .reduce(output.logits.view())
                    .ok_or_else(|| PromptError::EmptyClass {
                        class: class.to_string(),
                    })?;
            columns.push(scores);
            class_names.push(class.to_string());
        }

        let n_images = image_embeds.nrows();
        let mut logits = Array2::<f32>::zeros((n_images, columns.len()));
        for (j, column) in columns.iter().enumerate() {
            logits.column_mut(j).assign(column);
        }

        Ok(ClassSimilarities {
            logits,
            class_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::*;
    use ndarray::array;

    #[test]
    fn test_mean_reduction_hand_computed() {
        let logits = array![[1.0f32, 2.0, 6.0], [-3.0, 0.0, 0.5]];
        let reduced = Reduction::Mean.reduce(logits.view()).unwrap();
        assert_eq!(reduced, array![3.0f32, -2.5 / 3.0]);
    }

    #[test]
    fn test_max_reduction_hand_computed() {
        let logits = array![[1.0f32, 2.0, 6.0], [-3.0, 0.0, 0.5]];
        let reduced = Reduction::Max.reduce(logits.view()).unwrap();
        assert_eq!(reduced, array![6.0f32, 0.5]);
    }

    #[test]
    fn test_reduction_of_all_negative_row() {
        let logits = array![[-4.0f32, -1.0, -2.0]];
        assert_eq!(Reduction::Max.reduce(logits.view()).unwrap(), array![-1.0f32]);
    }

    #[test]
    fn test_reduction_without_prompts_is_none() {
        let logits = Array2::<f32>::zeros((2, 0));
        assert!(Reduction::Mean.reduce(logits.view()).is_none());
        assert!(Reduction::Max.reduce(logits.view()).is_none());
    }

    #[test]
    fn test_reduction_serde_and_default() {
        assert_eq!(Reduction::default(), Reduction::Mean);
        let r: Reduction = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(r, Reduction::Max);
        assert_eq!(Reduction::Mean.to_string(), "mean");
    }

    fn two_class_prompts() -> TokenizedPromptSet {
        let mut prompts = TokenizedPromptSet::default();
        // Class A: one prompt on slot 0, one on slot 2
        prompts.push("A", batch_of(&[&[0], &[2]]));
        // Class B: one prompt on slot 1
        prompts.push("B", batch_of(&[&[1]]));
        prompts
    }

    #[test]
    fn test_classify_stacks_columns_in_class_order() {
        let classifier = ZeroShotClassifier::new(small_model(4), Reduction::Mean);
        let pixels = pixels_of(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

        let sims = classifier
            .classify(pixels.view(), &two_class_prompts())
            .unwrap();
        assert_eq!(sims.class_names, vec!["A", "B"]);
        assert_eq!(sims.logits.shape(), &[3, 2]);

        // Image 0 matches A's first prompt only: mean(10, 0) = 5
        assert!((sims.logits[[0, 0]] - 5.0).abs() < 1e-4);
        assert!(sims.logits[[0, 1]].abs() < 1e-4);
        // Image 1 matches B exactly
        assert!((sims.logits[[1, 1]] - 10.0).abs() < 1e-4);
        assert_eq!(sims.predictions(), vec![0, 1, 0]);
    }

    #[test]
    fn test_classify_max_vs_mean() {
        let pixels = pixels_of(&[[1.0, 0.0, 0.0]]);
        let prompts = two_class_prompts();

        let mean = ZeroShotClassifier::new(small_model(4), Reduction::Mean)
            .classify(pixels.view(), &prompts)
            .unwrap();
        let max = ZeroShotClassifier::new(small_model(4), Reduction::Max)
            .classify(pixels.view(), &prompts)
            .unwrap();

        assert!((mean.logits[[0, 0]] - 5.0).abs() < 1e-4);
        assert!((max.logits[[0, 0]] - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_classify_matches_per_class_forward() {
        let model = small_model(4);
        let pixels = pixels_of(&[[0.3, 0.9, 0.1], [0.7, 0.2, 0.4]]);
        let prompts = two_class_prompts();

        let expected: Vec<Array1<f32>> = prompts
            .iter()
            .map(|(_, batch)| {
                let out = model.forward(pixels.view(), batch, false).unwrap();
                Reduction::Mean.reduce(out.logits.view()).unwrap()
            })
            .collect();

        let sims = ZeroShotClassifier::new(model, Reduction::Mean)
            .classify(pixels.view(), &prompts)
            .unwrap();
        for (j, column) in expected.iter().enumerate() {
            assert_eq!(sims.logits.column(j), column.view());
        }
    }

    #[test]
    fn test_classify_empty_class_is_error() {
        let classifier = ZeroShotClassifier::new(small_model(4), Reduction::Mean);
        let mut prompts = two_class_prompts();
        prompts.push("Empty", batch_of(&[]));

        let pixels = pixels_of(&[[1.0, 0.0, 0.0]]);
        let err = classifier.classify(pixels.view(), &prompts).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Prompt(PromptError::EmptyClass { ref class }) if class == "Empty"
        ));
    }
}
