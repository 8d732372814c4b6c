//! Prompts sampled from labeled report sentences.
//!
//! The sentence table is a CSV of report sentences with one-hot task label
//! columns. A sentence qualifies as a prompt for a task when it is positive
//! for that task and negative for every other task.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{DataError, PromptError};

use super::templates::sample_prompts;
use super::PromptSet;

/// Name of the text column, when present.
const TEXT_COLUMN: &str = "Reports";

/// Sentences with this many characters or fewer are discarded.
const MIN_SENTENCE_CHARS: usize = 4;

/// A loaded sentence-label table.
#[derive(Debug, Clone)]
pub struct SentenceTable {
    path: PathBuf,
    tasks: Vec<String>,
    rows: Vec<SentenceRow>,
}

#[derive(Debug, Clone)]
struct SentenceRow {
    text: String,
    labels: Vec<f32>,
}

impl SentenceTable {
    /// Load a table from CSV.
    ///
    /// The text column is `Reports` if present, otherwise the first column.
    /// Every column after it is a task label. Empty label cells count as 0.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let csv_err = |source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();

        let text_idx = headers.iter().position(|h| h == TEXT_COLUMN).unwrap_or(0);
        let tasks: Vec<String> = headers
            .iter()
            .skip(text_idx + 1)
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let text = record
                .get(text_idx)
                .ok_or_else(|| DataError::MalformedRow {
                    path: path.to_path_buf(),
                    row: i + 1,
                    message: "missing text column".to_string(),
                })?
                .to_string();
            let labels = tasks
                .iter()
                .enumerate()
                .map(|(t, task)| {
                    parse_label(record.get(text_idx + 1 + t).unwrap_or("")).ok_or_else(|| {
                        DataError::MalformedRow {
                            path: path.to_path_buf(),
                            row: i + 1,
                            message: format!("label for {task:?} is not numeric"),
                        }
                    })
                })
                .collect::<Result<Vec<f32>, DataError>>()?;
            rows.push(SentenceRow { text, labels });
        }

        tracing::debug!(
            "Loaded sentence table {:?}: {} rows, {} tasks",
            path,
            rows.len(),
            tasks.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            tasks,
            rows,
        })
    }

    /// Task label column names, in table order.
    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Number of sentences in the table.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Source file of this table.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure every requested task is a label column.
    pub fn check_tasks(&self, tasks: &[String]) -> Result<(), PromptError> {
        for task in tasks {
            self.task_index(task)?;
        }
        Ok(())
    }

    fn task_index(&self, task: &str) -> Result<usize, PromptError> {
        self.tasks
            .iter()
            .position(|t| t == task)
            .ok_or_else(|| PromptError::UnknownTask {
                task: task.to_string(),
                available: self.tasks.clone(),
            })
    }

    /// Sentences that are positive for `task` only, longer than 4 characters.
    pub fn exclusive_positives(&self, task: &str) -> Result<Vec<String>, PromptError> {
        let target = self.task_index(task)?;
        Ok(self
            .rows
            .iter()
            .filter(|row| row.text.chars().count() > MIN_SENTENCE_CHARS)
            .filter(|row| {
                row.labels.iter().enumerate().all(|(i, &label)| {
                    if i == target {
                        label == 1.0
                    } else {
                        label == 0.0
                    }
                })
            })
            .map(|row| row.text.clone())
            .collect())
    }
}

fn parse_label(cell: &str) -> Option<f32> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(0.0);
    }
    cell.parse::<f32>().ok().filter(|v| !v.is_nan())
}

/// Build prompts for `tasks` (every task when empty) from exclusive positives.
///
/// When more than `n` sentences qualify, `n` are sampled uniformly.
pub fn generate_sentence_prompts<R: Rng + ?Sized>(
    table: &SentenceTable,
    tasks: &[String],
    n: Option<usize>,
    rng: &mut R,
) -> Result<PromptSet, PromptError> {
    let targets: Vec<String> = if tasks.is_empty() {
        table.tasks().to_vec()
    } else {
        tasks.to_vec()
    };

    let mut prompts = PromptSet::new();
    for task in targets {
        let candidates = table.exclusive_positives(&task)?;
        let total = candidates.len();
        let chosen = sample_prompts(candidates, n, rng);
        tracing::info!(
            "Sampled {} prompts for {} from {} sentences",
            chosen.len(),
            task,
            total
        );
        prompts.insert(task, chosen);
    }
    Ok(prompts)
}
