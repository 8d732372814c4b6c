//! Class prompt generation and tokenization.
//!
//! A [`PromptSet`] maps each class name to the natural-language prompts that
//! describe it. Prompts come from built-in phrase templates or from labeled
//! report sentences, and a [`PromptPlan`] merges several sources into the set
//! evaluated in one trial.

pub mod sentences;
pub mod templates;
pub mod tokenize;

pub use sentences::{generate_sentence_prompts, SentenceTable};
pub use templates::{generate_template_prompts, PromptDomain, PromptTemplate};
pub use tokenize::{PromptTokenizer, TokenizedBatch, TokenizedPromptSet};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::PromptsConfig;
use crate::error::{EvalError, PromptError};

/// Ordered mapping from class name to prompts.
///
/// Iteration follows insertion order; re-inserting a class replaces its
/// prompts in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptSet {
    classes: Vec<(String, Vec<String>)>,
}

impl PromptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the prompts of a class.
    pub fn insert(&mut self, class: impl Into<String>, prompts: Vec<String>) {
        let class = class.into();
        match self.classes.iter_mut().find(|(name, _)| *name == class) {
            Some((_, existing)) => *existing = prompts,
            None => self.classes.push((class, prompts)),
        }
    }

    /// Merge another set into this one; its classes win on conflict.
    pub fn extend(&mut self, other: PromptSet) {
        for (class, prompts) in other.classes {
            self.insert(class, prompts);
        }
    }

    /// Rename a class, keeping its position. Returns false if absent.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.classes.iter_mut().find(|(name, _)| name == from) {
            Some((name, _)) => {
                *name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, class: &str) -> Option<&[String]> {
        self.classes
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, prompts)| prompts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.classes
            .iter()
            .map(|(name, prompts)| (name.as_str(), prompts.as_slice()))
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Prompt count per class, in class order.
    pub fn counts(&self) -> Vec<(String, usize)> {
        self.classes
            .iter()
            .map(|(name, prompts)| (name.clone(), prompts.len()))
            .collect()
    }

    /// Fail on the first class without prompts.
    pub fn ensure_non_empty(&self) -> Result<(), PromptError> {
        match self.classes.iter().find(|(_, prompts)| prompts.is_empty()) {
            Some((class, _)) => Err(PromptError::EmptyClass {
                class: class.clone(),
            }),
            None => Ok(()),
        }
    }

    /// BLAKE3 digest of class names and prompts, identifying a frozen set.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (class, prompts) in &self.classes {
            hasher.update(class.as_bytes());
            hasher.update(&[0x1e]);
            for prompt in prompts {
                hasher.update(prompt.as_bytes());
                hasher.update(&[0x1f]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl Serialize for PromptSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.classes.len()))?;
        for (class, prompts) in &self.classes {
            map.serialize_entry(class, prompts)?;
        }
        map.end()
    }
}

/// One configured prompt source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptSource {
    /// Cross-product of a built-in template family
    Template { domain: PromptDomain },

    /// Exclusive-positive sentences from a sentence-label table
    Sentences {
        /// CSV path; relative paths resolve against the data directory
        table: PathBuf,
        /// Tasks to build prompts for; empty means every task column
        #[serde(default)]
        tasks: Vec<String>,
    },
}

#[derive(Debug, Clone)]
enum PlanStep {
    Template(PromptDomain),
    Sentences {
        table: SentenceTable,
        tasks: Vec<String>,
    },
}

/// Prompt sources resolved and loaded, ready to generate a set per trial.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    steps: Vec<PlanStep>,
    per_class: Option<usize>,
    aliases: BTreeMap<String, String>,
}

impl PromptPlan {
    /// Resolve sources, loading sentence tables once and checking their tasks.
    pub fn from_config(config: &PromptsConfig, data_dir: &Path) -> Result<Self, EvalError> {
        let mut steps = Vec::with_capacity(config.sources.len());
        for source in &config.sources {
            match source {
                PromptSource::Template { domain } => steps.push(PlanStep::Template(*domain)),
                PromptSource::Sentences { table, tasks } => {
                    let path = crate::config::expand(table);
                    let path = if path.is_absolute() {
                        path
                    } else {
                        data_dir.join(path)
                    };
                    let table = SentenceTable::load(&path)?;
                    table.check_tasks(tasks)?;
                    steps.push(PlanStep::Sentences {
                        table,
                        tasks: tasks.clone(),
                    });
                }
            }
        }
        Ok(Self {
            steps,
            per_class: config.per_class,
            aliases: config.aliases.clone(),
        })
    }

    /// A plan over a single template family.
    pub fn template(domain: PromptDomain, per_class: Option<usize>) -> Self {
        Self {
            steps: vec![PlanStep::Template(domain)],
            per_class,
            aliases: BTreeMap::new(),
        }
    }

    /// Generate a prompt set, drawing any samples from `rng`.
    ///
    /// Sources merge in order and aliases apply last. Every class of the
    /// result has at least one prompt.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PromptSet, PromptError> {
        let mut prompts = PromptSet::new();
        for step in &self.steps {
            let generated = match step {
                PlanStep::Template(domain) => {
                    generate_template_prompts(domain.templates(), self.per_class, rng)
                }
                PlanStep::Sentences { table, tasks } => {
                    generate_sentence_prompts(table, tasks, self.per_class, rng)?
                }
            };
            prompts.extend(generated);
        }
        for (from, to) in &self.aliases {
            if !prompts.rename(from, to) {
                tracing::warn!("Prompt alias {:?} -> {:?} matches no class", from, to);
            }
        }
        prompts.ensure_non_empty()?;
        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut set = PromptSet::new();
        set.insert("A", strings(&["a1"]));
        set.insert("B", strings(&["b1"]));
        set.insert("A", strings(&["a2", "a3"]));
        assert_eq!(set.class_names(), vec!["A", "B"]);
        assert_eq!(set.get("A").unwrap(), ["a2", "a3"]);
    }

    #[test]
    fn test_rename_keeps_position() {
        let mut set = PromptSet::new();
        set.insert("No Finding", strings(&["clear lungs"]));
        set.insert("COVID", strings(&["patchy opacity"]));
        assert!(set.rename("No Finding", "Normal"));
        assert!(!set.rename("Missing", "X"));
        assert_eq!(set.class_names(), vec!["Normal", "COVID"]);
    }

    #[test]
    fn test_ensure_non_empty() {
        let mut set = PromptSet::new();
        set.insert("A", strings(&["a"]));
        assert!(set.ensure_non_empty().is_ok());
        set.insert("B", vec![]);
        let err = set.ensure_non_empty().unwrap_err();
        assert!(matches!(err, PromptError::EmptyClass { ref class } if class == "B"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let mut a = PromptSet::new();
        a.insert("A", strings(&["x", "y"]));
        let mut b = PromptSet::new();
        b.insert("A", strings(&["x", "y"]));
        assert_eq!(a.fingerprint(), b.fingerprint());

        // Same concatenated text, different split
        let mut c = PromptSet::new();
        c.insert("A", strings(&["xy"]));
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_serialize_as_ordered_object() {
        let mut set = PromptSet::new();
        set.insert("Zeta", strings(&["z"]));
        set.insert("Alpha", strings(&["a"]));
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"Zeta":["z"],"Alpha":["a"]}"#);
    }

    #[test]
    fn test_plan_template_sampling_varies_across_draws() {
        let plan = PromptPlan::template(PromptDomain::Chexpert, Some(10));
        let mut rng = StdRng::seed_from_u64(42);
        let first = plan.generate(&mut rng).unwrap();
        let second = plan.generate(&mut rng).unwrap();
        assert_eq!(first.len(), 5);
        assert_ne!(first, second);
    }

    #[test]
    fn test_plan_merges_sources_and_applies_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("sentence-label.csv")).unwrap();
        writeln!(f, "Reports,No Finding,COVID").unwrap();
        writeln!(f, "no acute cardiopulmonary process,1,0").unwrap();
        writeln!(f, "lungs are clear,1,0").unwrap();
        drop(f);

        let config = PromptsConfig::covid(PathBuf::from("sentence-label.csv"));
        let plan = PromptPlan::from_config(&config, dir.path()).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let prompts = plan.generate(&mut rng).unwrap();

        assert_eq!(prompts.class_names(), vec!["Normal", "COVID"]);
        assert_eq!(prompts.get("Normal").unwrap().len(), 2);
        assert_eq!(prompts.get("COVID").unwrap().len(), 10);
    }

    #[test]
    fn test_plan_rejects_unknown_task_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "Reports,Edema\nmild pulmonary edema,1\n").unwrap();

        let config = PromptsConfig {
            per_class: None,
            sources: vec![PromptSource::Sentences {
                table: path,
                tasks: vec!["Pneumothorax".to_string()],
            }],
            aliases: BTreeMap::new(),
        };
        let err = PromptPlan::from_config(&config, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            EvalError::Prompt(PromptError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_plan_signals_task_without_sentences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "Reports,Edema,Cardiomegaly\nmild pulmonary edema,1,0\n").unwrap();

        let config = PromptsConfig {
            per_class: Some(5),
            sources: vec![PromptSource::Sentences {
                table: path,
                tasks: vec![],
            }],
            aliases: BTreeMap::new(),
        };
        let plan = PromptPlan::from_config(&config, dir.path()).unwrap();
        let err = plan.generate(&mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, PromptError::EmptyClass { ref class } if class == "Cardiomegaly"));
    }
}
