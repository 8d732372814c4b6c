//! Built-in class prompt templates and cross-product expansion.
//!
//! A template lists phrase components (severity, subtype, location, and for
//! COVID a view-like description). Every combination, one phrase per
//! component, joined by single spaces, is a candidate prompt for the class.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::PromptSet;

/// Phrase lists for one class, outermost component first.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub class: &'static str,
    pub components: &'static [(&'static str, &'static [&'static str])],
}

impl PromptTemplate {
    /// Number of cross-product candidates (product of component lengths).
    pub fn candidate_count(&self) -> usize {
        self.components
            .iter()
            .map(|(_, phrases)| phrases.len())
            .product()
    }

    /// All phrase combinations in nested iteration order.
    ///
    /// Empty phrases are joined like any other, so a leading empty severity
    /// yields a leading space. Pretrained checkpoints were evaluated against
    /// exactly these strings.
    pub fn candidates(&self) -> Vec<String> {
        let mut acc: Vec<String> = Vec::new();
        for (i, (_, phrases)) in self.components.iter().enumerate() {
            if i == 0 {
                acc = phrases.iter().map(|p| p.to_string()).collect();
                continue;
            }
            acc = acc
                .iter()
                .flat_map(|prefix| phrases.iter().map(move |p| format!("{prefix} {p}")))
                .collect();
        }
        acc
    }
}

/// Built-in template families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptDomain {
    /// CheXpert competition findings (chexpert, mimic, iuxray splits)
    Chexpert,
    /// COVID-19 findings
    Covid,
}

impl PromptDomain {
    /// Templates for this domain, in class order.
    pub fn templates(self) -> &'static [PromptTemplate] {
        match self {
            Self::Chexpert => CHEXPERT_TEMPLATES,
            Self::Covid => COVID_TEMPLATES,
        }
    }
}

impl std::fmt::Display for PromptDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chexpert => write!(f, "chexpert"),
            Self::Covid => write!(f, "covid"),
        }
    }
}

/// Expand every template and optionally sample `n` prompts per class.
///
/// With `n` of `None`, or `n` at least the candidate count, every candidate
/// is kept in cross-product order. Otherwise `n` distinct candidates are drawn
/// uniformly without replacement from `rng`.
pub fn generate_template_prompts<R: Rng + ?Sized>(
    templates: &[PromptTemplate],
    n: Option<usize>,
    rng: &mut R,
) -> PromptSet {
    let mut prompts = PromptSet::new();
    for template in templates {
        let candidates = template.candidates();
        let total = candidates.len();
        let chosen = sample_prompts(candidates, n, rng);
        tracing::info!(
            "Sampled {} prompts for {} from {} candidates",
            chosen.len(),
            template.class,
            total
        );
        prompts.insert(template.class, chosen);
    }
    prompts
}

/// Keep all candidates, or draw `n` of them without replacement.
pub(crate) fn sample_prompts<R: Rng + ?Sized>(
    candidates: Vec<String>,
    n: Option<usize>,
    rng: &mut R,
) -> Vec<String> {
    match n {
        Some(n) if n < candidates.len() => candidates.choose_multiple(rng, n).cloned().collect(),
        _ => candidates,
    }
}

const ATELECTASIS: PromptTemplate = PromptTemplate {
    class: "Atelectasis",
    components: &[
        ("severity", &["", "mild", "minimal"]),
        (
            "subtype",
            &[
                "subsegmental atelectasis",
                "linear atelectasis",
                "trace atelectasis",
                "bibasilar atelectasis",
                "retrocardiac atelectasis",
                "bandlike atelectasis",
                "residual atelectasis",
            ],
        ),
        (
            "location",
            &[
                "at the mid lung zone",
                "at the upper lung zone",
                "at the right lung zone",
                "at the left lung zone",
                "at the lung bases",
                "at the right lung base",
                "at the left lung base",
                "at the bilateral lung bases",
                "at the left lower lobe",
                "at the right lower lobe",
            ],
        ),
    ],
};

const CARDIOMEGALY: PromptTemplate = PromptTemplate {
    class: "Cardiomegaly",
    components: &[
        ("severity", &[""]),
        (
            "subtype",
            &[
                "cardiac silhouette size is upper limits of normal",
                "cardiomegaly which is unchanged",
                "mildly prominent cardiac silhouette",
                "portable view of the chest demonstrates stable cardiomegaly",
                "portable view of the chest demonstrates mild cardiomegaly",
                "persistent severe cardiomegaly",
                "heart size is borderline enlarged",
                "cardiomegaly unchanged",
                "heart size is at the upper limits of normal",
                "redemonstration of cardiomegaly",
                "ap erect chest radiograph demonstrates the heart size is the upper limits of normal",
                "cardiac silhouette size is mildly enlarged",
                "mildly enlarged cardiac silhouette, likely left ventricular enlargement. other chambers are less prominent in size",
                "tortuous aorta with mildly prominent cardiac silhouette",
            ],
        ),
        ("location", &[""]),
    ],
};

const CONSOLIDATION: PromptTemplate = PromptTemplate {
    class: "Consolidation",
    components: &[
        ("severity", &["", "increased", "improved", "apperance of"]),
        (
            "subtype",
            &[
                "bilateral consolidation",
                "reticular consolidation",
                "retrocardiac consolidation",
                "patchy consolidation",
                "airspace consolidation",
                "partial consolidation",
            ],
        ),
        (
            "location",
            &[
                "at the lower lung zone",
                "at the upper lung zone",
                "at the left lower lobe",
                "at the right lower lobe",
                "at the left upper lobe",
                "at the right uppper lobe",
                "at the right lung base",
                "at the left lung base",
            ],
        ),
    ],
};

const EDEMA: PromptTemplate = PromptTemplate {
    class: "Edema",
    components: &[
        (
            "severity",
            &[
                "",
                "mild",
                "improvement in",
                "presistent",
                "moderate",
                "decreased",
            ],
        ),
        (
            "subtype",
            &[
                "pulmonary edema",
                "trace interstitial edema",
                "pulmonary interstitial edema",
            ],
        ),
        ("location", &[""]),
    ],
};

// Location precedes subtype for this class.
const PLEURAL_EFFUSION: PromptTemplate = PromptTemplate {
    class: "Pleural Effusion",
    components: &[
        (
            "severity",
            &["", "small", "stable", "large", "decreased", "increased"],
        ),
        ("location", &["left", "right", "tiny"]),
        (
            "subtype",
            &[
                "bilateral pleural effusion",
                "subpulmonic pleural effusion",
                "bilateral pleural effusion",
            ],
        ),
    ],
};

/// CheXpert competition classes.
pub const CHEXPERT_TEMPLATES: &[PromptTemplate] = &[
    ATELECTASIS,
    CARDIOMEGALY,
    CONSOLIDATION,
    EDEMA,
    PLEURAL_EFFUSION,
];

/// COVID-19 findings.
pub const COVID_TEMPLATES: &[PromptTemplate] = &[PromptTemplate {
    class: "COVID",
    components: &[
        ("adjective", &["patchy", "confluent"]),
        ("description", &["ground glass"]),
        ("subtype", &["opacity", "consolidation"]),
        ("location", &["in peripheral", "in mid", "in lower"]),
    ],
}];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    const TINY: PromptTemplate = PromptTemplate {
        class: "Tiny",
        components: &[
            ("severity", &["mild", "severe"]),
            ("subtype", &["edema"]),
            ("location", &["left", "right", "base"]),
        ],
    };

    #[test]
    fn test_candidates_cross_product_order() {
        let c = TINY.candidates();
        assert_eq!(
            c,
            vec![
                "mild edema left",
                "mild edema right",
                "mild edema base",
                "severe edema left",
                "severe edema right",
                "severe edema base",
            ]
        );
    }

    #[test]
    fn test_candidate_count_is_product_of_lengths() {
        for domain in [PromptDomain::Chexpert, PromptDomain::Covid] {
            for template in domain.templates() {
                let expected: usize = template.components.iter().map(|(_, p)| p.len()).product();
                assert_eq!(template.candidates().len(), expected, "{}", template.class);
                assert_eq!(template.candidate_count(), expected);
            }
        }
        assert_eq!(ATELECTASIS.candidate_count(), 3 * 7 * 10);
        assert_eq!(COVID_TEMPLATES[0].candidate_count(), 12);
    }

    #[test]
    fn test_empty_phrases_keep_separators() {
        let c = EDEMA.candidates();
        assert_eq!(c[0], " pulmonary edema ");
        assert_eq!(c[3], "mild pulmonary edema ");
    }

    #[test]
    fn test_covid_four_components() {
        let c = COVID_TEMPLATES[0].candidates();
        assert_eq!(c[0], "patchy ground glass opacity in peripheral");
        assert_eq!(c[11], "confluent ground glass consolidation in lower");
    }

    #[test]
    fn test_generate_without_n_keeps_all() {
        let mut rng = StdRng::seed_from_u64(0);
        let prompts = generate_template_prompts(&[TINY], None, &mut rng);
        assert_eq!(prompts.get("Tiny").unwrap(), TINY.candidates().as_slice());
    }

    #[test]
    fn test_generate_large_n_keeps_all_unchanged() {
        let mut rng = StdRng::seed_from_u64(0);
        let prompts = generate_template_prompts(&[TINY], Some(6), &mut rng);
        assert_eq!(prompts.get("Tiny").unwrap(), TINY.candidates().as_slice());

        let prompts = generate_template_prompts(&[TINY], Some(100), &mut rng);
        assert_eq!(prompts.get("Tiny").unwrap(), TINY.candidates().as_slice());
    }

    #[test]
    fn test_generate_small_n_samples_unique_candidates() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates: HashSet<String> = ATELECTASIS.candidates().into_iter().collect();
        let prompts = generate_template_prompts(&[ATELECTASIS], Some(10), &mut rng);
        let sampled = prompts.get("Atelectasis").unwrap();

        assert_eq!(sampled.len(), 10);
        let unique: HashSet<&String> = sampled.iter().collect();
        assert_eq!(unique.len(), 10);
        assert!(sampled.iter().all(|p| candidates.contains(p)));
    }

    #[test]
    fn test_generate_same_seed_same_sample() {
        let a = generate_template_prompts(
            CHEXPERT_TEMPLATES,
            Some(10),
            &mut StdRng::seed_from_u64(7),
        );
        let b = generate_template_prompts(
            CHEXPERT_TEMPLATES,
            Some(10),
            &mut StdRng::seed_from_u64(7),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_chexpert_class_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let prompts = generate_template_prompts(CHEXPERT_TEMPLATES, Some(10), &mut rng);
        assert_eq!(
            prompts.class_names(),
            vec![
                "Atelectasis",
                "Cardiomegaly",
                "Consolidation",
                "Edema",
                "Pleural Effusion"
            ]
        );
        // Edema has only 18 candidates but still gets 10
        assert_eq!(prompts.get("Edema").unwrap().len(), 10);
    }

    #[test]
    fn test_domain_serde_lowercase() {
        let d: PromptDomain = serde_json::from_str("\"covid\"").unwrap();
        assert_eq!(d, PromptDomain::Covid);
        assert_eq!(PromptDomain::Chexpert.to_string(), "chexpert");
    }
}
