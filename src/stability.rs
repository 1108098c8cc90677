// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explanation stability across sampling seeds
//!
//! Explanations are sampled, so different seeds can rank words differently.
//! This module quantifies how much:
//! - Top-K overlap between runs (mean pairwise Jaccard)
//! - Sign agreement with the first run
//! - Per-word mean and spread of the weights

use crate::assembler::ExplanationAssembler;
use crate::error::{ExplainError, Result};
use crate::explainability::LocalExplanation;
use crate::labels::ClassLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Weight statistics for one word across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordStability {
    pub word: String,
    /// Number of runs that reported this word
    pub appearances: usize,
    pub mean_weight: f64,
    /// Population standard deviation over the runs that reported the word
    pub std_weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityReport {
    pub generated_at: DateTime<Utc>,
    pub verdict: ClassLabel,
    pub target: ClassLabel,
    pub seeds: Vec<u64>,
    pub num_samples: usize,
    pub num_features: usize,
    /// Mean Jaccard overlap of the reported word sets over all run pairs
    pub mean_jaccard: f64,
    /// Fraction of first-run words reported with the same sign by later runs
    pub sign_agreement: f64,
    /// Ranked by |mean weight|
    pub words: Vec<WordStability>,
}

impl StabilityReport {
    /// Explain `text` once per seed and summarise the agreement
    pub fn measure(
        assembler: &ExplanationAssembler,
        text: &str,
        target_class: Option<ClassLabel>,
        seeds: &[u64],
        num_samples: usize,
        num_features: usize,
    ) -> Result<Self> {
        if seeds.is_empty() {
            return Err(ExplainError::InvalidSampleBudget { what: "runs", value: 0 });
        }

        let explainer = assembler.explainer();
        let runs = seeds
            .iter()
            .map(|&seed| explainer.explain_seeded(text, target_class, num_samples, num_features, seed))
            .collect::<Result<Vec<LocalExplanation>>>()?;
        let verdict = explainer.classifier().predict(text)?.argmax();

        let report = Self::from_runs(verdict, seeds.to_vec(), num_samples, num_features, &runs);
        tracing::info!(
            "Stability over {} run(s): Jaccard {:.3}, sign agreement {:.3}",
            seeds.len(),
            report.mean_jaccard,
            report.sign_agreement
        );
        Ok(report)
    }

    fn from_runs(
        verdict: ClassLabel,
        seeds: Vec<u64>,
        num_samples: usize,
        num_features: usize,
        runs: &[LocalExplanation],
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            verdict,
            target: runs.first().map(|r| r.target).unwrap_or(verdict),
            seeds,
            num_samples,
            num_features,
            mean_jaccard: mean_pairwise_jaccard(runs),
            sign_agreement: sign_agreement(runs),
            words: word_statistics(runs),
        }
    }

    /// Format as human-readable string
    pub fn format(&self) -> String {
        let mut out = format!(
            r#"Explanation Stability
=====================
Generated:       {}
Verdict:         {}
Explained class: {}
Runs:            {}
Samples / run:   {}
Features / run:  {}
Mean Jaccard:    {:.2}%
Sign Agreement:  {:.2}%
"#,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.verdict,
            self.target,
            self.seeds.len(),
            self.num_samples,
            self.num_features,
            self.mean_jaccard * 100.0,
            self.sign_agreement * 100.0,
        );

        out.push_str("\nWord                 Runs   Mean      Std\n");
        for w in &self.words {
            out.push_str(&format!(
                "{:<20} {:>4}   {:>7.4}   {:.4}\n",
                w.word, w.appearances, w.mean_weight, w.std_weight
            ));
        }
        out
    }
}

fn word_set(run: &LocalExplanation) -> BTreeSet<&str> {
    run.words.iter().map(|w| w.word.as_str()).collect()
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn mean_pairwise_jaccard(runs: &[LocalExplanation]) -> f64 {
    let sets: Vec<BTreeSet<&str>> = runs.iter().map(word_set).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += jaccard(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        1.0
    } else {
        total / pairs as f64
    }
}

fn sign_agreement(runs: &[LocalExplanation]) -> f64 {
    let Some((first, rest)) = runs.split_first() else {
        return 1.0;
    };

    let mut checked = 0usize;
    let mut agreed = 0usize;
    for run in rest {
        let signs: HashMap<&str, f64> = run.words.iter().map(|w| (w.word.as_str(), w.weight.signum())).collect();
        for word in &first.words {
            checked += 1;
            if signs.get(word.word.as_str()) == Some(&word.weight.signum()) {
                agreed += 1;
            }
        }
    }

    if checked == 0 {
        1.0
    } else {
        agreed as f64 / checked as f64
    }
}

fn word_statistics(runs: &[LocalExplanation]) -> Vec<WordStability> {
    // First-appearance order keeps ties deterministic
    let mut order: Vec<&str> = Vec::new();
    let mut weights: HashMap<&str, Vec<f64>> = HashMap::new();
    for run in runs {
        for w in &run.words {
            let entry = weights.entry(w.word.as_str()).or_default();
            if entry.is_empty() {
                order.push(w.word.as_str());
            }
            entry.push(w.weight);
        }
    }

    let mut stats: Vec<WordStability> = order
        .into_iter()
        .map(|word| {
            let values = &weights[word];
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            WordStability {
                word: word.to_string(),
                appearances: values.len(),
                mean_weight: mean,
                std_weight: variance.sqrt(),
            }
        })
        .collect();

    stats.sort_by(|a, b| b.mean_weight.abs().total_cmp(&a.mean_weight.abs()));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_support::KeywordStub;
    use crate::explainability::WordWeight;
    use crate::explainer::LocalExplainer;
    use std::sync::Arc;

    fn run(words: &[(&str, f64)]) -> LocalExplanation {
        LocalExplanation {
            target: ClassLabel::Fake,
            target_probability: 0.9,
            words: words.iter().map(|(w, x)| WordWeight::new(*w, *x)).collect(),
            intercept: 0.5,
            score: 0.8,
            local_prediction: 0.85,
            num_samples: 100,
        }
    }

    #[test]
    fn test_identical_runs_are_fully_stable() {
        let runs = vec![run(&[("aliens", 0.4), ("official", -0.2)]); 3];
        assert_eq!(mean_pairwise_jaccard(&runs), 1.0);
        assert_eq!(sign_agreement(&runs), 1.0);

        let stats = word_statistics(&runs);
        assert_eq!(stats[0].word, "aliens");
        assert_eq!(stats[0].appearances, 3);
        assert!((stats[0].mean_weight - 0.4).abs() < 1e-12);
        assert!(stats[0].std_weight.abs() < 1e-12);
    }

    #[test]
    fn test_partial_overlap() {
        let runs = vec![
            run(&[("aliens", 0.4), ("official", -0.2)]),
            run(&[("aliens", 0.2), ("city", 0.1)]),
        ];
        assert!((mean_pairwise_jaccard(&runs) - 1.0 / 3.0).abs() < 1e-12);
        // "aliens" agrees, "official" is missing from the second run
        assert!((sign_agreement(&runs) - 0.5).abs() < 1e-12);

        let stats = word_statistics(&runs);
        let aliens = stats.iter().find(|s| s.word == "aliens").unwrap();
        assert!((aliens.mean_weight - 0.3).abs() < 1e-12);
        assert!((aliens.std_weight - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_flipped_sign_disagrees() {
        let runs = vec![run(&[("city", 0.1)]), run(&[("city", -0.1)])];
        assert_eq!(mean_pairwise_jaccard(&runs), 1.0);
        assert_eq!(sign_agreement(&runs), 0.0);
    }

    #[test]
    fn test_measure_with_stub() {
        let assembler = ExplanationAssembler::new(LocalExplainer::new(Arc::new(KeywordStub::news())));
        let report = StabilityReport::measure(
            &assembler,
            "Breaking: aliens land in city",
            None,
            &[1, 2, 3, 4],
            400,
            2,
        )
        .unwrap();

        assert_eq!(report.verdict, ClassLabel::Fake);
        assert_eq!(report.seeds.len(), 4);
        assert!(report.mean_jaccard > 0.99);
        assert!(report.sign_agreement > 0.99);
        assert_eq!(report.words[0].word, "aliens");
        assert!(report.format().contains("Mean Jaccard"));
    }

    #[test]
    fn test_no_seeds_rejected() {
        let assembler = ExplanationAssembler::new(LocalExplainer::new(Arc::new(KeywordStub::news())));
        let err = StabilityReport::measure(&assembler, "aliens land", None, &[], 100, 5).unwrap_err();
        assert!(matches!(err, ExplainError::InvalidSampleBudget { what: "runs", .. }));
    }
}
