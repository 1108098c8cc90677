// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Probabilistic news classifiers
//!
//! The explainer only ever sees the [`Classifier`] trait. The concrete
//! [`TfIdfClassifier`] wraps a fitted TF-IDF vectorizer and a softmax linear
//! model whose parameters are loaded once from a JSON file and never mutated.

use crate::error::{ExplainError, Result};
use crate::labels::{ClassLabel, ProbabilityVector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Black-box probability model over raw text
pub trait Classifier: Send + Sync {
    /// One probability vector per input text, each computed independently
    fn predict_proba(&self, texts: &[String]) -> Result<Vec<ProbabilityVector>>;

    /// Get classifier name
    fn name(&self) -> &str;

    /// Probability column order
    fn labels(&self) -> &[ClassLabel] {
        &ClassLabel::ALL
    }

    /// Predict a single text
    fn predict(&self, text: &str) -> Result<ProbabilityVector> {
        self.predict_proba(&[text.to_string()])?
            .pop()
            .ok_or_else(|| ExplainError::InvalidProbabilities("classifier returned no rows".to_string()))
    }
}

fn default_lowercase() -> bool {
    true
}

fn default_min_token_len() -> usize {
    2
}

/// Serialized parameters of a fitted TF-IDF + linear model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfParams {
    /// Column order of the probability output
    pub labels: Vec<ClassLabel>,
    /// Term -> feature column
    pub vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per feature column
    pub idf: Vec<f64>,
    /// One weight row per label
    pub weights: Vec<Vec<f64>>,
    /// One intercept per label
    pub intercepts: Vec<f64>,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,
    #[serde(default)]
    pub sublinear_tf: bool,
}

impl TfIdfParams {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.labels != ClassLabel::ALL {
            return Err(format!("label order {:?} does not match {:?}", self.labels, ClassLabel::ALL));
        }
        let n_features = self.idf.len();
        if self.vocabulary.len() != n_features {
            return Err(format!(
                "vocabulary has {} terms but idf has {} entries",
                self.vocabulary.len(),
                n_features
            ));
        }
        if let Some((term, col)) = self.vocabulary.iter().find(|(_, col)| **col >= n_features) {
            return Err(format!("term '{}' maps to column {} out of range", term, col));
        }
        if self.weights.len() != self.labels.len() || self.intercepts.len() != self.labels.len() {
            return Err("weights and intercepts need one row per label".to_string());
        }
        if self.weights.iter().any(|row| row.len() != n_features) {
            return Err(format!("every weight row must have {} columns", n_features));
        }
        let all_finite = self
            .idf
            .iter()
            .chain(self.intercepts.iter())
            .chain(self.weights.iter().flatten())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err("parameters contain non-finite values".to_string());
        }
        Ok(())
    }
}

/// TF-IDF vectorizer + softmax linear classifier
#[derive(Debug, Clone)]
pub struct TfIdfClassifier {
    params: TfIdfParams,
    source: PathBuf,
}

impl TfIdfClassifier {
    /// Build from in-memory parameters
    pub fn from_params(params: TfIdfParams) -> Result<Self> {
        Self::checked(params, PathBuf::from("<memory>"))
    }

    /// Load parameters from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| ExplainError::unavailable(path, e.to_string()))?;
        Self::from_json_bytes(path, &raw)
    }

    /// Load parameters after checking the file's SHA-256 digest
    pub fn load_verified(path: &Path, expected_sha256: &str) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| ExplainError::unavailable(path, e.to_string()))?;
        let actual = hex::encode(Sha256::digest(&raw));
        if !actual.eq_ignore_ascii_case(expected_sha256.trim()) {
            return Err(ExplainError::unavailable(
                path,
                format!("checksum mismatch: expected {}, got {}", expected_sha256, actual),
            ));
        }
        tracing::debug!("Model checksum verified: {}", actual);
        Self::from_json_bytes(path, &raw)
    }

    fn from_json_bytes(path: &Path, raw: &[u8]) -> Result<Self> {
        let params: TfIdfParams = serde_json::from_slice(raw)
            .map_err(|e| ExplainError::unavailable(path, format!("invalid parameter file: {}", e)))?;
        Self::checked(params, path.to_path_buf())
    }

    fn checked(params: TfIdfParams, source: PathBuf) -> Result<Self> {
        params
            .validate()
            .map_err(|reason| ExplainError::unavailable(&source, reason))?;
        tracing::info!(
            "Loaded TF-IDF classifier from {} ({} features)",
            source.display(),
            params.idf.len()
        );
        Ok(Self { params, source })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn n_features(&self) -> usize {
        self.params.idf.len()
    }

    fn tokenize<'a>(&self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        let lowercase = self.params.lowercase;
        let min_len = self.params.min_token_len;
        text.split(|c: char| !c.is_alphanumeric())
            .filter(move |s| s.chars().count() >= min_len)
            .map(move |s| if lowercase { s.to_lowercase() } else { s.to_string() })
    }

    /// L2-normalised TF-IDF vector, sparse and ordered by column
    fn compute_tfidf(&self, text: &str) -> BTreeMap<usize, f64> {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in self.tokenize(text) {
            if let Some(&col) = self.params.vocabulary.get(&token) {
                *counts.entry(col).or_insert(0.0) += 1.0;
            }
        }

        for (col, value) in counts.iter_mut() {
            let tf = if self.params.sublinear_tf { 1.0 + value.ln() } else { *value };
            *value = tf * self.params.idf[*col];
        }

        let norm = counts.values().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in counts.values_mut() {
                *value /= norm;
            }
        }
        counts
    }

    fn predict_one(&self, text: &str) -> Result<ProbabilityVector> {
        let tfidf = self.compute_tfidf(text);

        let scores: Vec<f64> = self
            .params
            .weights
            .iter()
            .zip(&self.params.intercepts)
            .map(|(row, intercept)| intercept + tfidf.iter().map(|(col, v)| row[*col] * v).sum::<f64>())
            .collect();

        // Softmax with max subtraction
        let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = scores.iter().map(|s| (s - max_score).exp()).collect();
        let total: f64 = exps.iter().sum();

        ProbabilityVector::new(exps.into_iter().map(|e| e / total).collect())
    }
}

impl Classifier for TfIdfClassifier {
    fn predict_proba(&self, texts: &[String]) -> Result<Vec<ProbabilityVector>> {
        texts.iter().map(|t| self.predict_one(t)).collect()
    }

    fn name(&self) -> &str {
        "TF-IDF"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic stand-in: P(Fake) = sigmoid(bias + sum of keyword weights)
    pub struct KeywordStub {
        pub weights: Vec<(&'static str, f64)>,
        pub bias: f64,
        pub reject_empty: bool,
    }

    impl KeywordStub {
        pub fn new(weights: Vec<(&'static str, f64)>) -> Self {
            Self {
                weights,
                bias: 0.0,
                reject_empty: false,
            }
        }

        /// Fake-leaning on sensational words, Real-leaning on sourcing words
        pub fn news() -> Self {
            Self::new(vec![
                ("breaking", 2.0),
                ("aliens", 3.0),
                ("shocking", 1.5),
                ("official", -2.0),
                ("according", -1.5),
            ])
        }
    }

    impl Classifier for KeywordStub {
        fn predict_proba(&self, texts: &[String]) -> Result<Vec<ProbabilityVector>> {
            texts
                .iter()
                .map(|text| {
                    if self.reject_empty && text.trim().is_empty() {
                        return Err(ExplainError::EmptyInput);
                    }
                    let lower = text.to_lowercase();
                    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
                    let z = self.bias
                        + self
                            .weights
                            .iter()
                            .filter(|(kw, _)| words.contains(kw))
                            .map(|(_, w)| w)
                            .sum::<f64>();
                    let fake = 1.0 / (1.0 + (-z).exp());
                    ProbabilityVector::new(vec![fake, 1.0 - fake])
                })
                .collect()
        }

        fn name(&self) -> &str {
            "keyword-stub"
        }
    }

    pub fn demo_params() -> TfIdfParams {
        let terms = ["breaking", "aliens", "shocking", "official", "according", "city"];
        let vocabulary = terms.iter().enumerate().map(|(i, t)| (t.to_string(), i)).collect();
        TfIdfParams {
            labels: ClassLabel::ALL.to_vec(),
            vocabulary,
            idf: vec![1.5, 2.0, 1.8, 1.2, 1.1, 1.0],
            weights: vec![
                vec![1.2, 2.5, 1.4, -1.6, -1.3, 0.1],
                vec![-1.2, -2.5, -1.4, 1.6, 1.3, -0.1],
            ],
            intercepts: vec![0.0, 0.2],
            lowercase: true,
            min_token_len: 2,
            sublinear_tf: false,
        }
    }
}
