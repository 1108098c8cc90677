// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explanation records
//!
//! Provides:
//! - Signed word attributions
//! - The immutable verdict + words record returned to callers
//! - The richer local explanation produced by the surrogate fit

use crate::labels::ClassLabel;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Decimal places used when presenting weights
pub const WEIGHT_PRECISION: usize = 4;

/// Render a weight with fixed presentation precision
pub fn format_weight(weight: f64) -> String {
    format!("{:.*}", WEIGHT_PRECISION, weight)
}

/// A word and its signed contribution toward the explained class
#[derive(Debug, Clone, PartialEq)]
pub struct WordWeight {
    pub word: String,
    /// Magnitude is influence, sign is direction (positive favours the explained class)
    pub weight: f64,
}

impl WordWeight {
    pub fn new(word: impl Into<String>, weight: f64) -> Self {
        Self {
            word: word.into(),
            weight,
        }
    }

    pub fn formatted_weight(&self) -> String {
        format_weight(self.weight)
    }
}

#[derive(Serialize, Deserialize)]
struct WireWordWeight<W> {
    word: String,
    weight: W,
}

impl Serialize for WordWeight {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireWordWeight {
            word: self.word.clone(),
            weight: self.formatted_weight(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for WordWeight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireWordWeight::<String>::deserialize(deserializer)?;
        let weight = wire
            .weight
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("weight '{}' is not a number", wire.weight)))?;
        Ok(Self {
            word: wire.word,
            weight,
        })
    }
}

/// Verdict plus ranked word attributions for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResult {
    verdict: ClassLabel,
    words: Vec<WordWeight>,
}

impl ExplanationResult {
    pub fn new(verdict: ClassLabel, words: Vec<WordWeight>) -> Self {
        Self { verdict, words }
    }

    pub fn verdict(&self) -> ClassLabel {
        self.verdict
    }

    pub fn words(&self) -> &[WordWeight] {
        &self.words
    }

    /// Get the top N words by attribution magnitude
    pub fn top_words(&self, n: usize) -> &[WordWeight] {
        &self.words[..n.min(self.words.len())]
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Output of the local surrogate fit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalExplanation {
    /// Class whose probability the surrogate approximates
    pub target: ClassLabel,
    /// Classifier probability of `target` for the untouched input
    pub target_probability: f64,
    /// Selected words ranked by |weight|
    pub words: Vec<WordWeight>,
    pub intercept: f64,
    /// Weighted R² of the surrogate on its perturbations
    pub score: f64,
    /// Surrogate prediction for the untouched input
    pub local_prediction: f64,
    /// Number of perturbations actually classified
    pub num_samples: usize,
}

impl LocalExplanation {
    /// Explanation with no attributable words
    pub fn trivial(target: ClassLabel, target_probability: f64, words: Vec<WordWeight>) -> Self {
        Self {
            target,
            target_probability,
            words,
            intercept: target_probability,
            score: 1.0,
            local_prediction: target_probability,
            num_samples: 1,
        }
    }

    /// Words pushing toward the target class
    pub fn supporting(&self) -> impl Iterator<Item = &WordWeight> {
        self.words.iter().filter(|w| w.weight > 0.0)
    }

    /// Words pushing away from the target class
    pub fn opposing(&self) -> impl Iterator<Item = &WordWeight> {
        self.words.iter().filter(|w| w.weight < 0.0)
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "P({}) = {:.3}; surrogate R² = {:.3} over {} perturbations.",
            self.target, self.target_probability, self.score, self.num_samples
        )];

        let toward: Vec<&str> = self.supporting().map(|w| w.word.as_str()).collect();
        let away: Vec<&str> = self.opposing().map(|w| w.word.as_str()).collect();
        if !toward.is_empty() {
            parts.push(format!("Toward {}: {}", self.target, toward.join(", ")));
        }
        if !away.is_empty() {
            parts.push(format!("Toward {}: {}", self.target.opposite(), away.join(", ")));
        }
        parts.join("\n")
    }
}
