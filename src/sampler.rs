// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Word-deletion perturbations for local explanations
//!
//! Each perturbation keeps or drops every distinct token of the input
//! independently. Dropping a token removes all of its occurrences. The first
//! sample is always the untouched input, which anchors the surrogate's
//! intercept.

use crate::error::{ExplainError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default probability of keeping a token in a perturbation
pub const DEFAULT_KEEP_PROBABILITY: f64 = 0.5;

/// How input text is split into candidate feature tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPattern {
    /// Runs of letters, digits and underscores; punctuation separates tokens
    #[default]
    Word,
    /// Whitespace-delimited chunks, punctuation stays attached
    Whitespace,
}

impl TokenPattern {
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self {
            TokenPattern::Word => text
                .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                .filter(|s| !s.is_empty())
                .collect(),
            TokenPattern::Whitespace => text.split_whitespace().collect(),
        }
    }
}

/// Input text as a sequence of occurrences over its distinct tokens
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedText {
    /// Distinct tokens in first-occurrence order
    pub vocabulary: Vec<String>,
    /// Vocabulary index of every token occurrence, in text order
    occurrences: Vec<usize>,
}

impl TokenizedText {
    pub fn new(text: &str, pattern: TokenPattern) -> Self {
        let mut vocabulary = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut occurrences = Vec::new();

        for token in pattern.split(text) {
            let idx = *index.entry(token).or_insert_with(|| {
                vocabulary.push(token.to_string());
                vocabulary.len() - 1
            });
            occurrences.push(idx);
        }

        Self { vocabulary, occurrences }
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Rebuild text keeping only the tokens whose mask entry is set
    pub fn render(&self, mask: &[bool]) -> String {
        self.occurrences
            .iter()
            .filter(|&&idx| mask[idx])
            .map(|&idx| self.vocabulary[idx].as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One perturbed copy of the input
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    pub text: String,
    /// Presence indicator per distinct token (true = retained)
    pub mask: Vec<bool>,
}

impl Perturbation {
    /// Number of retained tokens
    pub fn retained(&self) -> usize {
        self.mask.iter().filter(|&&kept| kept).count()
    }

    /// Mask as 0/1 regression features
    pub fn features(&self) -> Vec<f64> {
        self.mask.iter().map(|&kept| if kept { 1.0 } else { 0.0 }).collect()
    }
}

/// Perturbations of one input, baseline first
#[derive(Debug, Clone)]
pub struct PerturbationSet {
    pub tokens: TokenizedText,
    pub samples: Vec<Perturbation>,
}

impl PerturbationSet {
    pub fn baseline(&self) -> &Perturbation {
        &self.samples[0]
    }

    pub fn texts(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Stateless generator of seeded word-deletion samples
#[derive(Debug, Clone, Copy)]
pub struct PerturbationSampler {
    keep_probability: f64,
    pattern: TokenPattern,
}

impl Default for PerturbationSampler {
    fn default() -> Self {
        Self {
            keep_probability: DEFAULT_KEEP_PROBABILITY,
            pattern: TokenPattern::default(),
        }
    }
}

impl PerturbationSampler {
    pub fn new(keep_probability: f64, pattern: TokenPattern) -> Result<Self> {
        if !(0.0..=1.0).contains(&keep_probability) {
            return Err(ExplainError::Config(format!(
                "keep probability {} outside [0, 1]",
                keep_probability
            )));
        }
        Ok(Self {
            keep_probability,
            pattern,
        })
    }

    pub fn keep_probability(&self) -> f64 {
        self.keep_probability
    }

    pub fn pattern(&self) -> TokenPattern {
        self.pattern
    }

    pub fn tokenize(&self, text: &str) -> TokenizedText {
        TokenizedText::new(text, self.pattern)
    }

    /// Draw `num_samples` perturbations of `text`
    ///
    /// Inputs with fewer than two distinct tokens yield only the original
    /// text, since there is nothing to contrast it with.
    pub fn sample(&self, text: &str, num_samples: usize, seed: u64) -> Result<PerturbationSet> {
        if num_samples == 0 {
            return Err(ExplainError::InvalidSampleBudget {
                what: "num_samples",
                value: num_samples,
            });
        }

        let tokens = self.tokenize(text);
        let n_tokens = tokens.len();
        let baseline = Perturbation {
            text: text.to_string(),
            mask: vec![true; n_tokens],
        };

        if n_tokens < 2 {
            return Ok(PerturbationSet {
                tokens,
                samples: vec![baseline],
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(num_samples);
        samples.push(baseline);

        for _ in 1..num_samples {
            let mask: Vec<bool> = (0..n_tokens).map(|_| rng.gen_bool(self.keep_probability)).collect();
            samples.push(Perturbation {
                text: tokens.render(&mask),
                mask,
            });
        }

        Ok(PerturbationSet { tokens, samples })
    }
}
