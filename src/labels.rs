// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Class labels and per-text probability vectors

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Tolerance for the probability-sum invariant
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Binary news label, ordered as the classifier's probability columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassLabel {
    /// Fabricated or misleading news (column 0)
    Fake,
    /// Genuine news (column 1)
    Real,
}

impl ClassLabel {
    /// All labels in column order
    pub const ALL: [ClassLabel; 2] = [ClassLabel::Fake, ClassLabel::Real];

    /// Column index in a probability vector
    pub fn index(&self) -> usize {
        match self {
            ClassLabel::Fake => 0,
            ClassLabel::Real => 1,
        }
    }

    /// Label for a probability column
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassLabel::Fake => "Fake",
            ClassLabel::Real => "Real",
        }
    }

    /// The other label
    pub fn opposite(&self) -> Self {
        match self {
            ClassLabel::Fake => ClassLabel::Real,
            ClassLabel::Real => ClassLabel::Fake,
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassLabel {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "fake" | "fake news" | "0" => Ok(ClassLabel::Fake),
            "real" | "real news" | "1" => Ok(ClassLabel::Real),
            _ => Err(ExplainError::Config(format!("unknown class label '{}'", s))),
        }
    }
}

impl Serialize for ClassLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClassLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Class probabilities for one text, one entry per [`ClassLabel`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityVector(Vec<f64>);

impl ProbabilityVector {
    /// Validate and wrap raw probabilities
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() != ClassLabel::ALL.len() {
            return Err(ExplainError::InvalidProbabilities(format!(
                "expected {} columns, got {}",
                ClassLabel::ALL.len(),
                values.len()
            )));
        }
        if let Some(bad) = values.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
            return Err(ExplainError::InvalidProbabilities(format!(
                "entry {} outside [0, 1]",
                bad
            )));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ExplainError::InvalidProbabilities(format!(
                "entries sum to {:.8}",
                sum
            )));
        }
        Ok(Self(values))
    }

    pub fn get(&self, label: ClassLabel) -> f64 {
        self.0[label.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Most probable label; ties resolve to the lower column index
    pub fn argmax(&self) -> ClassLabel {
        let mut best = 0;
        for (i, p) in self.0.iter().enumerate().skip(1) {
            if *p > self.0[best] {
                best = i;
            }
        }
        ClassLabel::ALL[best]
    }
}
