// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for the explanation pipeline
//!
//! Only `ClassifierUnavailable` is fatal; it is raised while loading the
//! classifier at startup. Every other variant is scoped to a single request.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExplainError>;

#[derive(Debug, Error)]
pub enum ExplainError {
    /// Classifier parameters are missing or corrupt
    #[error("classifier unavailable ({}): {reason}", path.display())]
    ClassifierUnavailable { path: PathBuf, reason: String },

    /// Sample budget or feature count was zero
    #[error("invalid {what}: {value} (must be at least 1)")]
    InvalidSampleBudget { what: &'static str, value: usize },

    /// Normalization produced no usable text
    #[error("no text extracted from input")]
    NoTextExtracted,

    /// The classifier refused an empty input string
    #[error("classifier rejected empty input")]
    EmptyInput,

    /// Image retrieval failed
    #[error("failed to fetch {url}: {reason}")]
    ExternalFetchFailed { url: String, reason: String },

    /// OCR engine could not run or produced unreadable output
    #[error("ocr failed: {0}")]
    OcrFailed(String),

    /// Classifier output broke the probability vector invariants
    #[error("invalid probabilities: {0}")]
    InvalidProbabilities(String),

    /// Surrogate regression could not be solved
    #[error("surrogate fit failed: {0}")]
    SurrogateFit(String),

    /// Bad configuration value
    #[error("configuration error: {0}")]
    Config(String),
}

impl ExplainError {
    /// Whether the process should refuse to keep serving
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExplainError::ClassifierUnavailable { .. })
    }

    pub(crate) fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExplainError::ClassifierUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
