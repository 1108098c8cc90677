// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Canonical text from direct input or OCR fragments

use crate::error::{ExplainError, Result};
use crate::ocr::OcrFragment;

/// Turns raw input into the single string handed to the explainer
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer {
    /// OCR fragments below this confidence are discarded
    min_confidence: f64,
}

impl TextNormalizer {
    pub fn new(min_confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(ExplainError::Config(format!(
                "OCR confidence threshold {} outside [0, 1]",
                min_confidence
            )));
        }
        Ok(Self { min_confidence })
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Trimmed direct text; blank input reports `NoTextExtracted`
    pub fn normalize_text(&self, raw: &str) -> Result<String> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ExplainError::NoTextExtracted);
        }
        Ok(text.to_string())
    }

    /// Space-join OCR fragments in reading order
    pub fn join_fragments(&self, fragments: &[OcrFragment]) -> Result<String> {
        let kept: Vec<&str> = fragments
            .iter()
            .filter(|f| f.confidence >= self.min_confidence)
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let dropped = fragments.len() - kept.len();
        if dropped > 0 {
            tracing::warn!(
                "Dropped {} of {} OCR fragment(s) (blank or below confidence {:.2})",
                dropped,
                fragments.len(),
                self.min_confidence
            );
        }

        if kept.is_empty() {
            return Err(ExplainError::NoTextExtracted);
        }
        Ok(kept.join(" "))
    }
}
