// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Merges the classifier verdict with the explainer's word weights

use crate::classifier::Classifier;
use crate::error::Result;
use crate::explainability::{ExplanationResult, LocalExplanation};
use crate::explainer::{check_budget, LocalExplainer};
use crate::labels::{ClassLabel, ProbabilityVector};
use serde::Serialize;
use std::sync::Arc;

/// Everything computed for one request
#[derive(Debug, Clone, Serialize)]
pub struct DetailedExplanation {
    pub result: ExplanationResult,
    /// Direct prediction on the untouched input
    pub probabilities: ProbabilityVector,
    pub local: LocalExplanation,
}

/// Produces [`ExplanationResult`]s
#[derive(Clone)]
pub struct ExplanationAssembler {
    classifier: Arc<dyn Classifier>,
    explainer: LocalExplainer,
}

impl ExplanationAssembler {
    pub fn new(explainer: LocalExplainer) -> Self {
        Self {
            classifier: Arc::clone(explainer.classifier()),
            explainer,
        }
    }

    pub fn explainer(&self) -> &LocalExplainer {
        &self.explainer
    }

    pub fn explain(
        &self,
        text: &str,
        target_class: Option<ClassLabel>,
        num_samples: usize,
        num_features: usize,
    ) -> Result<ExplanationResult> {
        Ok(self
            .explain_detailed(text, target_class, num_samples, num_features)?
            .result)
    }

    /// The verdict always comes from the direct prediction, never from the surrogate
    pub fn explain_detailed(
        &self,
        text: &str,
        target_class: Option<ClassLabel>,
        num_samples: usize,
        num_features: usize,
    ) -> Result<DetailedExplanation> {
        check_budget(num_samples, num_features)?;

        let local = self.explainer.explain(text, target_class, num_samples, num_features)?;
        let probabilities = self.classifier.predict(text)?;
        let verdict = probabilities.argmax();

        tracing::info!(
            "Verdict {} (P(Fake) = {:.4}) with {} attributed words",
            verdict,
            probabilities.get(ClassLabel::Fake),
            local.words.len()
        );

        Ok(DetailedExplanation {
            result: ExplanationResult::new(verdict, local.words.clone()),
            probabilities,
            local,
        })
    }
}
