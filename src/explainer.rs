// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! LIME-style local explainer
//!
//! For one input text:
//! 1. draw seeded word-deletion perturbations,
//! 2. classify all of them in a single batch,
//! 3. weight each perturbation by its closeness to the input,
//! 4. fit a linear surrogate from token presence to the target probability,
//! 5. report the K tokens with the largest surrogate weights.

use crate::classifier::Classifier;
use crate::error::{ExplainError, Result};
use crate::explainability::{LocalExplanation, WordWeight};
use crate::labels::ClassLabel;
use crate::sampler::PerturbationSampler;
use crate::surrogate::{select_features, FeatureSelection, LocalityKernel, RidgeRegression, SurrogateFitter};
use std::sync::Arc;

/// Default perturbation budget
pub const DEFAULT_NUM_SAMPLES: usize = 300;

/// Default number of reported words
pub const DEFAULT_NUM_FEATURES: usize = 5;

/// Default sampling seed
pub const DEFAULT_SEED: u64 = 42;

/// Explains a classifier's output for individual texts
///
/// Holds only immutable configuration and a shared classifier, so one
/// explainer can serve concurrent requests.
#[derive(Clone)]
pub struct LocalExplainer {
    classifier: Arc<dyn Classifier>,
    sampler: PerturbationSampler,
    kernel: LocalityKernel,
    fitter: Arc<dyn SurrogateFitter>,
    selection: FeatureSelection,
    class_pole: Option<ClassLabel>,
    seed: u64,
}

impl LocalExplainer {
    /// Explainer with default sampling, kernel and ridge settings
    ///
    /// Positive weights push toward `Fake` unless another pole is configured.
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            sampler: PerturbationSampler::default(),
            kernel: LocalityKernel::default(),
            fitter: Arc::new(RidgeRegression::default()),
            selection: FeatureSelection::default(),
            class_pole: Some(ClassLabel::Fake),
            seed: DEFAULT_SEED,
        }
    }

    pub fn with_sampler(mut self, sampler: PerturbationSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_kernel(mut self, kernel: LocalityKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_fitter(mut self, fitter: Arc<dyn SurrogateFitter>) -> Self {
        self.fitter = fitter;
        self
    }

    pub fn with_selection(mut self, selection: FeatureSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Class explained when the caller names none; `None` explains the predicted class
    pub fn with_class_pole(mut self, pole: Option<ClassLabel>) -> Self {
        self.class_pole = pole;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn class_pole(&self) -> Option<ClassLabel> {
        self.class_pole
    }

    /// Explain `text` using the configured seed
    pub fn explain(
        &self,
        text: &str,
        target_class: Option<ClassLabel>,
        num_samples: usize,
        num_features: usize,
    ) -> Result<LocalExplanation> {
        self.explain_seeded(text, target_class, num_samples, num_features, self.seed)
    }

    /// Explain `text` with an explicit sampling seed
    pub fn explain_seeded(
        &self,
        text: &str,
        target_class: Option<ClassLabel>,
        num_samples: usize,
        num_features: usize,
        seed: u64,
    ) -> Result<LocalExplanation> {
        check_budget(num_samples, num_features)?;

        let perturbations = self.sampler.sample(text, num_samples, seed)?;
        let texts = perturbations.texts();
        let probabilities = self.classifier.predict_proba(&texts)?;
        if probabilities.len() != texts.len() {
            return Err(ExplainError::InvalidProbabilities(format!(
                "{} returned {} rows for {} texts",
                self.classifier.name(),
                probabilities.len(),
                texts.len()
            )));
        }

        let original = &probabilities[0];
        let target = target_class
            .or(self.class_pole)
            .unwrap_or_else(|| original.argmax());
        let target_probability = original.get(target);

        let tokens = &perturbations.tokens;
        if tokens.len() < 2 {
            tracing::debug!("Only {} distinct token(s); skipping surrogate fit", tokens.len());
            let words = tokens
                .vocabulary
                .iter()
                .map(|word| WordWeight::new(word.clone(), 0.0))
                .collect();
            return Ok(LocalExplanation::trivial(target, target_probability, words));
        }

        let features: Vec<Vec<f64>> = perturbations.samples.iter().map(|s| s.features()).collect();
        let targets: Vec<f64> = probabilities.iter().map(|p| p.get(target)).collect();
        let weights: Vec<f64> = perturbations
            .samples
            .iter()
            .map(|s| self.kernel.weight(LocalityKernel::distance(s.retained(), tokens.len())))
            .collect();

        let selection = select_features(
            self.fitter.as_ref(),
            self.selection,
            &features,
            &targets,
            &weights,
            num_features,
        )?;

        tracing::debug!(
            "Surrogate for {} over {} samples x {} tokens: R² = {:.4}, intercept = {:.4}",
            target,
            perturbations.len(),
            tokens.len(),
            selection.score,
            selection.intercept
        );

        let words = selection
            .features
            .iter()
            .map(|&(idx, weight)| WordWeight::new(tokens.vocabulary[idx].clone(), weight))
            .collect();

        Ok(LocalExplanation {
            target,
            target_probability,
            words,
            intercept: selection.intercept,
            score: selection.score,
            local_prediction: selection.local_prediction,
            num_samples: perturbations.len(),
        })
    }
}

pub(crate) fn check_budget(num_samples: usize, num_features: usize) -> Result<()> {
    if num_samples == 0 {
        return Err(ExplainError::InvalidSampleBudget {
            what: "num_samples",
            value: num_samples,
        });
    }
    if num_features == 0 {
        return Err(ExplainError::InvalidSampleBudget {
            what: "num_features",
            value: num_features,
        });
    }
    Ok(())
}
