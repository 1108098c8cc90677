// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Runtime configuration
//!
//! Layering, lowest to highest priority:
//! - built-in defaults
//! - `DISINFO_*` environment variables (a `.env` file is honoured)
//! - command-line flags, applied by the binaries

use crate::classifier::{Classifier, TfIdfClassifier};
use crate::error::{ExplainError, Result};
use crate::explainer::{LocalExplainer, DEFAULT_NUM_FEATURES, DEFAULT_NUM_SAMPLES, DEFAULT_SEED};
use crate::labels::ClassLabel;
use crate::normalize::TextNormalizer;
use crate::ocr::DEFAULT_OCR_LANGUAGES;
use crate::sampler::{PerturbationSampler, TokenPattern, DEFAULT_KEEP_PROBABILITY};
use crate::surrogate::{
    FeatureSelection, KernelKind, LocalityKernel, RidgeRegression, DEFAULT_KERNEL_WIDTH, DEFAULT_RIDGE_ALPHA,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "DISINFO_";

/// Default location of the classifier parameter file
pub const DEFAULT_MODEL_PATH: &str = "models/news-tfidf.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Classifier parameter file
    pub model_path: PathBuf,

    /// Expected SHA-256 of the parameter file (hex)
    pub model_sha256: Option<String>,

    /// Perturbations per explanation, including the original text
    pub num_samples: usize,

    /// Words reported per explanation
    pub num_features: usize,

    pub seed: u64,

    pub keep_probability: f64,

    pub kernel: KernelKind,

    pub kernel_width: f64,

    pub ridge_alpha: f64,

    pub selection: FeatureSelection,

    /// Class explained by default; `None` explains the predicted class
    pub class_pole: Option<ClassLabel>,

    pub token_pattern: TokenPattern,

    /// Tesseract language codes
    pub ocr_languages: String,

    /// Minimum OCR fragment confidence in [0, 1]
    pub ocr_min_confidence: f64,

    /// Image download timeout
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_sha256: None,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_features: DEFAULT_NUM_FEATURES,
            seed: DEFAULT_SEED,
            keep_probability: DEFAULT_KEEP_PROBABILITY,
            kernel: KernelKind::Exponential,
            kernel_width: DEFAULT_KERNEL_WIDTH,
            ridge_alpha: DEFAULT_RIDGE_ALPHA,
            selection: FeatureSelection::Auto,
            class_pole: Some(ClassLabel::Fake),
            token_pattern: TokenPattern::Word,
            ocr_languages: DEFAULT_OCR_LANGUAGES.to_string(),
            ocr_min_confidence: 0.0,
            fetch_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply `DISINFO_*` overrides read through `lookup` on top of the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = var("MODEL_PATH") {
            config.model_path = PathBuf::from(v);
        }
        if let Some(v) = var("MODEL_SHA256") {
            config.model_sha256 = Some(v);
        }
        if let Some(v) = var("NUM_SAMPLES") {
            config.num_samples = parse_var("NUM_SAMPLES", &v)?;
        }
        if let Some(v) = var("NUM_FEATURES") {
            config.num_features = parse_var("NUM_FEATURES", &v)?;
        }
        if let Some(v) = var("SEED") {
            config.seed = parse_var("SEED", &v)?;
        }
        if let Some(v) = var("KEEP_PROBABILITY") {
            config.keep_probability = parse_var("KEEP_PROBABILITY", &v)?;
        }
        if let Some(v) = var("KERNEL") {
            config.kernel = parse_enum("KERNEL", &v)?;
        }
        if let Some(v) = var("KERNEL_WIDTH") {
            config.kernel_width = parse_var("KERNEL_WIDTH", &v)?;
        }
        if let Some(v) = var("RIDGE_ALPHA") {
            config.ridge_alpha = parse_var("RIDGE_ALPHA", &v)?;
        }
        if let Some(v) = var("SELECTION") {
            config.selection = parse_enum("SELECTION", &v)?;
        }
        if let Some(v) = var("CLASS_POLE") {
            config.class_pole = parse_pole(&v)?;
        }
        if let Some(v) = var("TOKEN_PATTERN") {
            config.token_pattern = parse_enum("TOKEN_PATTERN", &v)?;
        }
        if let Some(v) = var("OCR_LANGUAGES") {
            config.ocr_languages = v;
        }
        if let Some(v) = var("OCR_MIN_CONFIDENCE") {
            config.ocr_min_confidence = parse_var("OCR_MIN_CONFIDENCE", &v)?;
            TextNormalizer::new(config.ocr_min_confidence)?;
        }
        if let Some(v) = var("FETCH_TIMEOUT_SECS") {
            config.fetch_timeout_secs = parse_var("FETCH_TIMEOUT_SECS", &v)?;
        }

        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Load the configured classifier, verifying its checksum when one is set
    pub fn load_classifier(&self) -> Result<Arc<dyn Classifier>> {
        let classifier = match &self.model_sha256 {
            Some(sha) => TfIdfClassifier::load_verified(&self.model_path, sha)?,
            None => TfIdfClassifier::load(&self.model_path)?,
        };
        Ok(Arc::new(classifier))
    }

    /// Build an explainer around `classifier` from these settings
    pub fn explainer(&self, classifier: Arc<dyn Classifier>) -> Result<LocalExplainer> {
        let sampler = PerturbationSampler::new(self.keep_probability, self.token_pattern)?;
        let kernel = LocalityKernel::new(self.kernel, self.kernel_width)?;
        let fitter = RidgeRegression::new(self.ridge_alpha)?;

        Ok(LocalExplainer::new(classifier)
            .with_sampler(sampler)
            .with_kernel(kernel)
            .with_fitter(Arc::new(fitter))
            .with_selection(self.selection)
            .with_class_pole(self.class_pole)
            .with_seed(self.seed))
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ExplainError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, name, value, e)))
}

/// Parse a snake_case enum through its serde representation
fn parse_enum<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Result<T> {
    let normalized = value.to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|e| ExplainError::Config(format!("{}{}={:?}: {}", ENV_PREFIX, name, value, e)))
}

/// `predicted` (or `none`) explains whichever class the classifier picks
fn parse_pole(value: &str) -> Result<Option<ClassLabel>> {
    match value.to_ascii_lowercase().as_str() {
        "predicted" | "none" => Ok(None),
        _ => parse_var("CLASS_POLE", value).map(Some),
    }
}
