// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explainable fake-news classification
//!
//! This crate provides:
//! - A TF-IDF + softmax classifier loaded from a fitted parameter file
//! - LIME-style local explanations: seeded word-deletion perturbations,
//!   locality-weighted ridge surrogates, top-K signed word weights
//! - Verdict + explanation assembly with a stable JSON wire format
//! - Request processing for direct text and image URLs (HTTP fetch + OCR)
//! - Explanation stability measurement across sampling seeds

pub mod assembler;
pub mod classifier;
pub mod config;
pub mod error;
pub mod explainability;
pub mod explainer;
pub mod fetch;
pub mod labels;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod sampler;
pub mod stability;
pub mod surrogate;

pub use assembler::{DetailedExplanation, ExplanationAssembler};
pub use classifier::{Classifier, TfIdfClassifier, TfIdfParams};
pub use config::Config;
pub use error::{ExplainError, Result};
pub use explainability::{ExplanationResult, LocalExplanation, WordWeight};
pub use explainer::LocalExplainer;
pub use fetch::{HttpImageFetcher, ImageSource};
pub use labels::{ClassLabel, ProbabilityVector};
pub use normalize::TextNormalizer;
pub use ocr::{OcrEngine, OcrFragment, TesseractOcr};
pub use pipeline::{DetectionPipeline, ProcessRequest};
pub use sampler::{PerturbationSampler, TokenPattern};
pub use stability::StabilityReport;
pub use surrogate::{FeatureSelection, KernelKind, LocalityKernel, RidgeRegression, SurrogateFitter};
