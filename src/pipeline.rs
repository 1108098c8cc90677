// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Request-level detection pipeline
//!
//! Orchestrates:
//! - Input normalization (direct text or image URL)
//! - Image download and OCR
//! - Classification and local explanation
//!
//! Requests are independent. The pipeline holds only shared, immutable
//! collaborators, so a failed request leaves it usable for the next one.

use crate::assembler::{DetailedExplanation, ExplanationAssembler};
use crate::config::Config;
use crate::error::{ExplainError, Result};
use crate::explainability::ExplanationResult;
use crate::explainer::{DEFAULT_NUM_FEATURES, DEFAULT_NUM_SAMPLES};
use crate::fetch::{HttpImageFetcher, ImageSource};
use crate::labels::ClassLabel;
use crate::normalize::TextNormalizer;
use crate::ocr::{OcrEngine, TesseractOcr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One detection request, `{"type": "text" | "image", "value": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProcessRequest {
    /// Text typed or pasted by the user
    Text(String),
    /// URL of an image to read the text from
    Image(String),
}

impl ProcessRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessRequest::Text(_) => "text",
            ProcessRequest::Image(_) => "image",
        }
    }
}

/// Image download + OCR, present only when image requests are supported
#[derive(Clone)]
struct ImageSupport {
    source: Arc<dyn ImageSource>,
    ocr: Arc<dyn OcrEngine>,
}

#[derive(Clone)]
pub struct DetectionPipeline {
    assembler: ExplanationAssembler,
    normalizer: TextNormalizer,
    images: Option<ImageSupport>,
    num_samples: usize,
    num_features: usize,
    target_class: Option<ClassLabel>,
}

impl DetectionPipeline {
    /// Text-only pipeline with default budgets
    pub fn new(assembler: ExplanationAssembler) -> Self {
        Self {
            assembler,
            normalizer: TextNormalizer::default(),
            images: None,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_features: DEFAULT_NUM_FEATURES,
            target_class: None,
        }
    }

    /// Full pipeline from configuration: loads the classifier, HTTP fetcher and Tesseract
    pub fn from_config(config: &Config) -> Result<Self> {
        let normalizer = TextNormalizer::new(config.ocr_min_confidence)?;
        let classifier = config.load_classifier()?;
        let assembler = ExplanationAssembler::new(config.explainer(classifier)?);
        let fetcher = HttpImageFetcher::new(config.fetch_timeout())?;

        Ok(Self::new(assembler)
            .with_normalizer(normalizer)
            .with_image_support(Arc::new(fetcher), Arc::new(TesseractOcr::new(&config.ocr_languages)))
            .with_budget(config.num_samples, config.num_features))
    }

    pub fn with_normalizer(mut self, normalizer: TextNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_image_support(mut self, source: Arc<dyn ImageSource>, ocr: Arc<dyn OcrEngine>) -> Self {
        self.images = Some(ImageSupport { source, ocr });
        self
    }

    pub fn with_budget(mut self, num_samples: usize, num_features: usize) -> Self {
        self.num_samples = num_samples;
        self.num_features = num_features;
        self
    }

    pub fn with_target(mut self, target_class: Option<ClassLabel>) -> Self {
        self.target_class = target_class;
        self
    }

    pub fn assembler(&self) -> &ExplanationAssembler {
        &self.assembler
    }

    pub fn process(&self, request: &ProcessRequest) -> Result<ExplanationResult> {
        Ok(self.process_detailed(request)?.result)
    }

    /// Like [`process`](Self::process), keeping probabilities and surrogate diagnostics
    pub fn process_detailed(&self, request: &ProcessRequest) -> Result<DetailedExplanation> {
        tracing::info!("Processing {} request", request.kind());

        let extracted = match request {
            ProcessRequest::Text(raw) => self.normalizer.normalize_text(raw),
            ProcessRequest::Image(url) => self.read_image(url),
        };

        let text = match extracted {
            Ok(text) => text,
            Err(ExplainError::NoTextExtracted) => {
                tracing::warn!("No text extracted from {} input; explaining empty text", request.kind());
                String::new()
            }
            Err(e) => return Err(e),
        };

        self.assembler
            .explain_detailed(&text, self.target_class, self.num_samples, self.num_features)
    }

    pub fn process_text(&self, text: &str) -> Result<ExplanationResult> {
        self.process(&ProcessRequest::Text(text.to_string()))
    }

    pub fn process_image(&self, url: &str) -> Result<ExplanationResult> {
        self.process(&ProcessRequest::Image(url.to_string()))
    }

    fn read_image(&self, url: &str) -> Result<String> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| ExplainError::Config("image requests are not enabled".to_string()))?;

        let bytes = images.source.fetch(url)?;
        let fragments = images.ocr.recognize(&bytes)?;
        tracing::debug!("{} produced {} fragment(s)", images.ocr.name(), fragments.len());
        self.normalizer.join_fragments(&fragments)
    }
}
