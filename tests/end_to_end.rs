// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! End-to-end runs against the shipped demonstration model

use disinfo_explain::{
    ClassLabel, Classifier, Config, DetectionPipeline, ExplainError, ExplanationAssembler, ProcessRequest,
    StabilityReport, TfIdfClassifier,
};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

fn model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/news-tfidf.json")
}

fn config() -> Config {
    Config {
        model_path: model_path(),
        ..Config::default()
    }
}

fn assembler() -> ExplanationAssembler {
    let config = config();
    let classifier = config.load_classifier().unwrap();
    ExplanationAssembler::new(config.explainer(classifier).unwrap())
}

#[test]
fn test_demo_model_loads_with_checksum() {
    let raw = std::fs::read(model_path()).unwrap();
    let sha = hex::encode(Sha256::digest(&raw));

    let classifier = TfIdfClassifier::load_verified(&model_path(), &sha).unwrap();
    assert!(classifier.n_features() > 20);

    let probabilities = classifier
        .predict_proba(&["Breaking: aliens land in city".to_string(), String::new()])
        .unwrap();
    for p in &probabilities {
        let sum: f64 = p.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(p.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }
}

#[test]
fn test_sensational_headline() {
    let result = assembler().explain("Breaking: aliens land in city", None, 300, 5).unwrap();
    assert_eq!(result.verdict(), ClassLabel::Fake);
    assert_eq!(result.words().len(), 5);
    assert_eq!(result.words()[0].word, "aliens");
    assert!(result.words()[0].weight > 0.0);

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["verdict"], "Fake");
    for word in json["words"].as_array().unwrap() {
        let weight = word["weight"].as_str().unwrap();
        let digits = weight.trim_start_matches('-');
        assert_eq!(digits.split('.').nth(1).map(str::len), Some(4), "weight {}", weight);
    }
}

#[test]
fn test_sourced_report() {
    let text = "According to an official statement, the ministry confirmed the budget data";
    let result = assembler().explain(text, None, 300, 5).unwrap();
    assert_eq!(result.verdict(), ClassLabel::Real);
    assert_eq!(result.words().len(), 5);
    // Default pole is Fake: sourcing words push away from it
    assert!(result.words().iter().take(2).all(|w| w.weight < 0.0));
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let text = "Shocking secret cure exposed, government report says";
    let a = assembler().explain(text, None, 300, 5).unwrap();
    let b = assembler().explain(text, None, 300, 5).unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn test_shared_assembler_across_threads() {
    let assembler = Arc::new(assembler());
    let text = "Viral hoax about miracle cure banned by the agency";
    let expected = assembler.explain(text, None, 200, 5).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let assembler = Arc::clone(&assembler);
            std::thread::spawn(move || assembler.explain(text, None, 200, 5).unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_pipeline_requests() {
    let pipeline = DetectionPipeline::from_config(&config()).unwrap();

    let request: ProcessRequest =
        serde_json::from_str(r#"{"type":"text","value":"Breaking: aliens land in city"}"#).unwrap();
    let result = pipeline.process(&request).unwrap();
    assert_eq!(result.verdict(), ClassLabel::Fake);

    // Blank input explains the empty string; the intercepts favour Real
    let blank = pipeline.process_text("   ").unwrap();
    assert!(blank.words().is_empty());
    assert_eq!(blank.verdict(), ClassLabel::Real);
}

#[test]
fn test_zero_samples_rejected() {
    let err = assembler().explain("Breaking: aliens land in city", None, 0, 5).unwrap_err();
    assert!(matches!(err, ExplainError::InvalidSampleBudget { .. }));
}

#[test]
fn test_stability_over_seeds() {
    let report = StabilityReport::measure(
        &assembler(),
        "Breaking: aliens land in city",
        None,
        &[1, 2, 3, 4, 5],
        300,
        2,
    )
    .unwrap();
    assert_eq!(report.verdict, ClassLabel::Fake);
    assert_eq!(report.words[0].word, "aliens");
    assert!(report.sign_agreement > 0.9);
}
