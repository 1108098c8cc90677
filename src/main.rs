// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Explain a fake-news verdict from the command line
//!
//! Usage:
//!   disinfo-explain --text "Breaking: aliens land in city"
//!   disinfo-explain --image-url https://example.org/headline.png --pretty
//!   echo '{"type":"text","value":"..."}' | disinfo-explain --stdin

use anyhow::{bail, Context, Result};
use clap::Parser;
use disinfo_explain::labels::ClassLabel;
use disinfo_explain::pipeline::{DetectionPipeline, ProcessRequest};
use disinfo_explain::surrogate::{FeatureSelection, KernelKind};
use disinfo_explain::Config;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "disinfo-explain")]
#[command(about = "Classify text as real or fake news and explain the verdict")]
#[command(version)]
struct Args {
    /// Text to classify
    #[arg(short, long, conflicts_with_all = ["image_url", "stdin"])]
    text: Option<String>,

    /// URL of an image whose text should be classified
    #[arg(short, long, conflicts_with = "stdin")]
    image_url: Option<String>,

    /// Read a JSON request ({"type": "text"|"image", "value": ...}) from stdin
    #[arg(long)]
    stdin: bool,

    /// Classifier parameter file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Expected SHA-256 of the parameter file
    #[arg(long)]
    model_sha256: Option<String>,

    /// Perturbations per explanation
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Words to report
    #[arg(short = 'k', long)]
    features: Option<usize>,

    /// Sampling seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Class to explain (fake, real); defaults to the configured pole
    #[arg(long)]
    target: Option<ClassLabel>,

    /// Locality kernel (exponential, uniform)
    #[arg(long, value_parser = parse_kernel)]
    kernel: Option<KernelKind>,

    /// Feature selection (highest-weights, forward-selection, auto)
    #[arg(long, value_parser = parse_selection)]
    selection: Option<FeatureSelection>,

    /// Include probabilities and surrogate diagnostics
    #[arg(long)]
    detailed: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn parse_kernel(value: &str) -> std::result::Result<KernelKind, String> {
    match value.to_ascii_lowercase().as_str() {
        "exponential" => Ok(KernelKind::Exponential),
        "uniform" => Ok(KernelKind::Uniform),
        other => Err(format!("unknown kernel '{}'", other)),
    }
}

fn parse_selection(value: &str) -> std::result::Result<FeatureSelection, String> {
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "highest-weights" => Ok(FeatureSelection::HighestWeights),
        "forward-selection" => Ok(FeatureSelection::ForwardSelection),
        "auto" => Ok(FeatureSelection::Auto),
        other => Err(format!("unknown feature selection '{}'", other)),
    }
}

impl Args {
    fn request(&self) -> Result<ProcessRequest> {
        if let Some(text) = &self.text {
            return Ok(ProcessRequest::Text(text.clone()));
        }
        if let Some(url) = &self.image_url {
            return Ok(ProcessRequest::Image(url.clone()));
        }
        if self.stdin {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read request from stdin")?;
            return serde_json::from_str(&raw).context("Invalid request JSON on stdin");
        }
        bail!("Provide one of --text, --image-url or --stdin");
    }

    fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model_path = model.clone();
        }
        if let Some(sha) = &self.model_sha256 {
            config.model_sha256 = Some(sha.clone());
        }
        if let Some(n) = self.samples {
            config.num_samples = n;
        }
        if let Some(k) = self.features {
            config.num_features = k;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(kernel) = self.kernel {
            config.kernel = kernel;
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the JSON result
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let request = args.request()?;

    let mut config = Config::from_env().context("Invalid DISINFO_* environment")?;
    args.apply(&mut config);

    tracing::info!("Model: {}", config.model_path.display());
    tracing::info!("Samples: {}, features: {}, seed: {}", config.num_samples, config.num_features, config.seed);

    let pipeline = DetectionPipeline::from_config(&config)
        .with_context(|| format!("Failed to initialise pipeline from {}", config.model_path.display()))?
        .with_target(args.target);

    let output = if args.detailed {
        let detailed = pipeline.process_detailed(&request)?;
        tracing::info!("{}", detailed.local.summary().replace('\n', " | "));
        to_json(&detailed, args.pretty)?
    } else {
        to_json(&pipeline.process(&request)?, args.pretty)?
    };

    println!("{}", output);
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
