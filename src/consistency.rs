// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Measure how stable explanations are across sampling seeds
//!
//! Usage:
//!   explain-consistency --text "Breaking: aliens land in city" --runs 10
//!   explain-consistency --text "..." --json > stability.json

use anyhow::{bail, Context, Result};
use clap::Parser;
use disinfo_explain::{Config, ExplanationAssembler, StabilityReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "explain-consistency")]
#[command(about = "Compare explanations of one text across sampling seeds")]
#[command(version)]
struct Args {
    /// Text to explain
    #[arg(short, long)]
    text: String,

    /// Classifier parameter file
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Number of seeded runs
    #[arg(short, long, default_value_t = 10)]
    runs: u64,

    /// First seed; run i uses seed + i
    #[arg(short, long)]
    seed: Option<u64>,

    /// Perturbations per run
    #[arg(short = 'n', long)]
    samples: Option<usize>,

    /// Words per run
    #[arg(short = 'k', long)]
    features: Option<usize>,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.runs == 0 {
        bail!("--runs must be at least 1");
    }

    let mut config = Config::from_env().context("Invalid DISINFO_* environment")?;
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if let Some(n) = args.samples {
        config.num_samples = n;
    }
    if let Some(k) = args.features {
        config.num_features = k;
    }
    let first_seed = args.seed.unwrap_or(config.seed);

    let classifier = config
        .load_classifier()
        .with_context(|| format!("Failed to load classifier from {}", config.model_path.display()))?;
    let assembler = ExplanationAssembler::new(config.explainer(classifier)?);

    let seeds: Vec<u64> = (0..args.runs).map(|i| first_seed.wrapping_add(i)).collect();
    tracing::info!("Running {} explanation(s) starting at seed {}", seeds.len(), first_seed);

    let report = StabilityReport::measure(
        &assembler,
        args.text.trim(),
        None,
        &seeds,
        config.num_samples,
        config.num_features,
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.format());
    }
    Ok(())
}
