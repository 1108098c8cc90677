// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Local surrogate models
//!
//! Provides:
//! - Locality kernel over token-presence masks
//! - Weighted ridge regression solved through the normal equations
//! - Feature selection strategies for picking the top-K tokens

use crate::error::{ExplainError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Default kernel width for the exponential kernel
pub const DEFAULT_KERNEL_WIDTH: f64 = 25.0;

/// Default ridge penalty
pub const DEFAULT_RIDGE_ALPHA: f64 = 1.0;

/// Above this many features `Auto` stops using forward selection
const AUTO_FORWARD_LIMIT: usize = 6;

/// Shape of the locality kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelKind {
    /// sqrt(exp(-d^2 / width^2)) over scaled cosine distance
    #[default]
    Exponential,
    /// Every sample weighs 1 (plain least squares)
    Uniform,
}

/// Weights perturbations by how close they are to the original input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalityKernel {
    kind: KernelKind,
    width: f64,
}

impl Default for LocalityKernel {
    fn default() -> Self {
        Self {
            kind: KernelKind::Exponential,
            width: DEFAULT_KERNEL_WIDTH,
        }
    }
}

impl LocalityKernel {
    pub fn new(kind: KernelKind, width: f64) -> Result<Self> {
        if kind == KernelKind::Exponential && !(width.is_finite() && width > 0.0) {
            return Err(ExplainError::Config(format!("kernel width {} must be positive", width)));
        }
        Ok(Self { kind, width })
    }

    pub fn uniform() -> Self {
        Self {
            kind: KernelKind::Uniform,
            width: DEFAULT_KERNEL_WIDTH,
        }
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    /// Cosine distance between a mask with `retained` of `total` tokens set
    /// and the all-ones mask, scaled to [0, 100]
    pub fn distance(retained: usize, total: usize) -> f64 {
        if total == 0 || retained == 0 {
            return 100.0;
        }
        (1.0 - (retained as f64 / total as f64).sqrt()) * 100.0
    }

    pub fn weight(&self, distance: f64) -> f64 {
        match self.kind {
            KernelKind::Exponential => (-(distance * distance) / (self.width * self.width)).exp().sqrt(),
            KernelKind::Uniform => 1.0,
        }
    }
}

/// Linear model fit around one input
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// Weighted R² on the fitting data
    pub score: f64,
}

impl SurrogateModel {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept + self.coefficients.iter().zip(row).map(|(c, x)| c * x).sum::<f64>()
    }
}

/// Capability to fit linear weights to weighted samples
pub trait SurrogateFitter: Send + Sync {
    fn fit(&self, features: &[Vec<f64>], targets: &[f64], sample_weights: &[f64]) -> Result<SurrogateModel>;
}

/// Weighted ridge regression with an unpenalised intercept
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegression {
    alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_RIDGE_ALPHA,
        }
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Result<Self> {
        // A positive penalty keeps rank-deficient fits (few samples, constant columns) solvable
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ExplainError::Config(format!("ridge alpha {} must be positive", alpha)));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl SurrogateFitter for RidgeRegression {
    /// Solves (Xc^T W Xc + alpha I) beta = Xc^T W yc on weighted-centred data
    fn fit(&self, features: &[Vec<f64>], targets: &[f64], sample_weights: &[f64]) -> Result<SurrogateModel> {
        let n_samples = features.len();
        if n_samples == 0 {
            return Err(ExplainError::SurrogateFit("cannot fit with zero samples".to_string()));
        }
        if targets.len() != n_samples || sample_weights.len() != n_samples {
            return Err(ExplainError::SurrogateFit(
                "features, targets and weights must have the same length".to_string(),
            ));
        }
        let n_features = features[0].len();
        if features.iter().any(|row| row.len() != n_features) {
            return Err(ExplainError::SurrogateFit("ragged feature matrix".to_string()));
        }

        let total_weight: f64 = sample_weights.iter().sum();
        if !(total_weight > 0.0) {
            return Err(ExplainError::SurrogateFit("sample weights sum to zero".to_string()));
        }

        let y_mean = weighted_mean(targets.iter().copied(), sample_weights, total_weight);
        let x_mean: Vec<f64> = (0..n_features)
            .map(|j| weighted_mean(features.iter().map(|row| row[j]), sample_weights, total_weight))
            .collect();

        // Normal equations on centred data
        let mut xtx = vec![vec![0.0; n_features]; n_features];
        let mut xty = vec![0.0; n_features];
        for ((row, &y), &w) in features.iter().zip(targets).zip(sample_weights) {
            let centred: Vec<f64> = row.iter().zip(&x_mean).map(|(x, m)| x - m).collect();
            let yc = y - y_mean;
            for i in 0..n_features {
                xty[i] += w * centred[i] * yc;
                for j in 0..=i {
                    xtx[i][j] += w * centred[i] * centred[j];
                }
            }
        }
        for i in 0..n_features {
            for j in 0..i {
                xtx[j][i] = xtx[i][j];
            }
            xtx[i][i] += self.alpha;
        }

        let coefficients = cholesky_solve(&xtx, &xty)
            .ok_or_else(|| ExplainError::SurrogateFit("normal equations are not positive definite".to_string()))?;
        let intercept = y_mean - coefficients.iter().zip(&x_mean).map(|(c, m)| c * m).sum::<f64>();

        let mut model = SurrogateModel {
            intercept,
            coefficients,
            score: 0.0,
        };
        model.score = weighted_r2(&model, features, targets, sample_weights, y_mean);
        Ok(model)
    }
}

fn weighted_mean(values: impl Iterator<Item = f64>, weights: &[f64], total_weight: f64) -> f64 {
    values.zip(weights).map(|(v, w)| v * w).sum::<f64>() / total_weight
}

fn weighted_r2(model: &SurrogateModel, features: &[Vec<f64>], targets: &[f64], weights: &[f64], y_mean: f64) -> f64 {
    let mut residual = 0.0;
    let mut total = 0.0;
    for ((row, &y), &w) in features.iter().zip(targets).zip(weights) {
        residual += w * (y - model.predict(row)).powi(2);
        total += w * (y - y_mean).powi(2);
    }
    if total == 0.0 {
        return if residual < 1e-12 { 1.0 } else { 0.0 };
    }
    1.0 - residual / total
}

/// Solve A x = b for symmetric positive definite A
fn cholesky_solve(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = a[i][i] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[i][j] = diag.sqrt();
            } else {
                l[i][j] = (a[i][j] - sum) / l[j][j];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[i][j] * y[j]).sum();
        y[i] = (b[i] - sum) / l[i][i];
    }

    // Backward substitution: L^T x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[j][i] * x[j]).sum();
        x[i] = (y[i] - sum) / l[i][i];
    }

    Some(x)
}

/// How the top-K tokens are picked from the surrogate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// Fit on every token, keep the K largest |coefficients|
    HighestWeights,
    /// Greedily add the token that most improves weighted R², then refit
    ForwardSelection,
    /// Forward selection for small K, highest weights otherwise
    #[default]
    Auto,
}

impl FeatureSelection {
    fn resolve(self, k: usize) -> Self {
        match self {
            FeatureSelection::Auto if k <= AUTO_FORWARD_LIMIT => FeatureSelection::ForwardSelection,
            FeatureSelection::Auto => FeatureSelection::HighestWeights,
            other => other,
        }
    }
}

/// Tokens chosen by a selection strategy, with their surrogate weights
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// (feature index, coefficient), ranked by |coefficient|
    pub features: Vec<(usize, f64)>,
    pub intercept: f64,
    pub score: f64,
    /// Surrogate output for the untouched input (all tokens present)
    pub local_prediction: f64,
}

/// Order by descending magnitude; equal magnitudes keep feature order
pub fn rank_by_magnitude(features: &mut [(usize, f64)]) {
    features.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

fn project(features: &[Vec<f64>], columns: &[usize]) -> Vec<Vec<f64>> {
    features
        .iter()
        .map(|row| columns.iter().map(|&c| row[c]).collect())
        .collect()
}

/// Fit the surrogate and keep at most `k` features
pub fn select_features(
    fitter: &dyn SurrogateFitter,
    strategy: FeatureSelection,
    features: &[Vec<f64>],
    targets: &[f64],
    sample_weights: &[f64],
    k: usize,
) -> Result<Selection> {
    let n_features = features.first().map_or(0, |row| row.len());
    let k = k.min(n_features);

    match strategy.resolve(k) {
        FeatureSelection::ForwardSelection => {
            let mut chosen: Vec<usize> = Vec::with_capacity(k);
            for _ in 0..k {
                let mut best: Option<(usize, f64)> = None;
                for candidate in (0..n_features).filter(|c| !chosen.contains(c)) {
                    let mut columns = chosen.clone();
                    columns.push(candidate);
                    let model = fitter.fit(&project(features, &columns), targets, sample_weights)?;
                    if best.map_or(true, |(_, score)| model.score > score) {
                        best = Some((candidate, model.score));
                    }
                }
                match best {
                    Some((candidate, _)) => chosen.push(candidate),
                    None => break,
                }
            }

            let model = fitter.fit(&project(features, &chosen), targets, sample_weights)?;
            let local_prediction = model.predict(&vec![1.0; chosen.len()]);
            let mut ranked: Vec<(usize, f64)> = chosen.into_iter().zip(model.coefficients).collect();
            rank_by_magnitude(&mut ranked);
            Ok(Selection {
                features: ranked,
                intercept: model.intercept,
                score: model.score,
                local_prediction,
            })
        }
        _ => {
            let model = fitter.fit(features, targets, sample_weights)?;
            let local_prediction = model.predict(&vec![1.0; n_features]);
            let mut ranked: Vec<(usize, f64)> = model.coefficients.iter().copied().enumerate().collect();
            rank_by_magnitude(&mut ranked);
            ranked.truncate(k);
            Ok(Selection {
                features: ranked,
                intercept: model.intercept,
                score: model.score,
                local_prediction,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small enough that fitted coefficients match least squares to 1e-9
    const NEGLIGIBLE_ALPHA: f64 = 1e-12;

    fn grid(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| (0..3).map(|bit| ((i >> bit) & 1) as f64).collect())
            .collect()
    }

    #[test]
    fn test_kernel_distance_and_weight() {
        assert_eq!(LocalityKernel::distance(4, 4), 0.0);
        assert_eq!(LocalityKernel::distance(0, 4), 100.0);
        assert!((LocalityKernel::distance(1, 4) - 50.0).abs() < 1e-12);

        let kernel = LocalityKernel::default();
        assert!((kernel.weight(0.0) - 1.0).abs() < 1e-12);
        assert!(kernel.weight(10.0) > kernel.weight(50.0));
        assert_eq!(LocalityKernel::uniform().weight(90.0), 1.0);
    }

    #[test]
    fn test_kernel_rejects_bad_width() {
        assert!(LocalityKernel::new(KernelKind::Exponential, 0.0).is_err());
        assert!(LocalityKernel::new(KernelKind::Uniform, 0.0).is_ok());
    }

    #[test]
    fn test_ridge_recovers_linear_target() {
        // y = 0.5 + 0.3 x0 - 0.2 x1, x2 irrelevant
        let x = grid(8);
        let y: Vec<f64> = x.iter().map(|r| 0.5 + 0.3 * r[0] - 0.2 * r[1]).collect();
        let w = vec![1.0; 8];

        let model = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap().fit(&x, &y, &w).unwrap();
        assert!((model.intercept - 0.5).abs() < 1e-9);
        assert!((model.coefficients[0] - 0.3).abs() < 1e-9);
        assert!((model.coefficients[1] + 0.2).abs() < 1e-9);
        assert!(model.coefficients[2].abs() < 1e-9);
        assert!((model.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ridge_penalty_shrinks_coefficients() {
        let x = grid(8);
        let y: Vec<f64> = x.iter().map(|r| 0.8 * r[0]).collect();
        let w = vec![1.0; 8];

        let plain = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap().fit(&x, &y, &w).unwrap();
        let shrunk = RidgeRegression::new(5.0).unwrap().fit(&x, &y, &w).unwrap();
        assert!(shrunk.coefficients[0].abs() < plain.coefficients[0].abs());
        assert!(shrunk.coefficients[0] > 0.0);
    }

    #[test]
    fn test_ridge_sample_weights_matter() {
        let x = vec![vec![0.0], vec![1.0], vec![1.0]];
        let y = vec![0.0, 1.0, 0.0];
        let even = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap().fit(&x, &y, &[1.0, 1.0, 1.0]).unwrap();
        let skewed = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap().fit(&x, &y, &[1.0, 9.0, 1.0]).unwrap();
        assert!((even.coefficients[0] - 0.5).abs() < 1e-9);
        assert!((skewed.coefficients[0] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_ridge_requires_positive_penalty() {
        for alpha in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(RidgeRegression::new(alpha), Err(ExplainError::Config(_))), "alpha {}", alpha);
        }
    }

    #[test]
    fn test_ridge_rank_deficient_fits_succeed() {
        // Constant column has zero variance after centring
        let x = vec![vec![1.0], vec![1.0], vec![1.0]];
        let y = vec![0.2, 0.4, 0.6];
        let model = RidgeRegression::default().fit(&x, &y, &[1.0; 3]).unwrap();
        assert!(model.coefficients[0].abs() < 1e-12);
        assert!((model.intercept - 0.4).abs() < 1e-12);

        // Single sample, more features than samples
        let model = RidgeRegression::new(NEGLIGIBLE_ALPHA)
            .unwrap()
            .fit(&[vec![1.0; 5]], &[0.9], &[1.0])
            .unwrap();
        assert!(model.coefficients.iter().all(|c| c.abs() < 1e-12));
        assert!((model.predict(&[1.0; 5]) - 0.9).abs() < 1e-12);

        let x = grid(4);
        let y: Vec<f64> = x.iter().map(|r| 0.5 * r[0]).collect();
        assert!(RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap().fit(&x, &y, &[1.0; 4]).is_ok());
    }

    #[test]
    fn test_ridge_input_validation() {
        let fitter = RidgeRegression::default();
        assert!(fitter.fit(&[], &[], &[]).is_err());
        assert!(fitter.fit(&[vec![1.0]], &[1.0, 2.0], &[1.0]).is_err());
        assert!(fitter.fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], &[1.0, 1.0]).is_err());
        assert!(fitter.fit(&[vec![1.0]], &[1.0], &[0.0]).is_err());
    }

    #[test]
    fn test_rank_by_magnitude_breaks_ties_by_position() {
        let mut features = vec![(3, 0.5), (1, -0.5), (0, 0.1), (2, -0.9)];
        rank_by_magnitude(&mut features);
        assert_eq!(features, vec![(2, -0.9), (1, -0.5), (3, 0.5), (0, 0.1)]);
    }

    #[test]
    fn test_highest_weights_selection() {
        let x = grid(8);
        let y: Vec<f64> = x.iter().map(|r| 0.1 * r[0] - 0.6 * r[1] + 0.3 * r[2]).collect();
        let w = vec![1.0; 8];
        let fitter = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap();

        let selection = select_features(&fitter, FeatureSelection::HighestWeights, &x, &y, &w, 2).unwrap();
        let picked: Vec<usize> = selection.features.iter().map(|(i, _)| *i).collect();
        assert_eq!(picked, vec![1, 2]);
        assert!(selection.features[0].1 < 0.0);
        assert!((selection.local_prediction - (0.1 - 0.6 + 0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_forward_selection_matches_dominant_features() {
        let x = grid(8);
        let y: Vec<f64> = x.iter().map(|r| 0.1 * r[0] - 0.6 * r[1] + 0.3 * r[2]).collect();
        let w = vec![1.0; 8];
        let fitter = RidgeRegression::new(NEGLIGIBLE_ALPHA).unwrap();

        let selection = select_features(&fitter, FeatureSelection::ForwardSelection, &x, &y, &w, 2).unwrap();
        let picked: Vec<usize> = selection.features.iter().map(|(i, _)| *i).collect();
        assert_eq!(picked, vec![1, 2]);
        assert!((selection.features[0].1 + 0.6).abs() < 1e-9);
        assert!((selection.features[1].1 - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_selection_caps_k_at_feature_count() {
        let x = grid(8);
        let y: Vec<f64> = x.iter().map(|r| r[0]).collect();
        let w = vec![1.0; 8];
        for strategy in [FeatureSelection::HighestWeights, FeatureSelection::Auto] {
            let selection = select_features(&RidgeRegression::default(), strategy, &x, &y, &w, 10).unwrap();
            assert_eq!(selection.features.len(), 3);
        }
    }

    #[test]
    fn test_default_selection_is_auto() {
        assert_eq!(FeatureSelection::default(), FeatureSelection::Auto);
        assert_eq!(FeatureSelection::default().resolve(5), FeatureSelection::ForwardSelection);
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(FeatureSelection::Auto.resolve(5), FeatureSelection::ForwardSelection);
        assert_eq!(FeatureSelection::Auto.resolve(7), FeatureSelection::HighestWeights);
        assert_eq!(FeatureSelection::HighestWeights.resolve(2), FeatureSelection::HighestWeights);
    }
}
