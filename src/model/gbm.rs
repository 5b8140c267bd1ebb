//! Gradient-boosted regression trees (squared error)
//!
//! Each round fits a depth-limited tree to the current residuals on a row subsample and a
//! column subsample, with an L2 penalty on leaf weights. When an evaluation set is given,
//! training stops after `early_stopping_rounds` rounds without improvement and the
//! ensemble is cut back to its best round.

use super::{Predictor, Regressor};
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

const MIN_SPLIT_GAIN: f64 = 1e-12;

/// Boosting hyper-parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    /// Fraction of rows sampled for each tree
    pub subsample: f64,
    /// Fraction of columns sampled for each tree
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    pub min_samples_leaf: usize,
    pub early_stopping_rounds: Option<usize>,
    pub seed: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.05,
            max_depth: 6,
            subsample: 0.9,
            colsample_bytree: 0.8,
            lambda: 1.0,
            min_samples_leaf: 1,
            early_stopping_rounds: Some(50),
            seed: 42,
        }
    }
}

impl GradientBoostingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "colsample_bytree must be in (0, 1], got {}",
                self.colsample_bytree
            )));
        }
        if self.lambda < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "lambda must be non-negative, got {}",
                self.lambda
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default single-step regressor
#[derive(Debug, Clone, Default)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }
}

impl Regressor for GradientBoostingRegressor {
    type Model = GradientBoostedTrees;

    fn fit(
        &self,
        x: &[Vec<f64>],
        y: &[f64],
        eval: Option<(&[Vec<f64>], &[f64])>,
    ) -> Result<GradientBoostedTrees> {
        let n_features = check_training_data(x, y)?;
        if let Some((eval_x, eval_y)) = eval {
            if eval_x.len() != eval_y.len() {
                return Err(ForecastError::TrainingError(
                    "Evaluation features and targets differ in length".to_string(),
                ));
            }
            if eval_x.iter().any(|row| row.len() != n_features) {
                return Err(ForecastError::TrainingError(
                    "Evaluation rows do not match the training width".to_string(),
                ));
            }
        }

        let cfg = &self.config;
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let base_score = y.iter().sum::<f64>() / y.len() as f64;

        let mut model = GradientBoostedTrees {
            base_score,
            learning_rate: cfg.learning_rate,
            n_features,
            trees: Vec::new(),
        };

        let mut fitted = vec![base_score; y.len()];
        let eval = eval.filter(|(ex, _)| !ex.is_empty());
        let mut eval_pred: Vec<f64> = eval
            .map(|(ex, _)| vec![base_score; ex.len()])
            .unwrap_or_default();
        let mut best_rmse = eval
            .map(|(_, ey)| rmse(ey, &eval_pred))
            .unwrap_or(f64::INFINITY);
        let mut best_rounds = 0usize;

        let row_count = sample_size(y.len(), cfg.subsample);
        let col_count = sample_size(n_features, cfg.colsample_bytree);

        for round in 0..cfg.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(t, f)| t - f).collect();

            let mut rows = sample(&mut rng, y.len(), row_count).into_vec();
            rows.sort_unstable();
            let mut cols = sample(&mut rng, n_features, col_count).into_vec();
            cols.sort_unstable();

            let tree = RegressionTree::fit(x, &residuals, rows, &cols, cfg);

            for (i, row) in x.iter().enumerate() {
                fitted[i] += cfg.learning_rate * tree.predict(row);
            }
            if let Some((ex, _)) = eval {
                for (i, row) in ex.iter().enumerate() {
                    eval_pred[i] += cfg.learning_rate * tree.predict(row);
                }
            }
            model.trees.push(tree);

            if let (Some((_, ey)), Some(patience)) = (eval, cfg.early_stopping_rounds) {
                let score = rmse(ey, &eval_pred);
                if score < best_rmse - MIN_SPLIT_GAIN {
                    best_rmse = score;
                    best_rounds = round + 1;
                } else if round + 1 - best_rounds >= patience {
                    log::debug!(
                        "Early stopping at round {} (best round {}, eval RMSE {:.4})",
                        round + 1,
                        best_rounds,
                        best_rmse
                    );
                    break;
                }
            }
        }

        if eval.is_some() && cfg.early_stopping_rounds.is_some() {
            model.trees.truncate(best_rounds);
        }

        log::debug!(
            "Fitted {} trees on {} rows x {} features",
            model.trees.len(),
            y.len(),
            n_features
        );

        Ok(model)
    }

    fn name(&self) -> &str {
        "gradient_boosting"
    }
}

/// Fitted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }
}

impl Predictor for GradientBoostedTrees {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_one(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.n_features {
            return Err(ForecastError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                self.n_features,
                features.len()
            )));
        }
        Ok(self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.learning_rate * tree.predict(features))
                .sum::<f64>())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Binary regression tree stored as a flat node list; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

struct SplitCandidate {
    gain: f64,
    feature: usize,
    threshold: f64,
}

impl RegressionTree {
    fn fit(
        x: &[Vec<f64>],
        residuals: &[f64],
        rows: Vec<usize>,
        cols: &[usize],
        cfg: &GradientBoostingConfig,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, residuals, rows, cols, 0, cfg);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        residuals: &[f64],
        rows: Vec<usize>,
        cols: &[usize],
        depth: usize,
        cfg: &GradientBoostingConfig,
    ) -> usize {
        let sum: f64 = rows.iter().map(|&i| residuals[i]).sum();
        let leaf_value = sum / (rows.len() as f64 + cfg.lambda);
        let node = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: leaf_value });

        if depth >= cfg.max_depth || rows.len() < 2 * cfg.min_samples_leaf {
            return node;
        }

        let Some(split) = Self::best_split(x, residuals, &rows, cols, cfg) else {
            return node;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| x[i][split.feature] <= split.threshold);

        let left = self.grow(x, residuals, left_rows, cols, depth + 1, cfg);
        let right = self.grow(x, residuals, right_rows, cols, depth + 1, cfg);
        self.nodes[node] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node
    }

    fn best_split(
        x: &[Vec<f64>],
        residuals: &[f64],
        rows: &[usize],
        cols: &[usize],
        cfg: &GradientBoostingConfig,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&i| residuals[i]).sum();
        let parent_score = total * total / (n as f64 + cfg.lambda);
        let mut best: Option<SplitCandidate> = None;

        for &feature in cols {
            let mut order: Vec<usize> = rows.to_vec();
            order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

            let mut left_sum = 0.0;
            for p in 1..n {
                left_sum += residuals[order[p - 1]];
                let lo = x[order[p - 1]][feature];
                let hi = x[order[p]][feature];
                if lo == hi || p < cfg.min_samples_leaf || n - p < cfg.min_samples_leaf {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / (p as f64 + cfg.lambda)
                    + right_sum * right_sum / ((n - p) as f64 + cfg.lambda)
                    - parent_score;

                if gain > MIN_SPLIT_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                    });
                }
            }
        }

        best
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

fn check_training_data(x: &[Vec<f64>], y: &[f64]) -> Result<usize> {
    if x.is_empty() {
        return Err(ForecastError::TrainingError(
            "Cannot fit on an empty training set".to_string(),
        ));
    }
    if x.len() != y.len() {
        return Err(ForecastError::TrainingError(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if width == 0 {
        return Err(ForecastError::TrainingError(
            "Training rows have no features".to_string(),
        ));
    }
    if x.iter().any(|row| row.len() != width) {
        return Err(ForecastError::TrainingError(
            "Training rows have differing widths".to_string(),
        ));
    }
    if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(ForecastError::TrainingError(
            "Training data contains non-finite values".to_string(),
        ));
    }
    Ok(width)
}

fn sample_size(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).clamp(1, n)
}

fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sse / actual.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 10.0 } else { 50.0 }).collect();
        (x, y)
    }

    fn exact_config() -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: 200,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            lambda: 0.0,
            early_stopping_rounds: None,
            ..GradientBoostingConfig::default()
        }
    }

    #[test]
    fn test_fits_step_function() {
        let (x, y) = step_data();
        let model = GradientBoostingRegressor::new(exact_config())
            .unwrap()
            .fit(&x, &y, None)
            .unwrap();

        assert_relative_eq!(model.predict_one(&[3.0, 3.0]).unwrap(), 10.0, epsilon = 1e-6);
        assert_relative_eq!(model.predict_one(&[35.0, 0.0]).unwrap(), 50.0, epsilon = 1e-6);
        assert_eq!(model.n_trees(), 200);
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = vec![4.0; 10];
        let model = GradientBoostingRegressor::default().fit(&x, &y, None).unwrap();
        assert_relative_eq!(model.base_score(), 4.0);
        assert_relative_eq!(model.predict_one(&[100.0]).unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_seeded_training_is_deterministic() {
        let (x, y) = step_data();
        let regressor = GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 30,
            ..GradientBoostingConfig::default()
        })
        .unwrap();
        let a = regressor.fit(&x, &y, None).unwrap();
        let b = regressor.fit(&x, &y, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_early_stopping_truncates() {
        let (x, y) = step_data();
        let regressor = GradientBoostingRegressor::new(GradientBoostingConfig {
            n_estimators: 500,
            early_stopping_rounds: Some(5),
            ..GradientBoostingConfig::default()
        })
        .unwrap();
        // Evaluation rows are all from the upper plateau; the fit converges quickly
        let eval_x: Vec<Vec<f64>> = x[30..].to_vec();
        let eval_y: Vec<f64> = y[30..].to_vec();
        let model = regressor.fit(&x, &y, Some((&eval_x, &eval_y))).unwrap();
        assert!(model.n_trees() < 500);
    }

    #[test]
    fn test_invalid_training_data() {
        let regressor = GradientBoostingRegressor::default();
        assert!(matches!(
            regressor.fit(&[], &[], None),
            Err(ForecastError::TrainingError(_))
        ));
        assert!(regressor.fit(&[vec![1.0]], &[1.0, 2.0], None).is_err());
        assert!(regressor
            .fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], None)
            .is_err());
        assert!(regressor.fit(&[vec![f64::NAN]], &[1.0], None).is_err());
    }

    #[test]
    fn test_predict_width_mismatch() {
        let (x, y) = step_data();
        let model = GradientBoostingRegressor::default().fit(&x, &y, None).unwrap();
        assert!(matches!(
            model.predict_one(&[1.0]),
            Err(ForecastError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let config = GradientBoostingConfig {
            learning_rate: 0.0,
            ..GradientBoostingConfig::default()
        };
        assert!(GradientBoostingRegressor::new(config).is_err());

        let config = GradientBoostingConfig {
            subsample: 1.5,
            ..GradientBoostingConfig::default()
        };
        assert!(GradientBoostingRegressor::new(config).is_err());
    }

    #[test]
    fn test_tree_respects_depth() {
        let (x, y) = step_data();
        let cfg = GradientBoostingConfig {
            max_depth: 1,
            ..exact_config()
        };
        let residuals: Vec<f64> = y.clone();
        let tree = RegressionTree::fit(&x, &residuals, (0..x.len()).collect(), &[0, 1], &cfg);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn test_model_serde() {
        let (x, y) = step_data();
        let model = GradientBoostingRegressor::new(exact_config())
            .unwrap()
            .fit(&x, &y, None)
            .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedTrees = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(
            model.predict_one(&[12.0, 5.0]).unwrap(),
            restored.predict_one(&[12.0, 5.0]).unwrap(),
            epsilon = 1e-9
        );
    }
}
