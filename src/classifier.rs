//! Trained classifiers the ensemble can consult.
//!
//! Training happens offline; this module only evaluates fitted parameters.
//! Every classifier answers in player terms: `p1` is the probability that
//! player 1 wins (training label 1), `p2` the complement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calibration::ProbPair;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("model produced an unusable probability pair ({p1}, {p2})")]
    InvalidOutput { p1: f64, p2: f64 },
    #[error("invalid model structure: {0}")]
    InvalidModel(String),
}

pub trait ProbabilityClassifier: Send + Sync {
    fn predict_probability(&self, features: &[f64]) -> Result<ProbPair, ClassifierError>;
}

pub type SharedClassifier = Arc<dyn ProbabilityClassifier>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    fn transform(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| if *s != 0.0 { (v - m) / s } else { v - m })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegressionModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
}

impl LogisticRegressionModel {
    pub fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.coefficients.len() != n_features {
            return Err(ClassifierError::InvalidModel(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                n_features
            )));
        }
        if let Some(scaler) = &self.scaler
            && (scaler.mean.len() != n_features || scaler.scale.len() != n_features)
        {
            return Err(ClassifierError::InvalidModel(
                "scaler width does not match feature count".to_string(),
            ));
        }
        Ok(())
    }
}

impl ProbabilityClassifier for LogisticRegressionModel {
    fn predict_probability(&self, features: &[f64]) -> Result<ProbPair, ClassifierError> {
        check_dim(self.coefficients.len(), features)?;
        let scaled;
        let x = match &self.scaler {
            Some(scaler) => {
                scaled = scaler.transform(features);
                scaled.as_slice()
            }
            None => features,
        };
        let logit = self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(w, v)| w * v)
                .sum::<f64>();
        finish(sigmoid(logit))
    }
}

/// Array-encoded binary tree. Node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
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

#[derive(Debug, Clone, Copy)]
enum SplitRule {
    /// Go left when `x <= threshold` (CART / random forest export).
    LessOrEqual,
    /// Go left when `x < threshold` (boosted tree export).
    Less,
}

impl DecisionTree {
    fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.nodes.is_empty() {
            return Err(ClassifierError::InvalidModel("empty tree".to_string()));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                if *feature >= n_features {
                    return Err(ClassifierError::InvalidModel(format!(
                        "node {idx} splits on feature {feature} of {n_features}"
                    )));
                }
                // Children must point forward, which also rules out cycles.
                if *left <= idx || *right <= idx || *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(ClassifierError::InvalidModel(format!(
                        "node {idx} has out-of-order children"
                    )));
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, x: &[f64], rule: SplitRule) -> Result<f64, ClassifierError> {
        let mut idx = 0usize;
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = *x.get(*feature).ok_or(ClassifierError::DimensionMismatch {
                        expected: feature + 1,
                        actual: x.len(),
                    })?;
                    let go_left = match rule {
                        SplitRule::LessOrEqual => v <= *threshold,
                        SplitRule::Less => v < *threshold,
                    };
                    idx = if go_left { *left } else { *right };
                }
                None => {
                    return Err(ClassifierError::InvalidModel(format!(
                        "node index {idx} out of range"
                    )));
                }
            }
        }
        Err(ClassifierError::InvalidModel(
            "tree walk did not reach a leaf".to_string(),
        ))
    }
}

/// Bagged trees whose leaves hold player 1's win rate; output is the mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    pub fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.n_features != n_features {
            return Err(ClassifierError::InvalidModel(format!(
                "forest trained on {} features, expected {}",
                self.n_features, n_features
            )));
        }
        if self.trees.is_empty() {
            return Err(ClassifierError::InvalidModel("forest has no trees".to_string()));
        }
        self.trees.iter().try_for_each(|t| t.validate(n_features))
    }
}

impl ProbabilityClassifier for RandomForestModel {
    fn predict_probability(&self, features: &[f64]) -> Result<ProbPair, ClassifierError> {
        check_dim(self.n_features, features)?;
        if self.trees.is_empty() {
            return Err(ClassifierError::InvalidModel("forest has no trees".to_string()));
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.evaluate(features, SplitRule::LessOrEqual)?;
        }
        finish(sum / self.trees.len() as f64)
    }
}

/// Additive margin trees squashed through a sigmoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTreesModel {
    pub n_features: usize,
    #[serde(default)]
    pub base_margin: f64,
    pub trees: Vec<DecisionTree>,
}

impl GradientBoostedTreesModel {
    pub fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        if self.n_features != n_features {
            return Err(ClassifierError::InvalidModel(format!(
                "booster trained on {} features, expected {}",
                self.n_features, n_features
            )));
        }
        self.trees.iter().try_for_each(|t| t.validate(n_features))
    }
}

impl ProbabilityClassifier for GradientBoostedTreesModel {
    fn predict_probability(&self, features: &[f64]) -> Result<ProbPair, ClassifierError> {
        check_dim(self.n_features, features)?;
        let mut margin = self.base_margin;
        for tree in &self.trees {
            margin += tree.evaluate(features, SplitRule::Less)?;
        }
        finish(sigmoid(margin))
    }
}

/// On-disk form of any supported classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedModel {
    LogisticRegression(LogisticRegressionModel),
    RandomForest(RandomForestModel),
    GradientBoostedTrees(GradientBoostedTreesModel),
}

impl PersistedModel {
    pub fn validate(&self, n_features: usize) -> Result<(), ClassifierError> {
        match self {
            PersistedModel::LogisticRegression(m) => m.validate(n_features),
            PersistedModel::RandomForest(m) => m.validate(n_features),
            PersistedModel::GradientBoostedTrees(m) => m.validate(n_features),
        }
    }

    pub fn into_shared(self) -> SharedClassifier {
        match self {
            PersistedModel::LogisticRegression(m) => Arc::new(m),
            PersistedModel::RandomForest(m) => Arc::new(m),
            PersistedModel::GradientBoostedTrees(m) => Arc::new(m),
        }
    }
}

fn check_dim(expected: usize, features: &[f64]) -> Result<(), ClassifierError> {
    if features.len() != expected {
        return Err(ClassifierError::DimensionMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

fn finish(p1: f64) -> Result<ProbPair, ClassifierError> {
    if !p1.is_finite() || !(0.0..=1.0).contains(&p1) {
        return Err(ClassifierError::InvalidOutput { p1, p2: 1.0 - p1 });
    }
    Ok(ProbPair::from_p1(p1))
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
