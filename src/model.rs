use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{FeatureVector, Label, FEATURE_COUNT};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("model path must be a file: {}", .0.display())]
    NotAFile(PathBuf),
    #[error("model read error: {0}")]
    Read(#[from] std::io::Error),
    #[error("model parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("probability estimation is not supported by this model")]
    ProbaUnsupported,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Anything that can turn a feature vector into a risk label.
///
/// Probability estimation is an optional capability: callers check
/// [`Classifier::supports_proba`] before asking for it.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Label, ModelError>;

    fn supports_proba(&self) -> bool {
        false
    }

    fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        Err(ModelError::ProbaUnsupported)
    }
}

// ============================================================================
// ARTIFACT FORMAT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    DecisionTree {
        labels: Vec<Label>,
        tree: DecisionTree,
    },
    RandomForest {
        labels: Vec<Label>,
        trees: Vec<DecisionTree>,
    },
    LogisticRegression {
        labels: Vec<Label>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    LinearSvc {
        labels: Vec<Label>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

const LEAF: i64 = -1;

#[derive(Debug, Clone, Deserialize)]
struct TreeNode {
    #[serde(default)]
    feature: i64,
    #[serde(default)]
    threshold: f64,
    left: i64,
    right: i64,
    #[serde(default)]
    value: Vec<f64>,
}

impl TreeNode {
    fn is_leaf(&self) -> bool {
        self.left == LEAF && self.right == LEAF
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                if node.value.len() != n_classes {
                    return Err(format!(
                        "leaf {} has {} class values, expected {}",
                        index,
                        node.value.len(),
                        n_classes
                    ));
                }
                if node.value.iter().any(|value| !value.is_finite() || *value < 0.0) {
                    return Err(format!("leaf {} has negative or non-finite values", index));
                }
                if node.value.iter().sum::<f64>() <= 0.0 {
                    return Err(format!("leaf {} has no weight", index));
                }
                continue;
            }

            if node.feature < 0 || node.feature as usize >= FEATURE_COUNT {
                return Err(format!("node {} splits on unknown feature {}", index, node.feature));
            }
            if !node.threshold.is_finite() {
                return Err(format!("node {} has a non-finite threshold", index));
            }
            // Children must come after their parent, which rules out cycles.
            for child in [node.left, node.right] {
                if child <= index as i64 || child as usize >= self.nodes.len() {
                    return Err(format!("node {} has invalid child {}", index, child));
                }
            }
        }

        Ok(())
    }

    fn leaf_for(&self, features: &FeatureVector) -> Result<&TreeNode, ModelError> {
        let mut index = 0usize;
        loop {
            let node = self
                .nodes
                .get(index)
                .ok_or_else(|| ModelError::Inference(format!("tree node {} missing", index)))?;
            if node.is_leaf() {
                return Ok(node);
            }
            let value = features.get(node.feature as usize).ok_or_else(|| {
                ModelError::Inference(format!("feature {} out of range", node.feature))
            })?;
            index = if value <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }

    fn proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let leaf = self.leaf_for(features)?;
        let total: f64 = leaf.value.iter().sum();
        Ok(leaf.value.iter().map(|value| value / total).collect())
    }
}

#[derive(Debug, Clone)]
struct LinearModel {
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearModel {
    fn validate(&self, n_classes: usize) -> Result<(), String> {
        if self.coefficients.len() != n_classes || self.intercepts.len() != n_classes {
            return Err(format!(
                "expected {} coefficient rows and intercepts, found {} and {}",
                n_classes,
                self.coefficients.len(),
                self.intercepts.len()
            ));
        }
        if let Some(row) = self.coefficients.iter().find(|row| row.len() != FEATURE_COUNT) {
            return Err(format!(
                "coefficient row has {} entries, expected {}",
                row.len(),
                FEATURE_COUNT
            ));
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|value| value.is_finite());
        if !all_finite {
            return Err("coefficients must be finite".to_string());
        }
        Ok(())
    }

    fn decision(&self, features: &FeatureVector) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, intercept)| {
                row.iter()
                    .zip(features.as_slice())
                    .map(|(weight, value)| weight * value)
                    .sum::<f64>()
                    + intercept
            })
            .collect()
    }
}

// ============================================================================
// LOADED MODEL
// ============================================================================

#[derive(Debug, Clone)]
enum Estimator {
    Tree(DecisionTree),
    Forest(Vec<DecisionTree>),
    Logistic(LinearModel),
    Svc(LinearModel),
}

#[derive(Debug, Clone)]
pub struct RiskModel {
    labels: Vec<Label>,
    estimator: Estimator,
}

impl RiskModel {
    pub fn from_json(data: &[u8]) -> Result<Self, ModelError> {
        let artifact = serde_json::from_slice::<ModelArtifact>(data)?;
        let model = match artifact {
            ModelArtifact::DecisionTree { labels, tree } => RiskModel {
                labels,
                estimator: Estimator::Tree(tree),
            },
            ModelArtifact::RandomForest { labels, trees } => RiskModel {
                labels,
                estimator: Estimator::Forest(trees),
            },
            ModelArtifact::LogisticRegression {
                labels,
                coefficients,
                intercepts,
            } => RiskModel {
                labels,
                estimator: Estimator::Logistic(LinearModel {
                    coefficients,
                    intercepts,
                }),
            },
            ModelArtifact::LinearSvc {
                labels,
                coefficients,
                intercepts,
            } => RiskModel {
                labels,
                estimator: Estimator::Svc(LinearModel {
                    coefficients,
                    intercepts,
                }),
            },
        };
        model.validate()?;
        Ok(model)
    }

    pub fn kind(&self) -> &'static str {
        match self.estimator {
            Estimator::Tree(_) => "decision_tree",
            Estimator::Forest(_) => "random_forest",
            Estimator::Logistic(_) => "logistic_regression",
            Estimator::Svc(_) => "linear_svc",
        }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    fn validate(&self) -> Result<(), ModelError> {
        let n_classes = self.labels.len();
        if n_classes < 2 {
            return Err(ModelError::Invalid("model needs at least two labels".to_string()));
        }

        let result = match &self.estimator {
            Estimator::Tree(tree) => tree.validate(n_classes),
            Estimator::Forest(trees) => {
                if trees.is_empty() {
                    Err("forest has no trees".to_string())
                } else {
                    trees
                        .iter()
                        .enumerate()
                        .try_for_each(|(index, tree)| {
                            tree.validate(n_classes)
                                .map_err(|error| format!("tree {}: {}", index, error))
                        })
                }
            }
            Estimator::Logistic(linear) | Estimator::Svc(linear) => linear.validate(n_classes),
        };

        result.map_err(ModelError::Invalid)
    }

    fn scores(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        match &self.estimator {
            Estimator::Tree(tree) => tree.proba(features),
            Estimator::Forest(trees) => {
                let mut total = vec![0.0; self.labels.len()];
                for tree in trees {
                    for (sum, value) in total.iter_mut().zip(tree.proba(features)?) {
                        *sum += value;
                    }
                }
                let count = trees.len() as f64;
                Ok(total.into_iter().map(|sum| sum / count).collect())
            }
            Estimator::Logistic(linear) => Ok(softmax(&linear.decision(features))),
            Estimator::Svc(linear) => Ok(linear.decision(features)),
        }
    }

    fn label_at(&self, index: usize) -> Result<Label, ModelError> {
        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| ModelError::Inference(format!("no label for class {}", index)))
    }
}

impl Classifier for RiskModel {
    fn predict(&self, features: &FeatureVector) -> Result<Label, ModelError> {
        let scores = self.scores(features)?;
        let index = argmax(&scores)
            .ok_or_else(|| ModelError::Inference("model produced no scores".to_string()))?;
        self.label_at(index)
    }

    fn supports_proba(&self) -> bool {
        !matches!(self.estimator, Estimator::Svc(_))
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        if !self.supports_proba() {
            return Err(ModelError::ProbaUnsupported);
        }
        self.scores(features)
    }
}

/// Reads and validates a model artifact from disk.
pub fn load_model(path: &Path) -> Result<RiskModel, ModelError> {
    if !path.exists() {
        return Err(ModelError::NotFound(path.to_path_buf()));
    }

    if path.is_dir() {
        return Err(ModelError::NotAFile(path.to_path_buf()));
    }

    let data = std::fs::read(path)?;
    RiskModel::from_json(&data)
}

/// First index of the largest value; NaN never wins.
fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, value) in values.iter().copied().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if value <= current => {}
            _ => best = Some((index, value)),
        }
    }
    best.map(|(index, _)| index)
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|value| value / total).collect()
}
