//! Random forest (bagged CART trees) for classification and regression.
//!
//! Defaults follow the usual library conventions: 100 trees, bootstrap
//! sampling, Gini with `sqrt(width)` candidate features for
//! classification, squared error with every feature for regression, trees
//! grown until leaves are pure. A fixed seed makes fitting reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tree::{Criterion, DecisionTree, TreeParams};
use crate::dataset::Dataset;
use crate::error::{ArborError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Classification { n_classes: usize },
    Regression,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification { .. } => "classification",
            Self::Regression => "regression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    All,
}

impl MaxFeatures {
    fn resolve(&self, width: usize) -> usize {
        match self {
            Self::Sqrt => ((width as f64).sqrt() as usize).max(1),
            Self::All => width.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    #[serde(default)]
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl ForestParams {
    pub fn classifier(n_estimators: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            seed,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }

    pub fn regressor(n_estimators: usize, seed: u64) -> Self {
        Self {
            max_features: MaxFeatures::All,
            ..Self::classifier(n_estimators, seed)
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub task: Task,
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(dataset: &Dataset, task: Task, params: &ForestParams) -> Result<Self> {
        if params.n_estimators == 0 {
            return Err(ArborError::Validation("n_estimators must be > 0".to_string()));
        }
        let (criterion, n_classes) = match task {
            Task::Classification { n_classes } => {
                if n_classes < 2 {
                    return Err(ArborError::Validation(format!(
                        "classification needs at least 2 classes, got {n_classes}"
                    )));
                }
                if let Some(bad) = dataset
                    .targets()
                    .iter()
                    .find(|t| t.fract() != 0.0 || **t < 0.0 || **t >= n_classes as f64)
                {
                    return Err(ArborError::Dataset(format!(
                        "class label {bad} is not an integer in 0..{n_classes}"
                    )));
                }
                (Criterion::Gini, n_classes)
            }
            Task::Regression => (Criterion::SquaredError, 0),
        };

        let width = dataset.width();
        let tree_params = TreeParams {
            criterion,
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
            max_features: params.max_features.resolve(width),
            n_classes,
        };

        let n = dataset.len();
        let mut master = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for i in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let samples: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let tree = DecisionTree::fit(
                dataset.features(),
                dataset.targets(),
                &samples,
                &tree_params,
                &mut rng,
            );
            debug!(tree = i, nodes = tree.nodes.len(), depth = tree.depth(), "fitted tree");
            trees.push(tree);
        }

        Ok(Self {
            task,
            n_features: width,
            trees,
        })
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        let leaf_width = match self.task {
            Task::Classification { n_classes } => n_classes,
            Task::Regression => 1,
        };
        for (idx, tree) in self.trees.iter().enumerate() {
            if tree.n_features != self.n_features {
                return Err(format!(
                    "tree[{idx}] expects {} features, forest expects {}",
                    tree.n_features, self.n_features
                ));
            }
            tree.validate().map_err(|e| format!("tree[{idx}]: {e}"))?;
            let bad_leaf = tree.nodes.iter().any(|n| match n {
                super::tree::Node::Leaf { value } => value.len() != leaf_width,
                _ => false,
            });
            if bad_leaf {
                return Err(format!("tree[{idx}] leaf width != {leaf_width}"));
            }
        }
        Ok(())
    }

    fn check_width(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_features {
            return Err(ArborError::Schema(format!(
                "input width mismatch: got {}, expected {}",
                row.len(),
                self.n_features
            )));
        }
        Ok(())
    }

    /// Averaged per-tree class frequencies (classification only)
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row)?;
        let Task::Classification { n_classes } = self.task else {
            return Err(ArborError::Validation(
                "predict_proba requires a classifier".to_string(),
            ));
        };
        let mut proba = vec![0.0; n_classes];
        for tree in &self.trees {
            for (p, v) in proba.iter_mut().zip(tree.leaf_value(row)) {
                *p += v;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    /// Class id (as f64) for classifiers, mean tree output for regressors
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        match self.task {
            Task::Classification { .. } => {
                let proba = self.predict_proba(row)?;
                // First maximum wins on ties.
                let class = proba
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(bi, bp), (i, &p)| {
                        if p > bp {
                            (i, p)
                        } else {
                            (bi, bp)
                        }
                    })
                    .0;
                Ok(class as f64)
            }
            Task::Regression => {
                self.check_width(row)?;
                let sum: f64 = self.trees.iter().map(|t| t.leaf_value(row)[0]).sum();
                Ok(sum / self.trees.len() as f64)
            }
        }
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|r| self.predict_row(r)).collect()
    }
}
