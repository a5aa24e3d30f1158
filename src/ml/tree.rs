//! CART decision tree used as the base learner of [`RandomForest`].
//!
//! Nodes live in a flat vector so a fitted tree serializes as plain JSON.
//!
//! [`RandomForest`]: super::forest::RandomForest

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    SquaredError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Class frequencies (classification) or `[mean]` (regression)
    Leaf { value: Vec<f64> },
    /// `row[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features examined per split
    pub max_features: usize,
    /// Zero for regression
    pub n_classes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub n_features: usize,
    pub nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
    /// Sample indices sorted by `feature`, and the position of the cut
    order: Vec<usize>,
    cut: usize,
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    params: &'a TreeParams,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `samples` (duplicates allowed, as
    /// produced by bootstrap sampling).
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        samples: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = x.first().map(|r| r.len()).unwrap_or(0);
        let mut builder = Builder {
            x,
            y,
            params,
            nodes: Vec::new(),
        };
        builder.grow(samples.to_vec(), 0, rng);
        Self {
            n_features,
            nodes: builder.nodes,
        }
    }

    /// Leaf value reached by `row`. The caller checks the row width.
    pub fn leaf_value(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if value.is_empty() || value.iter().any(|v| !v.is_finite()) {
                        return Err(format!("leaf {idx} has an invalid value"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= self.n_features {
                        return Err(format!("node {idx} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    // Children are always appended after their parent.
                    if *left <= idx || *right <= idx || *left >= self.nodes.len() || *right >= self.nodes.len() {
                        return Err(format!("node {idx} has out-of-range children"));
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> Builder<'a> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(&samples),
        });

        let depth_exhausted = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_exhausted
            || samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf
            || self.impurity(&samples) <= f64::EPSILON
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, rng) else {
            return idx;
        };

        let (left_samples, right_samples) = split.order.split_at(split.cut);
        let left = self.grow(left_samples.to_vec(), depth + 1, rng);
        let right = self.grow(right_samples.to_vec(), depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn leaf_value(&self, samples: &[usize]) -> Vec<f64> {
        let n = samples.len().max(1) as f64;
        match self.params.criterion {
            Criterion::Gini => {
                let mut counts = vec![0.0; self.params.n_classes];
                for &s in samples {
                    counts[self.y[s] as usize] += 1.0;
                }
                counts.iter().map(|c| c / n).collect()
            }
            Criterion::SquaredError => {
                vec![samples.iter().map(|&s| self.y[s]).sum::<f64>() / n]
            }
        }
    }

    fn impurity(&self, samples: &[usize]) -> f64 {
        match self.params.criterion {
            Criterion::Gini => {
                let mut counts = vec![0.0; self.params.n_classes];
                for &s in samples {
                    counts[self.y[s] as usize] += 1.0;
                }
                gini(&counts, samples.len() as f64)
            }
            Criterion::SquaredError => {
                let (sum, sum_sq) = samples.iter().fold((0.0, 0.0), |(a, b), &s| {
                    (a + self.y[s], b + self.y[s] * self.y[s])
                });
                variance(sum, sum_sq, samples.len() as f64)
            }
        }
    }

    /// Visit features in random order. Stop once `max_features` non-constant
    /// features were examined and at least one valid split was found.
    fn best_split(&self, samples: &[usize], rng: &mut StdRng) -> Option<SplitCandidate> {
        let n_features = self.x.first().map(|r| r.len()).unwrap_or(0);
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;
        for feature in features {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            let mut order = samples.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            let first = self.x[order[0]][feature];
            let last = self.x[order[order.len() - 1]][feature];
            if first == last {
                continue;
            }
            visited += 1;

            if let Some((cut, threshold, impurity)) = self.scan_feature(&order, feature) {
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                        order,
                        cut,
                    });
                }
            }
        }
        best
    }

    /// Sweep the sorted samples once, returning the cut with the lowest
    /// weighted child impurity.
    fn scan_feature(&self, order: &[usize], feature: usize) -> Option<(usize, f64, f64)> {
        let n = order.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let value = |pos: usize| self.x[order[pos]][feature];

        let mut best: Option<(usize, f64, f64)> = None;
        let mut consider = |cut: usize, impurity: f64| {
            let (lo, hi) = (value(cut - 1), value(cut));
            if lo == hi {
                return;
            }
            if best.map_or(true, |(_, _, b)| impurity < b) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold >= hi || !threshold.is_finite() {
                    threshold = lo;
                }
                best = Some((cut, threshold, impurity));
            }
        };

        match self.params.criterion {
            Criterion::Gini => {
                let k = self.params.n_classes;
                let mut left = vec![0.0; k];
                let mut right = vec![0.0; k];
                for &s in order {
                    right[self.y[s] as usize] += 1.0;
                }
                for cut in 1..n {
                    let class = self.y[order[cut - 1]] as usize;
                    left[class] += 1.0;
                    right[class] -= 1.0;
                    if cut < min_leaf || n - cut < min_leaf {
                        continue;
                    }
                    let (nl, nr) = (cut as f64, (n - cut) as f64);
                    let weighted = (nl * gini(&left, nl) + nr * gini(&right, nr)) / n as f64;
                    consider(cut, weighted);
                }
            }
            Criterion::SquaredError => {
                let (mut right_sum, mut right_sq) = order.iter().fold((0.0, 0.0), |(a, b), &s| {
                    (a + self.y[s], b + self.y[s] * self.y[s])
                });
                let (mut left_sum, mut left_sq) = (0.0, 0.0);
                for cut in 1..n {
                    let y = self.y[order[cut - 1]];
                    left_sum += y;
                    left_sq += y * y;
                    right_sum -= y;
                    right_sq -= y * y;
                    if cut < min_leaf || n - cut < min_leaf {
                        continue;
                    }
                    let (nl, nr) = (cut as f64, (n - cut) as f64);
                    let weighted = (nl * variance(left_sum, left_sq, nl)
                        + nr * variance(right_sum, right_sq, nr))
                        / n as f64;
                    consider(cut, weighted);
                }
            }
        }
        best
    }
}

fn gini(counts: &[f64], n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>()
}

fn variance(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}
