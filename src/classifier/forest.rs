//! Random Forest Ensemble
//!
//! Bagged CART trees with Gini splits, soft-voted at prediction time.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{
    argmax, index_labels, Classifier, ClassifierError, Features, LabeledExample, Predictor,
    FEATURE_COUNT,
};
use crate::config::ModelConfig;

// ============================================================================
// RANDOM FOREST
// ============================================================================

/// Random forest hyper-parameters
#[derive(Debug, Clone)]
pub struct RandomForest {
    /// Number of trees
    n_trees: usize,
    /// Max depth per tree, unbounded when `None`
    max_depth: Option<usize>,
    /// Features considered per split
    max_features: usize,
    /// Smallest node that may still be split
    min_samples_split: usize,
    /// Random seed
    seed: u64,
}

impl RandomForest {
    /// Create a new random forest
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            n_trees,
            max_depth: None,
            max_features: default_max_features(),
            min_samples_split: 2,
            seed,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            max_features: config
                .max_features
                .unwrap_or_else(default_max_features)
                .clamp(1, FEATURE_COUNT),
            min_samples_split: config.min_samples_split.max(2),
            seed: config.seed,
        }
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100, 42)
    }
}

fn default_max_features() -> usize {
    ((FEATURE_COUNT as f64).sqrt() as usize).max(1)
}

impl Classifier for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&self, examples: &[LabeledExample<'_>]) -> Result<Box<dyn Predictor>, ClassifierError> {
        if examples.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }
        if self.n_trees == 0 {
            return Err(ClassifierError::InvalidParameter(
                "n_trees must be at least 1".to_string(),
            ));
        }

        let (classes, labels) = index_labels(examples);
        let rows: Vec<[u32; FEATURE_COUNT]> =
            examples.iter().map(|e| e.features.to_array()).collect();
        let data = TrainingData {
            rows: &rows,
            labels: &labels,
            n_classes: classes.len(),
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let bootstrap: Vec<usize> = (0..rows.len())
                .map(|_| rng.gen_range(0..rows.len()))
                .collect();
            let mut builder = TreeBuilder {
                data: &data,
                params: self,
                rng: &mut rng,
                nodes: Vec::new(),
            };
            builder.grow(bootstrap, 0);
            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        Ok(Box::new(TrainedForest { classes, trees }))
    }
}

// ============================================================================
// TREES
// ============================================================================

struct TrainingData<'a> {
    rows: &'a [[u32; FEATURE_COUNT]],
    labels: &'a [usize],
    n_classes: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Class proportions of the training rows that reached this leaf
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        /// Rows with `value <= threshold` go left
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct DecisionTree {
    /// Root is the first node
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn distribution(&self, row: &[u32; FEATURE_COUNT]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if f64::from(row[*feature]) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct TreeBuilder<'a, 'd> {
    data: &'a TrainingData<'d>,
    params: &'a RandomForest,
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl TreeBuilder<'_, '_> {
    /// Grows the subtree for `rows` and returns its node index.
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let counts = self.class_counts(&rows);
        let pure = counts.iter().filter(|c| **c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);

        let split = if pure || depth_reached || rows.len() < self.params.min_samples_split {
            None
        } else {
            self.best_split(&rows)
        };

        let Some(split) = split else {
            let total = rows.len().max(1) as f64;
            self.nodes.push(Node::Leaf {
                distribution: counts.iter().map(|c| *c as f64 / total).collect(),
            });
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|row| f64::from(self.data.rows[*row][split.feature]) <= split.threshold);

        let index = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[index]
        {
            *l = left;
            *r = right;
        }
        index
    }

    fn class_counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.data.n_classes];
        for row in rows {
            counts[self.data.labels[*row]] += 1;
        }
        counts
    }

    /// Draws features in random order and keeps looking past `max_features`
    /// until at least one usable split has been found.
    fn best_split(&mut self, rows: &[usize]) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
        features.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        for (visited, feature) in features.into_iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_split_on(rows, feature) {
                if best
                    .as_ref()
                    .map_or(true, |b| candidate.impurity < b.impurity)
                {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    fn best_split_on(&self, rows: &[usize], feature: usize) -> Option<SplitCandidate> {
        let mut points: Vec<(u32, usize)> = rows
            .iter()
            .map(|row| (self.data.rows[*row][feature], self.data.labels[*row]))
            .collect();
        points.sort_unstable();

        let total = points.len();
        let mut right = vec![0usize; self.data.n_classes];
        for (_, label) in &points {
            right[*label] += 1;
        }
        let mut left = vec![0usize; self.data.n_classes];

        let mut best: Option<SplitCandidate> = None;
        for i in 0..total.saturating_sub(1) {
            let (value, label) = points[i];
            left[label] += 1;
            right[label] -= 1;
            let next = points[i + 1].0;
            if value == next {
                continue;
            }
            let n_left = i + 1;
            let n_right = total - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / total as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (f64::from(value) + f64::from(next)) / 2.0,
                    impurity,
                });
            }
        }
        best
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|c| {
            let p = *c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

// ============================================================================
// PREDICTION
// ============================================================================

struct TrainedForest {
    /// Sorted class labels
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl TrainedForest {
    /// Mean class distribution across trees
    fn predict_proba(&self, features: Features) -> Vec<f64> {
        let row = features.to_array();
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(tree.distribution(&row)) {
                *total += p;
            }
        }
        let n_trees = self.trees.len() as f64;
        for total in &mut totals {
            *total /= n_trees;
        }
        totals
    }
}

impl Predictor for TrainedForest {
    fn predict(&self, features: Features) -> &str {
        let proba = self.predict_proba(features);
        &self.classes[argmax(&proba)]
    }
}
