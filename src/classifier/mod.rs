//! Category classifiers.
//!
//! A [`Classifier`] is fit on labelled feature vectors and yields a [`Predictor`].
//! Any supervised algorithm can sit behind the pair; the pipeline only relies on
//! the predictor favouring the historical majority category for a region and
//! calendar position.

mod forest;
mod frequency;

pub use forest::RandomForest;
pub use frequency::FrequencyTable;

use crate::config::{ModelConfig, ModelKind};

pub const FEATURE_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Features {
    pub region: u32,
    pub day_of_week: u32,
    pub month: u32,
}

impl Features {
    pub fn new(region: u32, day_of_week: u32, month: u32) -> Self {
        Self {
            region,
            day_of_week,
            month,
        }
    }

    pub fn to_array(self) -> [u32; FEATURE_COUNT] {
        [self.region, self.day_of_week, self.month]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LabeledExample<'a> {
    pub features: Features,
    pub label: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("cannot train on an empty sample set")]
    EmptyTrainingSet,
    #[error("invalid classifier parameter: {0}")]
    InvalidParameter(String),
}

pub trait Classifier {
    fn name(&self) -> &'static str;

    fn fit(&self, examples: &[LabeledExample<'_>]) -> Result<Box<dyn Predictor>, ClassifierError>;
}

pub trait Predictor {
    fn predict(&self, features: Features) -> &str;
}

pub fn from_config(config: &ModelConfig) -> Box<dyn Classifier + Send + Sync> {
    match config.kind {
        ModelKind::RandomForest => Box::new(RandomForest::from_config(config)),
        ModelKind::Frequency => Box::new(FrequencyTable),
    }
}

/// Sorted distinct labels and each example's index into them.
pub(crate) fn index_labels(examples: &[LabeledExample<'_>]) -> (Vec<String>, Vec<usize>) {
    let mut classes: Vec<String> = examples.iter().map(|e| e.label.to_string()).collect();
    classes.sort();
    classes.dedup();
    let indices = examples
        .iter()
        .map(|e| {
            classes
                .binary_search_by(|class| class.as_str().cmp(e.label))
                .unwrap_or_default()
        })
        .collect();
    (classes, indices)
}

/// Index of the largest value; ties go to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (index, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = index;
        }
    }
    best
}
