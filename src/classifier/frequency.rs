use std::collections::HashMap;

use super::{argmax, index_labels, Classifier, ClassifierError, Features, LabeledExample, Predictor};

/// Majority category per (region, day-of-week, month), backing off to
/// (region, month), then region, then the whole training set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequencyTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Cell {
    Exact(u32, u32, u32),
    RegionMonth(u32, u32),
    Region(u32),
    Global,
}

impl Cell {
    fn chain(features: Features) -> [Cell; 4] {
        [
            Cell::Exact(features.region, features.day_of_week, features.month),
            Cell::RegionMonth(features.region, features.month),
            Cell::Region(features.region),
            Cell::Global,
        ]
    }
}

impl Classifier for FrequencyTable {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn fit(&self, examples: &[LabeledExample<'_>]) -> Result<Box<dyn Predictor>, ClassifierError> {
        if examples.is_empty() {
            return Err(ClassifierError::EmptyTrainingSet);
        }

        let (classes, labels) = index_labels(examples);
        let mut counts: HashMap<Cell, Vec<f64>> = HashMap::new();
        for (example, label) in examples.iter().zip(labels) {
            for cell in Cell::chain(example.features) {
                counts.entry(cell).or_insert_with(|| vec![0.0; classes.len()])[label] += 1.0;
            }
        }

        Ok(Box::new(TrainedTable { classes, counts }))
    }
}

struct TrainedTable {
    classes: Vec<String>,
    counts: HashMap<Cell, Vec<f64>>,
}

impl Predictor for TrainedTable {
    fn predict(&self, features: Features) -> &str {
        let best = Cell::chain(features)
            .iter()
            .find_map(|cell| self.counts.get(cell))
            .map_or(0, |counts| argmax(counts));
        &self.classes[best]
    }
}
