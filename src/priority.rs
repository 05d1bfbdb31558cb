use std::collections::HashMap;

use crate::models::{Priority, TrainingSample};

/// Historical priority mode per (region, category).
///
/// Ties resolve toward the more urgent level, so an evenly split history
/// between `High` and `Low` reports `High`.
#[derive(Debug, Clone)]
pub struct PriorityEstimator {
    counts: HashMap<(String, String), [usize; 3]>,
    fallback: Priority,
}

impl PriorityEstimator {
    pub fn new(samples: &[TrainingSample], fallback: Priority) -> Self {
        let mut counts: HashMap<(String, String), [usize; 3]> = HashMap::new();
        for sample in samples {
            counts
                .entry((sample.region.clone(), sample.category.clone()))
                .or_default()[sample.priority.index()] += 1;
        }
        Self { counts, fallback }
    }

    pub fn estimate(&self, region: &str, category: &str) -> Priority {
        let Some(counts) = self.counts.get(&(region.to_string(), category.to_string())) else {
            return self.fallback;
        };

        let mut best: Option<(Priority, usize)> = None;
        for priority in Priority::ALL.into_iter().rev() {
            let count = counts[priority.index()];
            if count > 0 && best.map_or(true, |(_, top)| count > top) {
                best = Some((priority, count));
            }
        }
        best.map_or(self.fallback, |(priority, _)| priority)
    }
}
