use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::models::TrainingSample;

#[derive(Debug, Clone, Default)]
pub struct QualifiedSamples {
    /// Sorted region identifiers meeting the volume threshold.
    pub regions: Vec<String>,
    pub samples: Vec<TrainingSample>,
}

impl QualifiedSamples {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

pub fn count_by_region(samples: &[TrainingSample]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for sample in samples {
        *counts.entry(sample.region.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Keeps only regions with at least `min_volume` samples, and their samples.
pub fn qualify(samples: Vec<TrainingSample>, min_volume: usize) -> QualifiedSamples {
    let counts = count_by_region(&samples);
    let regions: Vec<String> = counts
        .iter()
        .filter(|(_, count)| **count >= min_volume)
        .map(|(region, _)| region.to_string())
        .collect();
    debug!(
        qualified = regions.len(),
        excluded = counts.len() - regions.len(),
        min_volume,
        "qualified regions"
    );

    let samples = samples
        .into_iter()
        .filter(|sample| regions.binary_search(&sample.region).is_ok())
        .collect();

    QualifiedSamples { regions, samples }
}

/// Dense integer codes for region identifiers, assigned in lexicographic order.
#[derive(Debug, Clone, Default)]
pub struct RegionEncoding {
    regions: Vec<String>,
    codes: HashMap<String, u32>,
}

impl RegionEncoding {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut regions: Vec<String> = regions.into_iter().map(Into::into).collect();
        regions.sort();
        regions.dedup();
        let codes = regions
            .iter()
            .enumerate()
            .map(|(code, region)| (region.clone(), code as u32))
            .collect();
        Self { regions, codes }
    }

    pub fn encode(&self, region: &str) -> Option<u32> {
        self.codes.get(region).copied()
    }

    pub fn decode(&self, code: u32) -> Option<&str> {
        self.regions.get(code as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Every assigned code, ascending.
    pub fn codes(&self) -> std::ops::Range<u32> {
        0..self.regions.len() as u32
    }
}
