use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::models::Priority;

pub const CATEGORY_PLACEHOLDER: &str = "{category}";
pub const MAX_HORIZON_DAYS: u32 = 366;

const DEFAULT_MESSAGES: [(&str, &str); 8] = [
    ("Road / Potholes", "Potholes may increase due to rainy season."),
    (
        "Garbage / Waste",
        "Garbage is likely to accumulate; timely disposal recommended.",
    ),
    (
        "Streetlight / Broken",
        "Streetlights may fail; maintenance might be needed.",
    ),
    (
        "Water / Leakage",
        "Water supply may face leakages or interruptions due to aging pipelines or seasonal effects.",
    ),
    (
        "Electricity / Power Cut",
        "Electricity may be disrupted in this area, especially during rainy/maintenance periods.",
    ),
    (
        "Traffic / Transport",
        "Traffic congestion may increase during peak hours.",
    ),
    ("Pollution", "Pollution levels might rise; caution advised."),
    (
        "Public Facility / Park",
        "Public facility issues or park wear-and-tear may be reported.",
    ),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Regions with fewer usable samples than this are excluded entirely.
    pub min_volume_threshold: usize,
    pub horizon_days: u32,
    pub category_messages: BTreeMap<String, String>,
    /// Used when a category has no curated message; `{category}` is substituted.
    pub fallback_template: String,
    pub fallback_priority: Priority,
    pub model: ModelConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_volume_threshold: 10,
            horizon_days: 3,
            category_messages: DEFAULT_MESSAGES
                .iter()
                .map(|(category, message)| (category.to_string(), message.to_string()))
                .collect(),
            fallback_template: format!("{CATEGORY_PLACEHOLDER} may occur due to past trends."),
            fallback_priority: Priority::Low,
            model: ModelConfig::default(),
        }
    }
}

impl ForecastConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: ForecastConfig = toml::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=MAX_HORIZON_DAYS).contains(&self.horizon_days),
            "horizon_days must be between 1 and {MAX_HORIZON_DAYS}"
        );
        anyhow::ensure!(
            self.min_volume_threshold > 0,
            "min_volume_threshold must be at least 1"
        );
        anyhow::ensure!(self.model.n_trees > 0, "model.n_trees must be at least 1");
        Ok(())
    }

    /// Curated message for `category`, or the fallback template. Never empty.
    pub fn describe(&self, category: &str) -> String {
        match self.category_messages.get(category) {
            Some(message) if !message.trim().is_empty() => message.clone(),
            _ => {
                let text = self.fallback_template.replace(CATEGORY_PLACEHOLDER, category);
                if text.trim().is_empty() {
                    format!("{category} may occur due to past trends.")
                } else {
                    text
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    Frequency,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub n_trees: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    /// Features tried per split; `None` means the square root of the feature count.
    pub max_features: Option<usize>,
    pub min_samples_split: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Frequency,
            n_trees: 100,
            seed: 42,
            max_depth: None,
            max_features: None,
            min_samples_split: 2,
        }
    }
}
