use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Urgency attached to a reported issue and carried over to forecasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority {0:?}")]
pub struct UnknownPriority(pub String);

impl FromStr for Priority {
    type Err = UnknownPriority;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownPriority(value.to_string()))
    }
}

/// A citizen-reported issue as read from the corpus. Every field may be absent;
/// only the feature builder decides whether a record is usable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueRecord {
    pub region: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub date: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub upvotes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSample {
    pub region: String,
    /// Monday = 0.
    pub day_of_week: u32,
    pub month: u32,
    pub category: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRecord {
    #[serde(rename = "pincode")]
    pub region: String,
    #[serde(rename = "predicted_issue")]
    pub category: String,
    pub expected_date: NaiveDate,
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub upvotes: i64,
}

impl ForecastRecord {
    pub fn key(&self) -> ForecastKey {
        ForecastKey {
            region: self.region.clone(),
            category: self.category.clone(),
            expected_date: self.expected_date,
        }
    }
}

/// Natural key of a forecast, used to match external upvotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForecastKey {
    pub region: String,
    pub category: String,
    pub expected_date: NaiveDate,
}

impl fmt::Display for ForecastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{}__{}", self.category, self.region, self.expected_date)
    }
}

#[derive(Debug, Clone)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
    pub upvotes: i64,
}
