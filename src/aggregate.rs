use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::{IssueRecord, Priority, TrainingSample};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Flattens a corpus document into issue records.
///
/// The document is either an object mapping an owner key to an array of issues,
/// or a bare array. Non-array values and non-object entries are skipped.
pub fn flatten_corpus(corpus: &Value) -> Vec<IssueRecord> {
    let mut records = Vec::new();
    match corpus {
        Value::Object(groups) => {
            for issues in groups.values() {
                if let Value::Array(entries) = issues {
                    records.extend(entries.iter().filter_map(issue_from_value));
                }
            }
        }
        Value::Array(entries) => records.extend(entries.iter().filter_map(issue_from_value)),
        _ => {}
    }
    records
}

pub fn issue_from_value(value: &Value) -> Option<IssueRecord> {
    let fields = value.as_object()?;
    Some(IssueRecord {
        region: text_field(fields, "pincode"),
        category: text_field(fields, "category"),
        priority: text_field(fields, "priority"),
        date: text_field(fields, "date"),
        title: text_field(fields, "title"),
        description: text_field(fields, "description"),
        status: text_field(fields, "status"),
        upvotes: fields
            .get("upvotes")
            .and_then(|v| v.as_i64().or_else(|| v.as_str()?.trim().parse().ok()))
            .unwrap_or(0),
    })
}

pub fn issue_to_value(issue: &IssueRecord) -> Value {
    let mut fields = Map::new();
    let text = [
        ("title", &issue.title),
        ("description", &issue.description),
        ("pincode", &issue.region),
        ("category", &issue.category),
        ("priority", &issue.priority),
        ("date", &issue.date),
        ("status", &issue.status),
    ];
    for (name, value) in text {
        if let Some(value) = value {
            fields.insert(name.to_string(), Value::String(value.clone()));
        }
    }
    fields.insert("upvotes".to_string(), Value::from(issue.upvotes));
    Value::Object(fields)
}

// Blank strings count as absent; postal codes are sometimes stored as numbers.
fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    let text = match fields.get(name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Derives a training sample, or `None` when a required field is missing,
/// the date does not parse, or the priority is not a known level.
pub fn build_sample(issue: &IssueRecord) -> Option<TrainingSample> {
    let region = required(&issue.region)?;
    let category = required(&issue.category)?;
    let date = NaiveDate::parse_from_str(issue.date.as_deref()?.trim(), DATE_FORMAT).ok()?;
    let priority: Priority = issue.priority.as_deref()?.parse().ok()?;

    Some(TrainingSample {
        region: region.to_string(),
        day_of_week: date.weekday().num_days_from_monday(),
        month: date.month(),
        category: category.to_string(),
        priority,
    })
}

// Same normalization for every backend: surrounding whitespace is ignored and
// blank values count as missing.
fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

pub fn build_samples(issues: &[IssueRecord]) -> Vec<TrainingSample> {
    let samples: Vec<TrainingSample> = issues.iter().filter_map(build_sample).collect();
    let dropped = issues.len() - samples.len();
    if dropped > 0 {
        debug!(dropped, kept = samples.len(), "dropped incomplete issue records");
    }
    samples
}
