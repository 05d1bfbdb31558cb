use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CategorySummary, ForecastRecord, Priority};

pub fn summarize_by_category(forecasts: &[ForecastRecord]) -> Vec<CategorySummary> {
    let mut map: std::collections::BTreeMap<&str, (usize, i64)> =
        std::collections::BTreeMap::new();

    for forecast in forecasts {
        let entry = map.entry(forecast.category.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += forecast.upvotes;
    }

    let mut summaries: Vec<CategorySummary> = map
        .into_iter()
        .map(|(category, (count, upvotes))| CategorySummary {
            category: category.to_string(),
            count,
            upvotes,
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

pub fn high_risk(forecasts: &[ForecastRecord]) -> Vec<&ForecastRecord> {
    forecasts
        .iter()
        .filter(|f| f.priority == Priority::High)
        .collect()
}

pub fn build_report(generated_on: NaiveDate, forecasts: &[ForecastRecord]) -> String {
    let summaries = summarize_by_category(forecasts);

    let mut output = String::new();

    let _ = writeln!(output, "# Civic Issue Forecast Report");
    let _ = writeln!(
        output,
        "Generated on {} ({} forecasts)",
        generated_on,
        forecasts.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No forecasts available. Run `train` first.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} forecasts ({} upvotes)",
                summary.category, summary.count, summary.upvotes
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## High Risk Areas");

    let risky = high_risk(forecasts);
    if risky.is_empty() {
        let _ = writeln!(output, "No high priority forecasts.");
    } else {
        for forecast in risky {
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                forecast.region, forecast.expected_date, forecast.category
            );
        }
    }

    let mut ordered: Vec<&ForecastRecord> = forecasts.iter().collect();
    ordered.sort_by(|a, b| {
        (&a.region, a.expected_date, &a.category).cmp(&(&b.region, b.expected_date, &b.category))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Forecasts by Region");

    let mut current_region: Option<&str> = None;
    for forecast in ordered {
        if current_region != Some(forecast.region.as_str()) {
            let _ = writeln!(output, "### {}", forecast.region);
            current_region = Some(forecast.region.as_str());
        }
        let _ = writeln!(
            output,
            "- {} {} [{}] {} ({} upvotes)",
            forecast.expected_date,
            forecast.category,
            forecast.priority,
            forecast.description,
            forecast.upvotes
        );
    }

    output
}
