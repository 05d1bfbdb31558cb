use chrono::{Duration, NaiveDate};

use crate::models::IssueRecord;

pub const SEED_OWNER: &str = "seed_issues";

struct SeedPattern {
    pincode: &'static str,
    category: &'static str,
    priority: &'static str,
    first: (i32, u32, u32),
    count: i64,
    step_days: i64,
}

const PATTERNS: [SeedPattern; 7] = [
    SeedPattern {
        pincode: "500001",
        category: "Road / Potholes",
        priority: "High",
        first: (2025, 7, 7),
        count: 8,
        step_days: 11,
    },
    SeedPattern {
        pincode: "500001",
        category: "Garbage / Waste",
        priority: "Low",
        first: (2026, 2, 14),
        count: 4,
        step_days: 9,
    },
    SeedPattern {
        pincode: "500032",
        category: "Water / Leakage",
        priority: "Medium",
        first: (2025, 11, 3),
        count: 7,
        step_days: 13,
    },
    SeedPattern {
        pincode: "500032",
        category: "Electricity / Power Cut",
        priority: "High",
        first: (2026, 6, 1),
        count: 5,
        step_days: 6,
    },
    SeedPattern {
        pincode: "110001",
        category: "Traffic / Transport",
        priority: "Medium",
        first: (2026, 1, 5),
        count: 6,
        step_days: 7,
    },
    SeedPattern {
        pincode: "110001",
        category: "Pollution",
        priority: "High",
        first: (2025, 10, 20),
        count: 5,
        step_days: 4,
    },
    SeedPattern {
        pincode: "400050",
        category: "Streetlight / Broken",
        priority: "Low",
        first: (2026, 4, 10),
        count: 4,
        step_days: 15,
    },
];

/// Deterministic demo corpus: three busy regions and one that stays below
/// the default volume threshold.
pub fn seed_issues() -> Vec<IssueRecord> {
    let mut issues = Vec::new();
    for pattern in &PATTERNS {
        let (year, month, day) = pattern.first;
        let Some(first) = NaiveDate::from_ymd_opt(year, month, day) else {
            continue;
        };
        for n in 0..pattern.count {
            let date = first + Duration::days(n * pattern.step_days);
            issues.push(IssueRecord {
                region: Some(pattern.pincode.to_string()),
                category: Some(pattern.category.to_string()),
                priority: Some(pattern.priority.to_string()),
                date: Some(date.format("%Y-%m-%d").to_string()),
                title: Some(format!("{} report #{}", pattern.category, n + 1)),
                description: Some(format!("Reported near {}", pattern.pincode)),
                status: Some(if n % 3 == 0 { "Resolved" } else { "Pending" }.to_string()),
                upvotes: n % 4,
            });
        }
    }
    issues
}
