use std::io::Read;
use std::path::Path;

use anyhow::Context;

use crate::models::IssueRecord;

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    #[serde(alias = "region")]
    pincode: Option<String>,
    category: Option<String>,
    priority: Option<String>,
    date: Option<String>,
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    upvotes: Option<i64>,
}

impl From<CsvRow> for IssueRecord {
    fn from(row: CsvRow) -> Self {
        IssueRecord {
            region: row.pincode,
            category: row.category,
            priority: row.priority,
            date: row.date,
            title: row.title,
            description: row.description,
            status: row.status,
            upvotes: row.upvotes.unwrap_or(0),
        }
    }
}

pub fn read_issues_csv(csv_path: &Path) -> anyhow::Result<Vec<IssueRecord>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    read_issues(file).with_context(|| format!("invalid issue CSV {}", csv_path.display()))
}

/// Rows missing training fields are kept; the pipeline decides what is usable.
pub fn read_issues<R: Read>(input: R) -> anyhow::Result<Vec<IssueRecord>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
    let mut issues = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        issues.push(result?.into());
    }

    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_with_optional_fields() {
        let csv = "\
title,description,pincode,category,priority,date,status,upvotes
Big hole,Near school,500001,Road / Potholes,High,2026-03-02,Pending,4
Overflowing bin,,500002,Garbage / Waste,Low,2026-03-05,,
";
        let issues = read_issues(csv.as_bytes()).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].region.as_deref(), Some("500001"));
        assert_eq!(issues[0].upvotes, 4);
        assert_eq!(issues[1].description, None);
        assert_eq!(issues[1].status, None);
        assert_eq!(issues[1].upvotes, 0);
    }

    #[test]
    fn accepts_region_header_alias() {
        let csv = "region,category,priority,date\n110001,Pollution,Medium,2026-01-09\n";
        let issues = read_issues(csv.as_bytes()).unwrap();
        assert_eq!(issues[0].region.as_deref(), Some("110001"));
    }

    #[test]
    fn rejects_non_numeric_upvotes() {
        let csv = "pincode,category,upvotes\n500001,Pollution,many\n";
        assert!(read_issues(csv.as_bytes()).is_err());
    }
}
