//! Persistence seams for the issue corpus and the forecast collection.

mod json;
mod postgres;

pub use json::JsonStore;
pub use postgres::PgStore;

use crate::models::{ForecastKey, ForecastRecord, IssueRecord};

/// Read side of the historical issue corpus, plus the bulk writers used by
/// seeding and CSV import.
pub trait IssueRepository {
    async fn list_issues(&self) -> anyhow::Result<Vec<IssueRecord>>;

    async fn append_issues(&self, owner: &str, issues: &[IssueRecord]) -> anyhow::Result<usize>;

    /// Replaces every issue held under `owner`.
    async fn replace_owner_issues(
        &self,
        owner: &str,
        issues: &[IssueRecord],
    ) -> anyhow::Result<usize>;
}

pub trait ForecastSink {
    /// Guard excluding other pipeline runs against this store, including
    /// runs in other processes.
    type Lock;

    async fn lock(&self) -> anyhow::Result<Self::Lock>;

    /// Replaces the whole stored forecast collection with `forecasts`.
    async fn replace_forecasts(&self, forecasts: &[ForecastRecord]) -> anyhow::Result<()>;
}

pub trait ForecastStore: ForecastSink {
    async fn list_forecasts(&self) -> anyhow::Result<Vec<ForecastRecord>>;

    /// Returns false when no stored forecast has this key.
    async fn upvote(&self, key: &ForecastKey) -> anyhow::Result<bool>;
}
