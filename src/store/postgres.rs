use anyhow::Context;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{ForecastSink, ForecastStore, IssueRepository};
use crate::models::{ForecastKey, ForecastRecord, IssueRecord, Priority};

/// Advisory lock key serializing forecast replacement across processes.
const FORECAST_LOCK_KEY: i64 = 0x6369_7669_6366_6331;
/// Session lock key held for a whole pipeline run. Must differ from
/// `FORECAST_LOCK_KEY`, which the run takes again while writing.
const RUN_LOCK_KEY: i64 = 0x6369_7669_6366_6332;

/// Session advisory lock on a connection detached from the pool. Dropping it
/// closes the connection, which ends the session and releases the lock.
#[derive(Debug)]
pub struct PgRunLock {
    _conn: PgConnection,
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn insert_issues(
    tx: &mut Transaction<'_, Postgres>,
    owner: &str,
    issues: &[IssueRecord],
) -> anyhow::Result<usize> {
    for issue in issues {
        sqlx::query(
            r#"
            INSERT INTO civic_forecast.issues
            (id, owner_key, title, description, pincode, category, priority, status, reported_on, upvotes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&issue.title)
        .bind(&issue.description)
        .bind(&issue.region)
        .bind(&issue.category)
        .bind(&issue.priority)
        .bind(&issue.status)
        .bind(&issue.date)
        .bind(issue.upvotes)
        .execute(&mut **tx)
        .await?;
    }
    Ok(issues.len())
}

impl IssueRepository for PgStore {
    async fn list_issues(&self) -> anyhow::Result<Vec<IssueRecord>> {
        let rows = sqlx::query(
            "SELECT title, description, pincode, category, priority, status, reported_on, upvotes \
             FROM civic_forecast.issues",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to read issue corpus")?;

        let mut issues = Vec::with_capacity(rows.len());
        for row in rows {
            issues.push(IssueRecord {
                region: row.get("pincode"),
                category: row.get("category"),
                priority: row.get("priority"),
                date: row.get("reported_on"),
                title: row.get("title"),
                description: row.get("description"),
                status: row.get("status"),
                upvotes: row.get("upvotes"),
            });
        }

        Ok(issues)
    }

    async fn append_issues(&self, owner: &str, issues: &[IssueRecord]) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_issues(&mut tx, owner, issues).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn replace_owner_issues(
        &self,
        owner: &str,
        issues: &[IssueRecord],
    ) -> anyhow::Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM civic_forecast.issues WHERE owner_key = $1")
            .bind(owner)
            .execute(&mut *tx)
            .await?;
        let inserted = insert_issues(&mut tx, owner, issues).await?;
        tx.commit().await?;
        Ok(inserted)
    }
}

impl ForecastSink for PgStore {
    type Lock = PgRunLock;

    async fn lock(&self) -> anyhow::Result<PgRunLock> {
        let mut conn = self.pool.acquire().await?.detach();
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(RUN_LOCK_KEY)
            .execute(&mut conn)
            .await
            .context("failed to take forecast run lock")?;
        Ok(PgRunLock { _conn: conn })
    }

    async fn replace_forecasts(&self, forecasts: &[ForecastRecord]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FORECAST_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM civic_forecast.forecasts")
            .execute(&mut *tx)
            .await?;

        for forecast in forecasts {
            sqlx::query(
                r#"
                INSERT INTO civic_forecast.forecasts
                (pincode, predicted_issue, expected_date, description, priority, upvotes)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&forecast.region)
            .bind(&forecast.category)
            .bind(forecast.expected_date)
            .bind(&forecast.description)
            .bind(forecast.priority.as_str())
            .bind(forecast.upvotes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.context("failed to commit forecasts")?;
        Ok(())
    }
}

impl ForecastStore for PgStore {
    async fn list_forecasts(&self) -> anyhow::Result<Vec<ForecastRecord>> {
        let rows = sqlx::query(
            "SELECT pincode, predicted_issue, expected_date, description, priority, upvotes \
             FROM civic_forecast.forecasts \
             ORDER BY pincode, expected_date, predicted_issue",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut forecasts = Vec::with_capacity(rows.len());
        for row in rows {
            let priority: String = row.get("priority");
            forecasts.push(ForecastRecord {
                region: row.get("pincode"),
                category: row.get("predicted_issue"),
                expected_date: row.get("expected_date"),
                description: row.get("description"),
                priority: priority.parse::<Priority>()?,
                upvotes: row.get("upvotes"),
            });
        }

        Ok(forecasts)
    }

    async fn upvote(&self, key: &ForecastKey) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE civic_forecast.forecasts
            SET upvotes = upvotes + 1
            WHERE pincode = $1 AND predicted_issue = $2 AND expected_date = $3
            "#,
        )
        .bind(&key.region)
        .bind(&key.category)
        .bind(key.expected_date)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
