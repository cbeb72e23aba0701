use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

/// A cached article summary, keyed by the exact URL it was produced for
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRecord {
    pub url: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Summary cache backed by the `summaries` table.
///
/// Keys are compared by exact string equality; no URL normalization happens here.
#[derive(Clone)]
pub struct SummaryStore {
    pool: SqlitePool,
}

impl SummaryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn lookup(&self, url: &str) -> Result<Option<SummaryRecord>, sqlx::Error> {
        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT url, summary, created_at, updated_at FROM summaries WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SummaryRecord::try_from).transpose()
    }

    /// Store `summary` for `url` unless a record already exists, and return whichever
    /// record ends up stored. The first writer wins when two runs race.
    pub async fn insert_if_absent(
        &self,
        url: &str,
        summary: &str,
    ) -> Result<SummaryRecord, sqlx::Error> {
        let result = sqlx::query("INSERT OR IGNORE INTO summaries (url, summary) VALUES (?, ?)")
            .bind(url)
            .bind(summary)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            info!("storage: summary for {} already cached, keeping existing record", url);
        } else {
            info!("storage: cached summary for {}", url);
        }

        let row = sqlx::query_as::<_, SummaryRow>(
            "SELECT url, summary, created_at, updated_at FROM summaries WHERE url = ?",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        SummaryRecord::try_from(row)
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct SummaryRow {
    url: String,
    summary: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SummaryRow> for SummaryRecord {
    type Error = sqlx::Error;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(SummaryRecord {
            url: row.url,
            summary: row.summary,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
