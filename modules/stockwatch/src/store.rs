//! Seen-store: remembers which products were already notified.
//!
//! One SQLite table, `seen(key TEXT PRIMARY KEY, ts INTEGER)`, where `ts` is the
//! unix time in milliseconds of the most recent `mark_seen`. Rows older than the
//! TTL are purged on every lookup, so an expired key reads as never seen.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use stockwatch_common::DedupKey;

/// Default time-to-live for a seen record.
pub const DEFAULT_SEEN_TTL: Duration = Duration::from_secs(6 * 3600);

/// The narrow interface the poll cycle uses. Implementations own the records
/// exclusively and are the only writer.
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// True iff a non-expired record exists for `key`.
    async fn already_seen(&self, key: &DedupKey) -> Result<bool>;

    /// Insert or refresh the record for `key` with the current time.
    async fn mark_seen(&self, key: &DedupKey) -> Result<()>;
}

/// SQLite-backed seen-store. Survives restarts.
pub struct SqliteSeenStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteSeenStore {
    /// Open (or create) the store at `path`. A missing file starts empty.
    pub async fn open(path: &Path, ttl: Duration) -> Result<Self> {
        let fresh = !path.exists();

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        // Single connection: every write is serialized through it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open seen-store at {}", path.display()))?;

        sqlx::query("CREATE TABLE IF NOT EXISTS seen (key TEXT PRIMARY KEY, ts INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to initialize seen-store schema")?;

        if fresh {
            info!(path = %path.display(), "Initialized new seen-store");
        } else {
            debug!(path = %path.display(), "Opened existing seen-store");
        }

        Ok(Self { pool, ttl })
    }

    /// Delete every record whose age at `now` is at least the TTL. Returns rows removed.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.timestamp_millis().saturating_sub(ttl_ms);
        let result = sqlx::query("DELETE FROM seen WHERE ts <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("Failed to purge expired seen records")?;
        Ok(result.rows_affected())
    }

    pub async fn already_seen_at(&self, key: &DedupKey, now: DateTime<Utc>) -> Result<bool> {
        let purged = self.purge_expired(now).await?;
        if purged > 0 {
            debug!(purged, "Expired seen records removed");
        }

        let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM seen WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up seen record {key}"))?;
        Ok(row.is_some())
    }

    pub async fn mark_seen_at(&self, key: &DedupKey, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO seen (key, ts) VALUES (?, ?)")
            .bind(key.as_str())
            .bind(at.timestamp_millis())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to record seen key {key}"))?;
        Ok(())
    }

    /// Number of records currently stored, expired or not.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM seen")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SeenStore for SqliteSeenStore {
    async fn already_seen(&self, key: &DedupKey) -> Result<bool> {
        self.already_seen_at(key, Utc::now()).await
    }

    async fn mark_seen(&self, key: &DedupKey) -> Result<()> {
        self.mark_seen_at(key, Utc::now()).await
    }
}
