//! src/services/cache_store.rs
//!
//! LocalCacheStore: durable key/record persistence for the gallery, backed by
//! SQLite. Two independent namespaces live side by side: `images` (cache
//! entries keyed by bucket-qualified object key) and `buckets` (connection
//! profiles keyed by alias). The store only upserts whole records; merging
//! version lists is done by the reconciler before `put` is called.

use crate::models::{
    cache_entry::{CacheBody, CacheEntry},
    profile::BucketProfile,
};
use chrono::{DateTime, Utc};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

/// Schema version this build expects.
pub const SCHEMA_VERSION: i64 = 2;

/// Additive migrations, applied in order. Each one only creates what is missing.
const MIGRATIONS: [(i64, &str); 2] = [
    (1, include_str!("../../migrations/0001_images.sql")),
    (2, include_str!("../../migrations/0002_buckets.sql")),
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open cache store `{url}`: {source}")]
    Open {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("migration {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("cache record `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct LocalCacheStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl LocalCacheStore {
    /// Open (creating if needed) the database at `url` and bring its schema up
    /// to [`SCHEMA_VERSION`].
    pub async fn open(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| StoreError::Open {
                url: url.to_string(),
                source,
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::Open {
                url: url.to_string(),
                source,
            })?;

        let store = Self::from_pool(pool);
        store.migrate(SCHEMA_VERSION).await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { db: Arc::new(pool) }
    }

    /// Version recorded in `schema_version`, 0 for a fresh database.
    pub async fn schema_version(&self) -> StoreResult<i64> {
        self.ensure_version_table().await?;
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&*self.db)
            .await?;
        Ok(version.unwrap_or(0))
    }

    /// Apply every migration above the recorded version up to `target`.
    ///
    /// Idempotent: calling again with the same target is a no-op, and existing
    /// namespaces are never dropped or rewritten.
    pub async fn migrate(&self, target: i64) -> StoreResult<()> {
        let current = self.schema_version().await?;
        for (version, sql) in MIGRATIONS {
            if version <= current || version > target {
                continue;
            }

            let statements = split_statements(sql);
            info!(
                "Applying cache schema migration {} ({} statements)",
                version,
                statements.len()
            );

            let mut tx = self
                .db
                .begin()
                .await
                .map_err(|source| StoreError::Migration { version, source })?;
            for stmt in statements {
                debug!("Executing migration SQL: {}", stmt);
                sqlx::query(&stmt)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| StoreError::Migration { version, source })?;
            }
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(version)
                .bind(Utc::now().timestamp_millis())
                .execute(&mut *tx)
                .await
                .map_err(|source| StoreError::Migration { version, source })?;
            tx.commit()
                .await
                .map_err(|source| StoreError::Migration { version, source })?;
        }
        Ok(())
    }

    async fn ensure_version_table(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Fetch a cache entry by its bucket-qualified key.
    ///
    /// Returns `Ok(None)` for a missing key. Staleness is not checked here.
    pub async fn get(&self, key: &str) -> StoreResult<Option<CacheEntry>> {
        let row = sqlx::query("SELECT key, expires_at, body FROM images WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let key: String = row.try_get("key")?;
        let expires_ms: i64 = row.try_get("expires_at")?;
        let body: String = row.try_get("body")?;

        let expires_at =
            DateTime::<Utc>::from_timestamp_millis(expires_ms).ok_or_else(|| {
                StoreError::Corrupt {
                    key: key.clone(),
                    reason: format!("expires_at {} out of range", expires_ms),
                }
            })?;
        let body: CacheBody = serde_json::from_str(&body)?;

        Ok(Some(CacheEntry {
            key,
            expires_at,
            body,
        }))
    }

    /// Upsert an entry, replacing any existing record with the same key in full.
    pub async fn put(&self, entry: &CacheEntry) -> StoreResult<()> {
        let body = serde_json::to_string(&entry.body)?;
        sqlx::query(
            r#"
            INSERT INTO images (key, expires_at, body) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                expires_at = excluded.expires_at,
                body = excluded.body
            "#,
        )
        .bind(&entry.key)
        .bind(entry.expires_at.timestamp_millis())
        .bind(body)
        .execute(&*self.db)
        .await?;
        debug!("cached entry {}", entry.key);
        Ok(())
    }

    /// Delete every entry whose expiry is at or before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM images WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected())
    }

    /// Insert or replace a profile by alias. A re-saved alias keeps its
    /// original position in [`list_bucket_profiles`](Self::list_bucket_profiles).
    pub async fn put_bucket_profile(&self, profile: &BucketProfile) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO buckets (alias, bucket_name, region, access_key_id, secret_access_key)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(alias) DO UPDATE SET
                bucket_name = excluded.bucket_name,
                region = excluded.region,
                access_key_id = excluded.access_key_id,
                secret_access_key = excluded.secret_access_key
            "#,
        )
        .bind(&profile.alias)
        .bind(&profile.bucket_name)
        .bind(&profile.region)
        .bind(&profile.access_key_id)
        .bind(&profile.secret_access_key)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// All saved profiles in insertion order.
    pub async fn list_bucket_profiles(&self) -> StoreResult<Vec<BucketProfile>> {
        let profiles = sqlx::query_as::<_, BucketProfile>(
            "SELECT alias, bucket_name, region, access_key_id, secret_access_key
             FROM buckets ORDER BY seq ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(profiles)
    }

    pub async fn get_bucket_profile(&self, alias: &str) -> StoreResult<Option<BucketProfile>> {
        let profile = sqlx::query_as::<_, BucketProfile>(
            "SELECT alias, bucket_name, region, access_key_id, secret_access_key
             FROM buckets WHERE alias = ?",
        )
        .bind(alias)
        .fetch_optional(&*self.db)
        .await?;
        Ok(profile)
    }

    /// Most recently inserted profile, used to restore a session when no alias is known.
    pub async fn latest_bucket_profile(&self) -> StoreResult<Option<BucketProfile>> {
        let profile = sqlx::query_as::<_, BucketProfile>(
            "SELECT alias, bucket_name, region, access_key_id, secret_access_key
             FROM buckets ORDER BY seq DESC LIMIT 1",
        )
        .fetch_optional(&*self.db)
        .await?;
        Ok(profile)
    }
}

/// Split a migration file into executable statements, dropping `--` comments.
fn split_statements(sql: &str) -> Vec<String> {
    let stripped = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
