//! Metadata store trait and the SQLite implementation.

use crate::error::MetadataResult;
use crate::models::{Artifact, ArtifactRow, BinaryRow, parse_checksum};
use crate::repos::{ArtifactRepo, BinaryRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use strata_core::{BinaryData, Sha1Checksum};
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: BinaryRepo + ArtifactRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // Single writer: avoids "database is locked" under axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened sqlite metadata store");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;

    #[async_trait]
    impl BinaryRepo for SqliteStore {
        async fn insert_binary(&self, binary: &BinaryData) -> MetadataResult<BinaryData> {
            let checksum = binary.checksum.to_hex();
            sqlx::query(
                r#"
                INSERT INTO binaries (checksum, length, created_at, last_used_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(checksum) DO UPDATE SET last_used_at = excluded.last_used_at
                "#,
            )
            .bind(&checksum)
            .bind(binary.length as i64)
            .bind(binary.created_at)
            .bind(binary.last_used_at)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, BinaryRow>("SELECT * FROM binaries WHERE checksum = ?")
                .bind(&checksum)
                .fetch_one(&self.pool)
                .await?;
            BinaryData::try_from(row)
        }

        async fn get_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<Option<BinaryData>> {
            let row = sqlx::query_as::<_, BinaryRow>("SELECT * FROM binaries WHERE checksum = ?")
                .bind(checksum.to_hex())
                .fetch_optional(&self.pool)
                .await?;
            row.map(BinaryData::try_from).transpose()
        }

        async fn list_binaries(&self) -> MetadataResult<Vec<BinaryData>> {
            let rows =
                sqlx::query_as::<_, BinaryRow>("SELECT * FROM binaries ORDER BY checksum")
                    .fetch_all(&self.pool)
                    .await?;
            rows.into_iter().map(BinaryData::try_from).collect()
        }

        async fn delete_binary(&self, checksum: &Sha1Checksum) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM binaries WHERE checksum = ?")
                .bind(checksum.to_hex())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn touch_binary(
            &self,
            checksum: &Sha1Checksum,
            used_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                UPDATE binaries SET last_used_at = ?
                WHERE checksum = ? AND julianday(last_used_at) < julianday(?)
                "#,
            )
            .bind(used_at)
            .bind(checksum.to_hex())
            .bind(used_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl ArtifactRepo for SqliteStore {
        async fn put_artifact(
            &self,
            path: &str,
            checksum: &Sha1Checksum,
        ) -> MetadataResult<Artifact> {
            let now = OffsetDateTime::now_utc();
            sqlx::query(
                r#"
                INSERT INTO artifacts (path, checksum, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(path) DO UPDATE SET
                    checksum = excluded.checksum,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(path)
            .bind(checksum.to_hex())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE path = ?")
                .bind(path)
                .fetch_one(&self.pool)
                .await?;
            Artifact::try_from(row)
        }

        async fn get_artifact(&self, path: &str) -> MetadataResult<Option<Artifact>> {
            let row = sqlx::query_as::<_, ArtifactRow>("SELECT * FROM artifacts WHERE path = ?")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
            row.map(Artifact::try_from).transpose()
        }

        async fn delete_artifact(&self, path: &str) -> MetadataResult<bool> {
            let result = sqlx::query("DELETE FROM artifacts WHERE path = ?")
                .bind(path)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn referenced_checksums(&self) -> MetadataResult<HashSet<Sha1Checksum>> {
            let rows: Vec<String> = sqlx::query_scalar("SELECT DISTINCT checksum FROM artifacts")
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(|raw| parse_checksum(raw)).collect()
        }

        async fn is_referenced(&self, checksum: &Sha1Checksum) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM artifacts WHERE checksum = ?)",
            )
            .bind(checksum.to_hex())
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Binary index: one row per stored blob
CREATE TABLE IF NOT EXISTS binaries (
    checksum TEXT PRIMARY KEY,
    length INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    last_used_at TEXT NOT NULL
);

-- Artifact references: logical path -> checksum
CREATE TABLE IF NOT EXISTS artifacts (
    path TEXT PRIMARY KEY,
    checksum TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_artifacts_checksum ON artifacts(checksum);
"#;
