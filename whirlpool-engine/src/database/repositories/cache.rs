//! Cache entry repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::CacheEntryDbModel;
use crate::Result;

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn get_entry(&self, fingerprint: &str) -> Result<Option<CacheEntryDbModel>>;
    async fn put_entry(&self, entry: &CacheEntryDbModel) -> Result<()>;
    async fn delete_entry(&self, fingerprint: &str) -> Result<()>;
    /// Delete entries created before `cutoff_ms`. Returns rows removed.
    async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64>;
}

pub struct SqlxCacheRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxCacheRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl CacheRepository for SqlxCacheRepository {
    async fn get_entry(&self, fingerprint: &str) -> Result<Option<CacheEntryDbModel>> {
        let entry = sqlx::query_as::<_, CacheEntryDbModel>(
            "SELECT * FROM cache_entries WHERE fingerprint = ?",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn put_entry(&self, entry: &CacheEntryDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (fingerprint, kind, payload, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                created_at = excluded.created_at
            "#,
        )
        .bind(&entry.fingerprint)
        .bind(&entry.kind)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    async fn delete_entry(&self, fingerprint: &str) -> Result<()> {
        sqlx::query("DELETE FROM cache_entries WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE created_at < ?")
            .bind(cutoff_ms)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected())
    }
}
