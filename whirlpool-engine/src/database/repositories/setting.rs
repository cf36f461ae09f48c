//! Generic key/value settings repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::SettingDbModel;
use crate::database::time::now_ms;
use crate::Result;

#[async_trait]
pub trait SettingRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> Result<()>;
    async fn remove_setting(&self, key: &str) -> Result<bool>;
    /// Settings whose key starts with `prefix`, ordered by key.
    async fn list_settings(&self, prefix: &str) -> Result<Vec<SettingDbModel>>;
}

pub struct SqlxSettingRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxSettingRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl SettingRepository for SqlxSettingRepository {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map(|(v,)| v))
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now_ms())
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }

    async fn remove_setting(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_settings(&self, prefix: &str) -> Result<Vec<SettingDbModel>> {
        // substr comparison avoids LIKE wildcard escaping for prefixes containing % or _.
        let settings = sqlx::query_as::<_, SettingDbModel>(
            "SELECT * FROM settings WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(settings)
    }
}
