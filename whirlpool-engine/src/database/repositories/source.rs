//! Source server repository.
//!
//! Owns the "exactly one active source" invariant: every mutation that
//! touches `is_active` runs inside a single `BEGIN IMMEDIATE` transaction
//! that clears the current active row before setting a new one.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::begin_immediate;
use crate::database::models::SourceServerDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::{Error, Result};

#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// All sources, oldest first.
    async fn list_sources(&self) -> Result<Vec<SourceServerDbModel>>;
    async fn get_source(&self, base_url: &str) -> Result<Option<SourceServerDbModel>>;
    async fn get_active_source(&self) -> Result<Option<SourceServerDbModel>>;
    /// Insert a new source and make it the active one.
    ///
    /// Fails with a validation error if the base URL is already configured.
    async fn insert_active_source(&self, source: &SourceServerDbModel) -> Result<()>;
    /// Remove a source. If it was active, the oldest remaining source is
    /// promoted. Returns `false` when the URL is unknown.
    async fn remove_source(&self, base_url: &str) -> Result<bool>;
    /// Make `base_url` the single active source. Returns `false` when the URL
    /// is unknown, leaving the current active source untouched.
    async fn set_active_source(&self, base_url: &str) -> Result<bool>;
    async fn update_source_metadata(
        &self,
        base_url: &str,
        title: &str,
        icon_url: Option<&str>,
        color: Option<&str>,
    ) -> Result<()>;
}

pub struct SqlxSourceRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxSourceRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl SourceRepository for SqlxSourceRepository {
    async fn list_sources(&self) -> Result<Vec<SourceServerDbModel>> {
        let sources = sqlx::query_as::<_, SourceServerDbModel>(
            "SELECT * FROM source_servers ORDER BY created_at, base_url",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sources)
    }

    async fn get_source(&self, base_url: &str) -> Result<Option<SourceServerDbModel>> {
        let source = sqlx::query_as::<_, SourceServerDbModel>(
            "SELECT * FROM source_servers WHERE base_url = ?",
        )
        .bind(base_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    async fn get_active_source(&self) -> Result<Option<SourceServerDbModel>> {
        let source = sqlx::query_as::<_, SourceServerDbModel>(
            "SELECT * FROM source_servers WHERE is_active = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(source)
    }

    async fn insert_active_source(&self, source: &SourceServerDbModel) -> Result<()> {
        retry_on_sqlite_busy("insert_active_source", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let (exists,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM source_servers WHERE base_url = ?")
                    .bind(&source.base_url)
                    .fetch_one(&mut *tx)
                    .await?;
            if exists > 0 {
                tx.rollback().await?;
                return Err(Error::validation(format!(
                    "source '{}' is already configured",
                    source.base_url
                )));
            }

            sqlx::query("UPDATE source_servers SET is_active = 0 WHERE is_active = 1")
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                r#"
                INSERT INTO source_servers (base_url, title, icon_url, color, is_active, created_at)
                VALUES (?, ?, ?, ?, 1, ?)
                "#,
            )
            .bind(&source.base_url)
            .bind(&source.title)
            .bind(&source.icon_url)
            .bind(&source.color)
            .bind(source.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn remove_source(&self, base_url: &str) -> Result<bool> {
        retry_on_sqlite_busy("remove_source", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let removed: Option<(i64,)> =
                sqlx::query_as("DELETE FROM source_servers WHERE base_url = ? RETURNING is_active")
                    .bind(base_url)
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some((was_active,)) = removed else {
                tx.rollback().await?;
                return Ok(false);
            };

            if was_active == 1 {
                sqlx::query(
                    r#"
                    UPDATE source_servers SET is_active = 1
                    WHERE base_url = (
                        SELECT base_url FROM source_servers
                        ORDER BY created_at, base_url LIMIT 1
                    )
                    "#,
                )
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(true)
        })
        .await
    }

    async fn set_active_source(&self, base_url: &str) -> Result<bool> {
        retry_on_sqlite_busy("set_active_source", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let target: Option<(i64,)> =
                sqlx::query_as("SELECT is_active FROM source_servers WHERE base_url = ?")
                    .bind(base_url)
                    .fetch_optional(&mut *tx)
                    .await?;

            match target {
                None => {
                    tx.rollback().await?;
                    Ok(false)
                }
                Some((1,)) => {
                    tx.rollback().await?;
                    Ok(true)
                }
                Some(_) => {
                    sqlx::query("UPDATE source_servers SET is_active = 0 WHERE is_active = 1")
                        .execute(&mut *tx)
                        .await?;
                    sqlx::query("UPDATE source_servers SET is_active = 1 WHERE base_url = ?")
                        .bind(base_url)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                    Ok(true)
                }
            }
        })
        .await
    }

    async fn update_source_metadata(
        &self,
        base_url: &str,
        title: &str,
        icon_url: Option<&str>,
        color: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE source_servers SET
                title = ?,
                icon_url = COALESCE(?, icon_url),
                color = COALESCE(?, color)
            WHERE base_url = ?
            "#,
        )
        .bind(title)
        .bind(icon_url)
        .bind(color)
        .bind(base_url)
        .execute(&self.write_pool)
        .await?;
        Ok(())
    }
}
