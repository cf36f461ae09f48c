//! Download index repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::begin_immediate;
use crate::database::models::DownloadDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::Result;

#[async_trait]
pub trait DownloadRepository: Send + Sync {
    async fn get_download(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> Result<Option<DownloadDbModel>>;
    /// Insert or replace the record for `(channel_id, video_id)`.
    ///
    /// Returns the previous record's file path when it differs from the new one.
    async fn upsert_download(&self, record: &DownloadDbModel) -> Result<Option<String>>;
    /// All records, newest first.
    async fn list_downloads(&self) -> Result<Vec<DownloadDbModel>>;
    /// Delete a record, returning it if it existed.
    async fn remove_download(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> Result<Option<DownloadDbModel>>;
}

pub struct SqlxDownloadRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxDownloadRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl DownloadRepository for SqlxDownloadRepository {
    async fn get_download(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> Result<Option<DownloadDbModel>> {
        let record = sqlx::query_as::<_, DownloadDbModel>(
            "SELECT * FROM downloads WHERE channel_id = ? AND video_id = ?",
        )
        .bind(channel_id)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert_download(&self, record: &DownloadDbModel) -> Result<Option<String>> {
        retry_on_sqlite_busy("upsert_download", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let previous: Option<(String,)> = sqlx::query_as(
                "SELECT file_path FROM downloads WHERE channel_id = ? AND video_id = ?",
            )
            .bind(&record.channel_id)
            .bind(&record.video_id)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO downloads (channel_id, video_id, file_path, title, page_url, file_size, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(channel_id, video_id) DO UPDATE SET
                    file_path = excluded.file_path,
                    title = excluded.title,
                    page_url = excluded.page_url,
                    file_size = excluded.file_size,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&record.channel_id)
            .bind(&record.video_id)
            .bind(&record.file_path)
            .bind(&record.title)
            .bind(&record.page_url)
            .bind(record.file_size)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(previous
                .map(|(path,)| path)
                .filter(|path| *path != record.file_path))
        })
        .await
    }

    async fn list_downloads(&self) -> Result<Vec<DownloadDbModel>> {
        let records = sqlx::query_as::<_, DownloadDbModel>(
            "SELECT * FROM downloads ORDER BY created_at DESC, channel_id, video_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn remove_download(
        &self,
        channel_id: &str,
        video_id: &str,
    ) -> Result<Option<DownloadDbModel>> {
        let record = sqlx::query_as::<_, DownloadDbModel>(
            "DELETE FROM downloads WHERE channel_id = ? AND video_id = ? RETURNING *",
        )
        .bind(channel_id)
        .bind(video_id)
        .fetch_optional(&self.write_pool)
        .await?;
        Ok(record)
    }
}
