//! Watch history, search history and achievements.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::begin_immediate;
use crate::database::models::{AchievementDbModel, SearchHistoryDbModel, WatchHistoryDbModel};
use crate::database::retry::retry_on_sqlite_busy;
use crate::Result;

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Record a watch and trim the table to the `keep` most recent rows.
    async fn record_watch(&self, entry: &WatchHistoryDbModel, keep: u32) -> Result<()>;
    async fn list_watch_history(&self, limit: u32) -> Result<Vec<WatchHistoryDbModel>>;
    /// Record a search query and trim the table to the `keep` most recent rows.
    async fn record_search(&self, query: &str, at_ms: i64, keep: u32) -> Result<()>;
    async fn list_search_history(&self, limit: u32) -> Result<Vec<SearchHistoryDbModel>>;
    /// Unlock an achievement. Returns `false` if it was already unlocked.
    async fn unlock_achievement(&self, achievement: &AchievementDbModel) -> Result<bool>;
    async fn list_achievements(&self) -> Result<Vec<AchievementDbModel>>;
}

pub struct SqlxHistoryRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxHistoryRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

#[async_trait]
impl HistoryRepository for SqlxHistoryRepository {
    async fn record_watch(&self, entry: &WatchHistoryDbModel, keep: u32) -> Result<()> {
        retry_on_sqlite_busy("record_watch", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            sqlx::query(
                r#"
                INSERT INTO watch_history (channel_id, video_id, title, page_url, thumbnail_url, watched_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(channel_id, video_id) DO UPDATE SET
                    title = excluded.title,
                    page_url = excluded.page_url,
                    thumbnail_url = excluded.thumbnail_url,
                    watched_at = excluded.watched_at
                "#,
            )
            .bind(&entry.channel_id)
            .bind(&entry.video_id)
            .bind(&entry.title)
            .bind(&entry.page_url)
            .bind(&entry.thumbnail_url)
            .bind(entry.watched_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                DELETE FROM watch_history WHERE rowid NOT IN (
                    SELECT rowid FROM watch_history ORDER BY watched_at DESC LIMIT ?
                )
                "#,
            )
            .bind(i64::from(keep))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn list_watch_history(&self, limit: u32) -> Result<Vec<WatchHistoryDbModel>> {
        let entries = sqlx::query_as::<_, WatchHistoryDbModel>(
            "SELECT * FROM watch_history ORDER BY watched_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn record_search(&self, query: &str, at_ms: i64, keep: u32) -> Result<()> {
        retry_on_sqlite_busy("record_search", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            sqlx::query(
                r#"
                INSERT INTO search_history (query, searched_at) VALUES (?, ?)
                ON CONFLICT(query) DO UPDATE SET searched_at = excluded.searched_at
                "#,
            )
            .bind(query)
            .bind(at_ms)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                DELETE FROM search_history WHERE query NOT IN (
                    SELECT query FROM search_history ORDER BY searched_at DESC LIMIT ?
                )
                "#,
            )
            .bind(i64::from(keep))
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn list_search_history(&self, limit: u32) -> Result<Vec<SearchHistoryDbModel>> {
        let entries = sqlx::query_as::<_, SearchHistoryDbModel>(
            "SELECT * FROM search_history ORDER BY searched_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    async fn unlock_achievement(&self, achievement: &AchievementDbModel) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO achievements (id, title, unlocked_at) VALUES (?, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&achievement.id)
        .bind(&achievement.title)
        .bind(achievement.unlocked_at)
        .execute(&self.write_pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_achievements(&self) -> Result<Vec<AchievementDbModel>> {
        let achievements = sqlx::query_as::<_, AchievementDbModel>(
            "SELECT * FROM achievements ORDER BY unlocked_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(achievements)
    }
}
