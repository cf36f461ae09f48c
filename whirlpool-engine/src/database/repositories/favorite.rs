//! Favorites repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::begin_immediate;
use crate::database::models::FavoriteDbModel;
use crate::database::retry::retry_on_sqlite_busy;
use crate::Result;

#[async_trait]
pub trait FavoriteRepository: Send + Sync {
    /// Insert or refresh a favorite. The original `added_at` is kept.
    async fn add_favorite(&self, favorite: &FavoriteDbModel) -> Result<()>;
    async fn remove_favorite(&self, video_id: &str) -> Result<bool>;
    /// Add the favorite if absent, remove it if present, in one transaction.
    /// Returns whether the item is a favorite afterwards.
    async fn toggle_favorite(&self, favorite: &FavoriteDbModel) -> Result<bool>;
    async fn is_favorite(&self, video_id: &str) -> Result<bool>;
    /// All favorites, most recently added first.
    async fn list_favorites(&self) -> Result<Vec<FavoriteDbModel>>;
}

pub struct SqlxFavoriteRepository {
    pool: SqlitePool,
    write_pool: SqlitePool,
}

impl SqlxFavoriteRepository {
    pub fn new(pool: SqlitePool, write_pool: SqlitePool) -> Self {
        Self { pool, write_pool }
    }
}

const UPSERT_FAVORITE: &str = r#"
    INSERT INTO favorites (
        video_id, channel_id, title, page_url, image_url, network,
        author_name, duration_seconds, added_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(video_id) DO UPDATE SET
        channel_id = COALESCE(excluded.channel_id, favorites.channel_id),
        title = excluded.title,
        page_url = excluded.page_url,
        image_url = excluded.image_url,
        network = excluded.network,
        author_name = excluded.author_name,
        duration_seconds = excluded.duration_seconds
"#;

fn bind_favorite<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    favorite: &'q FavoriteDbModel,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&favorite.video_id)
        .bind(&favorite.channel_id)
        .bind(&favorite.title)
        .bind(&favorite.page_url)
        .bind(&favorite.image_url)
        .bind(&favorite.network)
        .bind(&favorite.author_name)
        .bind(favorite.duration_seconds)
        .bind(favorite.added_at)
}

#[async_trait]
impl FavoriteRepository for SqlxFavoriteRepository {
    async fn add_favorite(&self, favorite: &FavoriteDbModel) -> Result<()> {
        bind_favorite(sqlx::query(UPSERT_FAVORITE), favorite)
            .execute(&self.write_pool)
            .await?;
        Ok(())
    }

    async fn remove_favorite(&self, video_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM favorites WHERE video_id = ?")
            .bind(video_id)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_favorite(&self, favorite: &FavoriteDbModel) -> Result<bool> {
        retry_on_sqlite_busy("toggle_favorite", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;

            let removed = sqlx::query("DELETE FROM favorites WHERE video_id = ?")
                .bind(&favorite.video_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if removed == 0 {
                bind_favorite(sqlx::query(UPSERT_FAVORITE), favorite)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(removed == 0)
        })
        .await
    }

    async fn is_favorite(&self, video_id: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE video_id = ?")
            .bind(video_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteDbModel>> {
        let favorites = sqlx::query_as::<_, FavoriteDbModel>(
            "SELECT * FROM favorites ORDER BY added_at DESC, video_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(favorites)
    }
}
