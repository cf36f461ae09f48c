//! Favorite database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A favorited item with enough denormalized fields to render it offline.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FavoriteDbModel {
    pub video_id: String,
    pub channel_id: Option<String>,
    pub title: String,
    pub page_url: String,
    pub image_url: Option<String>,
    pub network: Option<String>,
    pub author_name: Option<String>,
    pub duration_seconds: Option<i64>,
    pub added_at: i64,
}
