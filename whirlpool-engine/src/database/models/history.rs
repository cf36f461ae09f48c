//! Watch history, search history and achievement models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct WatchHistoryDbModel {
    pub channel_id: String,
    pub video_id: String,
    pub title: String,
    pub page_url: String,
    pub thumbnail_url: Option<String>,
    pub watched_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SearchHistoryDbModel {
    pub query: String,
    pub searched_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AchievementDbModel {
    pub id: String,
    pub title: String,
    pub unlocked_at: i64,
}
