use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{AchievementDbModel, SearchHistoryDbModel, WatchHistoryDbModel};
use crate::database::time::ms_to_datetime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchHistoryEntry {
    pub channel_id: String,
    pub video_id: String,
    pub title: String,
    pub page_url: String,
    pub thumbnail_url: Option<String>,
    pub watched_at: DateTime<Utc>,
}

impl From<WatchHistoryDbModel> for WatchHistoryEntry {
    fn from(model: WatchHistoryDbModel) -> Self {
        Self {
            channel_id: model.channel_id,
            video_id: model.video_id,
            title: model.title,
            page_url: model.page_url,
            thumbnail_url: model.thumbnail_url,
            watched_at: ms_to_datetime(model.watched_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub query: String,
    pub searched_at: DateTime<Utc>,
}

impl From<SearchHistoryDbModel> for SearchHistoryEntry {
    fn from(model: SearchHistoryDbModel) -> Self {
        Self {
            query: model.query,
            searched_at: ms_to_datetime(model.searched_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub unlocked_at: DateTime<Utc>,
}

impl From<AchievementDbModel> for Achievement {
    fn from(model: AchievementDbModel) -> Self {
        Self {
            id: model.id,
            title: model.title,
            unlocked_at: ms_to_datetime(model.unlocked_at),
        }
    }
}
