use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::FavoriteDbModel;
use crate::database::time::ms_to_datetime;

/// One item returned by a listing request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub id: String,
    pub title: String,
    pub page_url: String,
    pub duration_seconds: Option<u32>,
    pub thumbnail_url: Option<String>,
    pub network: Option<String>,
    pub author_name: Option<String>,
    pub extractor: Option<String>,
    pub view_count: Option<u64>,
    /// The server's original record, kept for fields the engine does not model.
    pub raw: Option<serde_json::Value>,
}

/// A favorited item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteItem {
    pub video_id: String,
    pub channel_id: Option<String>,
    pub title: String,
    pub page_url: String,
    pub image_url: Option<String>,
    pub network: Option<String>,
    pub author_name: Option<String>,
    pub duration_seconds: Option<u32>,
    pub added_at: DateTime<Utc>,
}

impl FavoriteItem {
    /// Render the stored fields as a `VideoItem` without contacting the source.
    pub fn to_video_item(&self) -> VideoItem {
        VideoItem {
            id: self.video_id.clone(),
            title: self.title.clone(),
            page_url: self.page_url.clone(),
            duration_seconds: self.duration_seconds,
            thumbnail_url: self.image_url.clone(),
            network: self.network.clone(),
            author_name: self.author_name.clone(),
            extractor: None,
            view_count: None,
            raw: None,
        }
    }
}

impl From<FavoriteDbModel> for FavoriteItem {
    fn from(model: FavoriteDbModel) -> Self {
        Self {
            video_id: model.video_id,
            channel_id: model.channel_id,
            title: model.title,
            page_url: model.page_url,
            image_url: model.image_url,
            network: model.network,
            author_name: model.author_name,
            duration_seconds: model.duration_seconds.and_then(|d| u32::try_from(d).ok()),
            added_at: ms_to_datetime(model.added_at),
        }
    }
}

impl FavoriteDbModel {
    pub fn from_video(video: &VideoItem, channel_id: Option<&str>, added_at: i64) -> Self {
        Self {
            video_id: video.id.clone(),
            channel_id: channel_id.map(str::to_string),
            title: video.title.clone(),
            page_url: video.page_url.clone(),
            image_url: video.thumbnail_url.clone(),
            network: video.network.clone(),
            author_name: video.author_name.clone(),
            duration_seconds: video.duration_seconds.map(i64::from),
            added_at,
        }
    }
}

/// Join favorites against freshly discovered candidates.
///
/// Returns the candidates whose id is a favorite, in favorites order (most
/// recently added first). Favorites absent from `candidates` are skipped.
pub fn resolve_favorites(favorites: &[FavoriteItem], candidates: &[VideoItem]) -> Vec<VideoItem> {
    favorites
        .iter()
        .filter_map(|fav| candidates.iter().find(|v| v.id == fav.video_id))
        .cloned()
        .collect()
}
