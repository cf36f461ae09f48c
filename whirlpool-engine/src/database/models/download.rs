//! Download index database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct DownloadDbModel {
    pub channel_id: String,
    pub video_id: String,
    pub file_path: String,
    pub title: String,
    pub page_url: String,
    pub file_size: i64,
    pub created_at: i64,
}
