use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::DownloadDbModel;
use crate::database::time::ms_to_datetime;

/// A directly playable stream description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResolution {
    pub id: String,
    pub title: String,
    pub page_url: String,
    pub stream_url: String,
    /// Headers the player must send; blank keys or values are never kept.
    pub request_headers: BTreeMap<String, String>,
    pub thumbnail_url: Option<String>,
    pub author_name: Option<String>,
    pub extractor: Option<String>,
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub protocol: Option<String>,
    pub duration_seconds: Option<f64>,
    pub yt_dlp_version: Option<String>,
    pub diagnostics: Vec<String>,
}

impl PlaybackResolution {
    /// Whether this resolution points at a downloaded local file.
    pub fn is_local(&self) -> bool {
        self.protocol.as_deref() == Some("file")
    }
}

/// Retain only header pairs whose key and value are both non-blank.
pub fn clean_headers<I, K, V>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .into_iter()
        .filter_map(|(k, v)| {
            let (k, v) = (k.as_ref().trim(), v.as_ref().trim());
            (!k.is_empty() && !v.is_empty()).then(|| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Local file recorded for a `(channel, item)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub channel_id: String,
    pub video_id: String,
    pub file_path: PathBuf,
    pub title: String,
    pub page_url: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
}

impl From<DownloadDbModel> for DownloadRecord {
    fn from(model: DownloadDbModel) -> Self {
        Self {
            channel_id: model.channel_id,
            video_id: model.video_id,
            file_path: PathBuf::from(model.file_path),
            title: model.title,
            page_url: model.page_url,
            file_size: u64::try_from(model.file_size).unwrap_or_default(),
            created_at: ms_to_datetime(model.created_at),
        }
    }
}
