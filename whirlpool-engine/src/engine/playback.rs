//! Resolution, offline downloads and watch history.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use super::Engine;
use crate::cache::CacheKind;
use crate::database::models::WatchHistoryDbModel;
use crate::database::time::now_ms;
use crate::domain::{DownloadRecord, PlaybackResolution, VideoItem};
use crate::resolver::DownloadRequest;
use crate::{Error, Result};

/// An item to play or download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRequest {
    pub channel_id: Option<String>,
    pub video_id: Option<String>,
    pub page_url: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl PlaybackRequest {
    /// A bare page URL with no catalog context.
    pub fn for_url(page_url: impl Into<String>) -> Self {
        Self {
            channel_id: None,
            video_id: None,
            page_url: page_url.into(),
            title: None,
            thumbnail_url: None,
        }
    }

    pub fn for_video(channel_id: impl Into<String>, video: &VideoItem) -> Self {
        Self {
            channel_id: Some(channel_id.into()),
            video_id: Some(video.id.clone()),
            page_url: video.page_url.clone(),
            title: Some(video.title.clone()),
            thumbnail_url: video.thumbnail_url.clone(),
        }
    }

    fn catalog_key(&self) -> Option<(&str, &str)> {
        let channel = self.channel_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let video = self.video_id.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((channel, video))
    }
}

impl Engine {
    /// Resolve an item to a playable stream.
    ///
    /// A downloaded copy wins over the network. Otherwise the resolution
    /// cache is consulted before the pipeline runs. Successful resolutions
    /// of catalog items are added to the watch history.
    pub async fn resolve(&self, request: &PlaybackRequest) -> Result<PlaybackResolution> {
        let page_url = request.page_url.trim();
        if page_url.is_empty() {
            return Err(Error::validation("page URL must not be empty"));
        }

        let resolution = match self.local_resolution(request).await {
            Some(local) => local,
            None => {
                let declared = self.declared_args(request).await;
                let params = json!({ "pageUrl": page_url, "args": declared });
                match self.cache.get(CacheKind::Resolution, &params).await {
                    Some(cached) => cached,
                    None => {
                        let resolved = self.pipeline.resolve(page_url, declared.as_deref()).await?;
                        self.cache
                            .put(CacheKind::Resolution, &params, &resolved)
                            .await;
                        resolved
                    }
                }
            }
        };

        self.record_watch(request, &resolution).await;
        Ok(resolution)
    }

    async fn local_resolution(&self, request: &PlaybackRequest) -> Option<PlaybackResolution> {
        let (channel_id, video_id) = request.catalog_key()?;
        let record = match self.downloader.lookup(channel_id, video_id).await {
            Ok(record) => record?,
            Err(e) => {
                warn!(channel_id, video_id, error = %e, "Download lookup failed");
                return None;
            }
        };
        let absolute = std::path::absolute(&record.file_path).ok()?;
        let stream_url = Url::from_file_path(&absolute).ok()?;
        debug!(path = %record.file_path.display(), "Playing downloaded copy");

        Some(PlaybackResolution {
            id: record.video_id.clone(),
            title: record.title.clone(),
            page_url: record.page_url.clone(),
            stream_url: stream_url.to_string(),
            request_headers: BTreeMap::new(),
            thumbnail_url: request.thumbnail_url.clone(),
            author_name: None,
            extractor: Some("local".to_string()),
            format_id: None,
            ext: record
                .file_path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase()),
            protocol: Some("file".to_string()),
            duration_seconds: None,
            yt_dlp_version: None,
            diagnostics: vec!["playing downloaded file".to_string()],
        })
    }

    /// Extractor arguments declared by the item's channel on the active
    /// source, if any.
    async fn declared_args(&self, request: &PlaybackRequest) -> Option<String> {
        let channel_id = request.channel_id.as_deref()?;
        let base_url = self.registry.active_base_url().await.ok()?;
        match self.status_for(&base_url).await {
            Ok(status) => status
                .channel(channel_id)
                .and_then(|c| c.extractor_args())
                .map(str::to_string),
            Err(e) => {
                warn!(channel_id, error = %e, "Status unavailable; resolving without channel arguments");
                None
            }
        }
    }

    async fn record_watch(&self, request: &PlaybackRequest, resolution: &PlaybackResolution) {
        let Some((channel_id, video_id)) = request.catalog_key() else {
            return;
        };
        let entry = WatchHistoryDbModel {
            channel_id: channel_id.to_string(),
            video_id: video_id.to_string(),
            title: request
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| resolution.title.clone()),
            page_url: request.page_url.trim().to_string(),
            thumbnail_url: request
                .thumbnail_url
                .clone()
                .or_else(|| resolution.thumbnail_url.clone()),
            watched_at: now_ms(),
        };
        if let Err(e) = self
            .history
            .record_watch(&entry, self.config.max_watch_history)
            .await
        {
            warn!(channel_id, video_id, error = %e, "Failed to record watch");
        }
    }

    /// Download an item for offline playback. The request must name both
    /// the channel and the item.
    pub async fn download(&self, request: &PlaybackRequest) -> Result<DownloadRecord> {
        let (channel_id, video_id) = request
            .catalog_key()
            .ok_or_else(|| Error::validation("channel id and video id are required"))?;
        let extractor_args = self.declared_args(request).await;

        self.downloader
            .download(&DownloadRequest {
                channel_id: channel_id.to_string(),
                video_id: video_id.to_string(),
                page_url: request.page_url.trim().to_string(),
                title: request.title.clone().unwrap_or_default(),
                extractor_args,
            })
            .await
    }

    pub async fn list_downloads(&self) -> Result<Vec<DownloadRecord>> {
        self.downloader.list().await
    }

    /// Delete a download and its file.
    pub async fn remove_download(&self, channel_id: &str, video_id: &str) -> Result<bool> {
        self.downloader.remove(channel_id, video_id).await
    }

    /// Path of the downloaded file, if the item is downloaded.
    pub async fn download_path(&self, channel_id: &str, video_id: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .downloader
            .lookup(channel_id, video_id)
            .await?
            .map(|record| record.file_path))
    }
}
