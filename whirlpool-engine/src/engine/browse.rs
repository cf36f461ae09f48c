//! Sources, status, filters and listings.

use serde_json::json;
use tracing::{debug, warn};

use super::Engine;
use crate::cache::CacheKind;
use crate::database::time::now_ms;
use crate::discovery::VideoQuery;
use crate::domain::{SourceServerConfig, StatusChannel, StatusSummary, VideoItem};
use crate::filters::{ChannelFilters, FilterSelections, normalize, selection_key, to_selections};
use crate::settings::{CATEGORIES_PREFIX, CHANNELS_PREFIX};
use crate::{Error, Result};

impl Engine {
    /// Probe and add a source; it becomes the active one.
    pub async fn add_source(&self, raw: &str) -> Result<SourceServerConfig> {
        let (source, status) = self.registry.add(raw).await?;
        self.remember_status(&source.base_url, &status).await;
        Ok(source)
    }

    pub async fn remove_source(&self, base_url: &str) -> Result<bool> {
        self.registry.remove(base_url).await
    }

    pub async fn list_sources(&self) -> Result<Vec<SourceServerConfig>> {
        self.registry.list().await
    }

    /// `false` when `base_url` is not configured; the active source is then
    /// left unchanged.
    pub async fn set_active_source(&self, base_url: &str) -> Result<bool> {
        self.registry.set_active(base_url).await
    }

    pub async fn active_source(&self) -> Result<Option<SourceServerConfig>> {
        self.registry.active().await
    }

    /// Status of the active source.
    pub async fn status(&self) -> Result<StatusSummary> {
        let base_url = self.registry.active_base_url().await?;
        self.status_for(&base_url).await
    }

    /// Status of `base_url`, served from cache while fresh.
    pub async fn status_for(&self, base_url: &str) -> Result<StatusSummary> {
        let params = json!({ "baseUrl": base_url });
        if let Some(status) = self.cache.get(CacheKind::Status, &params).await {
            return Ok(status);
        }
        self.refresh_status(base_url).await
    }

    /// Fetch the status of `base_url`, bypassing the cache.
    pub async fn refresh_status(&self, base_url: &str) -> Result<StatusSummary> {
        let status = self.catalog.status(base_url).await?;
        self.remember_status(base_url, &status).await;
        Ok(status)
    }

    /// Cache a fetched status and persist what is derived from it. Failures
    /// here never fail the request that fetched the status.
    async fn remember_status(&self, base_url: &str, status: &StatusSummary) {
        self.cache
            .put(CacheKind::Status, &json!({ "baseUrl": base_url }), status)
            .await;

        let derived = [
            (format!("{CATEGORIES_PREFIX}{base_url}"), &status.sources),
            (format!("{CHANNELS_PREFIX}{base_url}"), &status.channels),
        ];
        for (key, values) in derived {
            if let Err(e) = self.settings.set_string_list(&key, values).await {
                warn!(key, error = %e, "Failed to persist status-derived setting");
            }
        }
        if let Err(e) = self.registry.refresh_metadata(base_url, status).await {
            warn!(base_url, error = %e, "Failed to refresh source metadata");
        }
    }

    /// Channels declared by the active source.
    pub async fn channels(&self) -> Result<Vec<StatusChannel>> {
        Ok(self.status().await?.channel_details)
    }

    /// Declared filter options of a channel with the stored selection
    /// reconciled against them.
    pub async fn channel_filters(&self, channel_id: &str) -> Result<ChannelFilters> {
        let base_url = self.registry.active_base_url().await?;
        let status = self.status_for(&base_url).await?;
        self.filters_for(&base_url, &status, channel_id).await
    }

    async fn filters_for(
        &self,
        base_url: &str,
        status: &StatusSummary,
        channel_id: &str,
    ) -> Result<ChannelFilters> {
        let channel = status
            .channel(channel_id)
            .ok_or_else(|| Error::not_found("channel", channel_id))?;
        let stored: FilterSelections = self
            .settings
            .get_json(&selection_key(base_url, channel_id))
            .await?
            .unwrap_or_default();

        Ok(ChannelFilters {
            channel_id: channel.id.clone(),
            applied: normalize(&channel.options, &stored),
            options: channel.options.clone(),
        })
    }

    /// Normalize and store a selection for a channel of the active source.
    pub async fn save_filter_selection(
        &self,
        channel_id: &str,
        selections: &FilterSelections,
    ) -> Result<ChannelFilters> {
        let base_url = self.registry.active_base_url().await?;
        let status = self.status_for(&base_url).await?;
        let channel = status
            .channel(channel_id)
            .ok_or_else(|| Error::not_found("channel", channel_id))?;

        let applied = normalize(&channel.options, selections);
        self.settings
            .set_json(&selection_key(&base_url, channel_id), &to_selections(&applied))
            .await?;
        debug!(base_url, channel_id, "Filter selection saved");

        Ok(ChannelFilters {
            channel_id: channel.id.clone(),
            options: channel.options.clone(),
            applied,
        })
    }

    /// Forget the stored selection so defaults apply again.
    pub async fn clear_filter_selection(&self, channel_id: &str) -> Result<bool> {
        let base_url = self.registry.active_base_url().await?;
        self.settings
            .remove(&selection_key(&base_url, channel_id))
            .await
    }

    /// One page of a channel on the active source, filtered by the stored
    /// selection. `page` is 1-based; a short page means the end was reached.
    pub async fn discover_videos(
        &self,
        channel_id: &str,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<VideoItem>> {
        let base_url = self.registry.active_base_url().await?;
        let status = self.status_for(&base_url).await?;
        let applied = match self.filters_for(&base_url, &status, channel_id).await {
            Ok(filters) => filters.applied,
            // Undeclared channels are passed through without filters.
            Err(Error::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let request = VideoQuery::new(channel_id, page, per_page)
            .with_query(query)
            .with_filters(applied);
        self.fetch_videos(&base_url, &request).await
    }

    /// Like [`Engine::discover_videos`] but with a caller-held selection,
    /// which is normalized and not stored.
    pub async fn discover_videos_with(
        &self,
        channel_id: &str,
        query: &str,
        page: u32,
        per_page: u32,
        selections: &FilterSelections,
    ) -> Result<Vec<VideoItem>> {
        let base_url = self.registry.active_base_url().await?;
        let status = self.status_for(&base_url).await?;
        let applied = status
            .channel(channel_id)
            .map(|c| normalize(&c.options, selections))
            .unwrap_or_default();

        let request = VideoQuery::new(channel_id, page, per_page)
            .with_query(query)
            .with_filters(applied);
        self.fetch_videos(&base_url, &request).await
    }

    async fn fetch_videos(&self, base_url: &str, request: &VideoQuery) -> Result<Vec<VideoItem>> {
        request.validate()?;

        let params = json!({ "baseUrl": base_url, "body": request.body() });
        let videos = match self.cache.get(CacheKind::Listing, &params).await {
            Some(videos) => videos,
            None => {
                let videos = self.catalog.videos(base_url, request).await?;
                self.cache.put(CacheKind::Listing, &params, &videos).await;
                videos
            }
        };

        let query = request.query.trim();
        if !query.is_empty()
            && let Err(e) = self
                .history
                .record_search(query, now_ms(), self.config.max_search_history)
                .await
        {
            warn!(error = %e, "Failed to record search");
        }
        Ok(videos)
    }
}
