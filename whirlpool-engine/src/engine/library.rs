//! Favorites, settings, history, maintenance, transfer and updates.

use std::path::Path;

use crate::database::models::{AchievementDbModel, FavoriteDbModel};
use crate::database::time::now_ms;
use crate::domain::{
    Achievement, FavoriteItem, SearchHistoryEntry, VideoItem, WatchHistoryEntry,
    YtDlpUpdateInfo, resolve_favorites,
};
use crate::settings::SettingEntry;
use crate::{Error, Result};

use super::Engine;

impl Engine {
    pub async fn add_favorite(&self, channel_id: Option<&str>, video: &VideoItem) -> Result<()> {
        validate_favorite(video)?;
        self.favorites
            .add_favorite(&FavoriteDbModel::from_video(video, channel_id, now_ms()))
            .await
    }

    pub async fn remove_favorite(&self, video_id: &str) -> Result<bool> {
        self.favorites.remove_favorite(video_id).await
    }

    /// Returns whether the item is a favorite afterwards.
    pub async fn toggle_favorite(&self, channel_id: Option<&str>, video: &VideoItem) -> Result<bool> {
        validate_favorite(video)?;
        self.favorites
            .toggle_favorite(&FavoriteDbModel::from_video(video, channel_id, now_ms()))
            .await
    }

    pub async fn is_favorite(&self, video_id: &str) -> Result<bool> {
        self.favorites.is_favorite(video_id).await
    }

    /// Favorites, most recently added first.
    pub async fn list_favorites(&self) -> Result<Vec<FavoriteItem>> {
        let rows = self.favorites.list_favorites().await?;
        Ok(rows.into_iter().map(FavoriteItem::from).collect())
    }

    /// Favorites rendered from their stored fields alone.
    pub async fn favorite_videos(&self) -> Result<Vec<VideoItem>> {
        Ok(self
            .list_favorites()
            .await?
            .iter()
            .map(FavoriteItem::to_video_item)
            .collect())
    }

    /// The favorites among `candidates`, in favorites order.
    pub async fn resolve_favorites(&self, candidates: &[VideoItem]) -> Result<Vec<VideoItem>> {
        let favorites = self.list_favorites().await?;
        Ok(resolve_favorites(&favorites, candidates))
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.settings.get(key).await
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.settings.set(key, value).await
    }

    pub async fn remove_setting(&self, key: &str) -> Result<bool> {
        self.settings.remove(key).await
    }

    pub async fn list_settings(&self, prefix: &str) -> Result<Vec<SettingEntry>> {
        self.settings.list(prefix).await
    }

    pub async fn list_watch_history(&self, limit: u32) -> Result<Vec<WatchHistoryEntry>> {
        let rows = self.history.list_watch_history(limit).await?;
        Ok(rows.into_iter().map(WatchHistoryEntry::from).collect())
    }

    pub async fn list_search_history(&self, limit: u32) -> Result<Vec<SearchHistoryEntry>> {
        let rows = self.history.list_search_history(limit).await?;
        Ok(rows.into_iter().map(SearchHistoryEntry::from).collect())
    }

    /// Returns `false` if the achievement was already unlocked.
    pub async fn unlock_achievement(&self, id: &str, title: &str) -> Result<bool> {
        if id.trim().is_empty() {
            return Err(Error::validation("achievement id must not be empty"));
        }
        self.history
            .unlock_achievement(&AchievementDbModel {
                id: id.trim().to_string(),
                title: title.to_string(),
                unlocked_at: now_ms(),
            })
            .await
    }

    pub async fn list_achievements(&self) -> Result<Vec<Achievement>> {
        let rows = self.history.list_achievements().await?;
        Ok(rows.into_iter().map(Achievement::from).collect())
    }

    pub async fn clear_cache(&self) -> Result<u64> {
        self.maintenance.clear_cache().await
    }

    pub async fn clear_favorites(&self) -> Result<u64> {
        self.maintenance.clear_favorites().await
    }

    /// Clears watch and search history.
    pub async fn clear_watch_history(&self) -> Result<u64> {
        self.maintenance.clear_watch_history().await
    }

    pub async fn clear_achievements(&self) -> Result<u64> {
        self.maintenance.clear_achievements().await
    }

    /// Drop and recreate every table. Downloaded files stay on disk.
    pub async fn reset_all(&self) -> Result<()> {
        self.maintenance.reset_all().await
    }

    pub async fn export_database(&self, dest: &Path) -> Result<bool> {
        self.transfer.export(dest).await
    }

    pub async fn import_database(&self, src: &Path) -> Result<bool> {
        self.transfer.import(src).await
    }

    /// Compare the installed extractor with the latest release. Never fails;
    /// problems are reported as an unknown status.
    pub async fn check_for_update(&self) -> YtDlpUpdateInfo {
        self.updater.check().await
    }

    /// Run the extractor's self-update. The captured output is kept in
    /// settings either way.
    pub async fn run_update(&self) -> Result<bool> {
        self.updater.run_update().await
    }

    /// The result of the last update check, if one was recorded.
    pub async fn update_status(&self) -> Result<Option<YtDlpUpdateInfo>> {
        self.updater.stored_status().await
    }
}

fn validate_favorite(video: &VideoItem) -> Result<()> {
    if video.id.trim().is_empty() {
        return Err(Error::validation("favorite id must not be empty"));
    }
    Ok(())
}
