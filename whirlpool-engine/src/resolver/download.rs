//! Offline downloads.
//!
//! Media is fetched into a private `.partial-<uuid>` directory under the
//! download root and only moved into its channel's directory once complete,
//! so an interrupted download never leaves a half-written file where a
//! finished one is expected. The index row is written after the move.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::{MediaFetcher, extractor_args};
use crate::database::models::DownloadDbModel;
use crate::database::repositories::DownloadRepository;
use crate::database::time::now_ms;
use crate::domain::DownloadRecord;
use crate::utils::filename::{download_stem, sanitize_filename};
use crate::utils::fs::{
    ensure_dir_all_with_op, io_error, regular_file_size, remove_dir_quietly, remove_file_quietly,
};
use crate::{Error, Result};

const STAGING_PREFIX: &str = ".partial-";

/// What to download and where it belongs in the index.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub channel_id: String,
    pub video_id: String,
    pub page_url: String,
    pub title: String,
    /// The channel's declared extractor arguments.
    pub extractor_args: Option<String>,
}

impl DownloadRequest {
    fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() || self.video_id.trim().is_empty() {
            return Err(Error::validation("channel id and video id are required"));
        }
        if self.page_url.trim().is_empty() {
            return Err(Error::validation("page URL must not be empty"));
        }
        Ok(())
    }
}

/// Per-attempt staging directory, removed on drop so an abandoned download
/// does not leave fragments behind.
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    async fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        ensure_dir_all_with_op("creating staging directory", &path).await?;
        Ok(Self { path })
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove download staging directory"
            ),
        }
    }
}

pub struct Downloader {
    fetcher: Arc<dyn MediaFetcher>,
    downloads: Arc<dyn DownloadRepository>,
    download_dir: PathBuf,
}

impl Downloader {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        downloads: Arc<dyn DownloadRepository>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            downloads,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Remove staging directories left behind by a process that exited
    /// mid-download. Returns how many were removed.
    pub async fn sweep_staging(&self) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.download_dir).await else {
            return 0;
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                remove_dir_quietly(&entry.path()).await;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Removed leftover download staging directories");
        }
        removed
    }

    /// Download the item and record it, replacing any previous download of
    /// the same `(channel, item)` pair.
    pub async fn download(&self, request: &DownloadRequest) -> Result<DownloadRecord> {
        request.validate()?;
        ensure_dir_all_with_op("creating download directory", &self.download_dir).await?;

        let staging = StagingDir::create(&self.download_dir).await?;
        self.fetch_and_commit(request, &staging.path).await
    }

    async fn fetch_and_commit(
        &self,
        request: &DownloadRequest,
        staging: &Path,
    ) -> Result<DownloadRecord> {
        let args = request
            .extractor_args
            .as_deref()
            .map(extractor_args)
            .unwrap_or_default();
        let stem = download_stem(&request.title);

        let fetched = self
            .fetcher
            .fetch_media(request.page_url.trim(), &args, staging, &stem)
            .await?;
        let file_name = fetched
            .file_name()
            .ok_or_else(|| Error::Other(format!("invalid download path {}", fetched.display())))?;

        let previous = self
            .downloads
            .get_download(&request.channel_id, &request.video_id)
            .await?
            .map(|model| PathBuf::from(model.file_path));
        let dest = self
            .destination(&request.channel_id, file_name, previous.as_deref())
            .await?;

        if previous.as_deref() == Some(dest.as_path()) {
            remove_file_quietly(&dest).await;
        }
        tokio::fs::rename(&fetched, &dest)
            .await
            .map_err(|e| io_error("moving finished download", &dest, e))?;

        let file_size = regular_file_size(&dest).await.ok_or_else(|| {
            Error::Other(format!("download vanished after move: {}", dest.display()))
        })?;

        let model = DownloadDbModel {
            channel_id: request.channel_id.clone(),
            video_id: request.video_id.clone(),
            file_path: dest.to_string_lossy().into_owned(),
            title: request.title.clone(),
            page_url: request.page_url.trim().to_string(),
            file_size: i64::try_from(file_size).unwrap_or(i64::MAX),
            created_at: now_ms(),
        };

        let replaced = match self.downloads.upsert_download(&model).await {
            Ok(replaced) => replaced,
            Err(e) => {
                remove_file_quietly(&dest).await;
                return Err(e);
            }
        };
        if let Some(replaced) = replaced
            && Path::new(&replaced) != dest
        {
            remove_file_quietly(Path::new(&replaced)).await;
        }

        info!(
            channel_id = %model.channel_id,
            video_id = %model.video_id,
            path = %dest.display(),
            size = file_size,
            "Download complete"
        );
        Ok(model.into())
    }

    /// Final path for a fetched file inside the channel's directory.
    ///
    /// The record's own previous file may be overwritten; a name held by
    /// anything else gets a unique suffix.
    async fn destination(
        &self,
        channel_id: &str,
        file_name: &OsStr,
        previous: Option<&Path>,
    ) -> Result<PathBuf> {
        let channel_dir = self.download_dir.join(sanitize_filename(channel_id.trim()));
        ensure_dir_all_with_op("creating channel download directory", &channel_dir).await?;

        let dest = channel_dir.join(file_name);
        let taken = tokio::fs::try_exists(&dest).await.unwrap_or(true);
        if !taken || previous == Some(dest.as_path()) {
            return Ok(dest);
        }

        let name = Path::new(file_name);
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = Uuid::new_v4().simple().to_string();
        let unique = match name.extension() {
            Some(ext) => format!("{stem}-{}.{}", &suffix[..8], ext.to_string_lossy()),
            None => format!("{stem}-{}", &suffix[..8]),
        };
        Ok(channel_dir.join(unique))
    }

    /// The recorded download for `(channel_id, video_id)`.
    ///
    /// A record whose file has disappeared is removed and `None` returned.
    pub async fn lookup(&self, channel_id: &str, video_id: &str) -> Result<Option<DownloadRecord>> {
        let Some(model) = self.downloads.get_download(channel_id, video_id).await? else {
            return Ok(None);
        };
        if regular_file_size(Path::new(&model.file_path)).await.is_some() {
            return Ok(Some(model.into()));
        }

        warn!(
            channel_id,
            video_id,
            path = %model.file_path,
            "Downloaded file is missing, dropping stale record"
        );
        self.downloads.remove_download(channel_id, video_id).await?;
        Ok(None)
    }

    pub async fn list(&self) -> Result<Vec<DownloadRecord>> {
        Ok(self
            .downloads
            .list_downloads()
            .await?
            .into_iter()
            .map(DownloadRecord::from)
            .collect())
    }

    /// Remove the record and its file. Returns `false` if nothing was recorded.
    pub async fn remove(&self, channel_id: &str, video_id: &str) -> Result<bool> {
        match self.downloads.remove_download(channel_id, video_id).await? {
            Some(model) => {
                remove_file_quietly(Path::new(&model.file_path)).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
