//! Extractor update checker.
//!
//! Compares the installed yt-dlp version with the latest release tag and
//! records the outcome in settings so it survives restarts. Checking never
//! fails: any problem is reported as [`UpdateStatus::Unknown`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::database::repositories::SettingRepository;
use crate::database::time::ms_to_datetime;
use crate::domain::{UpdateStatus, YtDlpUpdateInfo};
use crate::{Error, Result};

pub const DEFAULT_RELEASES_API: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";

pub const KEY_CURRENT: &str = "yt_dlp_current";
pub const KEY_LATEST: &str = "yt_dlp_latest";
pub const KEY_UPDATE_AVAILABLE: &str = "yt_dlp_update_available";
pub const KEY_CHECKED_AT: &str = "yt_dlp_checked_at";
pub const KEY_LAST_UPDATE_OUTPUT: &str = "yt_dlp_last_update_output";
pub const KEY_BOOT_ERROR: &str = "boot_error";

/// Result of running the extractor's self-update command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfUpdateRun {
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Version query and self-update of the installed extractor.
#[async_trait]
pub trait ExtractorMaintenance: Send + Sync {
    async fn installed_version(&self) -> Result<String>;
    async fn self_update(&self) -> Result<SelfUpdateRun>;
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: Option<String>,
}

/// Strip surrounding whitespace, case and a leading `v` from a release tag.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_ascii_lowercase()
        .trim_start_matches('v')
        .to_string()
}

fn numeric_segments(version: &str) -> Option<Vec<u64>> {
    version
        .split(['.', '-'])
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compare an installed version with the latest tag.
///
/// Date-style versions (`2025.06.09`) are compared numerically so a nightly
/// build newer than the latest stable tag counts as up to date. Anything
/// else falls back to plain inequality.
pub fn compare_versions(current: &str, latest: &str) -> UpdateStatus {
    let (current, latest) = (normalize_tag(current), normalize_tag(latest));
    if current.is_empty() || latest.is_empty() {
        return UpdateStatus::Unknown;
    }
    if current == latest {
        return UpdateStatus::UpToDate;
    }
    match (numeric_segments(&current), numeric_segments(&latest)) {
        (Some(c), Some(l)) if c >= l => UpdateStatus::UpToDate,
        _ => UpdateStatus::UpdateAvailable,
    }
}

pub struct UpdateChecker {
    http: reqwest::Client,
    release_api: String,
    tool: Arc<dyn ExtractorMaintenance>,
    settings: Arc<dyn SettingRepository>,
}

impl UpdateChecker {
    pub fn new(
        http: reqwest::Client,
        release_api: impl Into<String>,
        tool: Arc<dyn ExtractorMaintenance>,
        settings: Arc<dyn SettingRepository>,
    ) -> Self {
        Self {
            http,
            release_api: release_api.into(),
            tool,
            settings,
        }
    }

    pub async fn installed_version(&self) -> Result<String> {
        self.tool.installed_version().await
    }

    /// Latest published release tag.
    pub async fn latest_release_tag(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.release_api)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::UpdateCheck(format!("release request failed: {e}")))?;
        let body = response
            .text()
            .await
            .map_err(|e| Error::UpdateCheck(format!("failed to read release body: {e}")))?;
        let release: LatestRelease = serde_json::from_str(&body)
            .map_err(|e| Error::UpdateCheck(format!("malformed release response: {e}")))?;
        release
            .tag_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::UpdateCheck("release response has no tag_name".to_string()))
    }

    /// Check for an update and persist the outcome.
    pub async fn check(&self) -> YtDlpUpdateInfo {
        let (current, latest) = tokio::join!(self.tool.installed_version(), self.latest_release_tag());

        let mut problems = Vec::new();
        let current = current
            .map_err(|e| problems.push(format!("installed version unknown: {e}")))
            .ok();
        let latest = latest.map_err(|e| problems.push(e.to_string())).ok();

        let status = match (&current, &latest) {
            (Some(c), Some(l)) => compare_versions(c, l),
            _ => UpdateStatus::Unknown,
        };
        let info = YtDlpUpdateInfo {
            current_version: current,
            latest_version: latest,
            status,
            detail: (!problems.is_empty()).then(|| problems.join("; ")),
            checked_at: Utc::now(),
        };

        match &info.detail {
            Some(detail) => warn!(%status, detail, "yt-dlp update check incomplete"),
            None => info!(
                %status,
                current = ?info.current_version,
                latest = ?info.latest_version,
                "yt-dlp update check finished"
            ),
        }
        if let Err(e) = self.persist(&info).await {
            warn!(error = %e, "Failed to persist update check result");
        }
        info
    }

    async fn persist(&self, info: &YtDlpUpdateInfo) -> Result<()> {
        if let Some(current) = &info.current_version {
            self.settings.set_setting(KEY_CURRENT, current).await?;
        }
        if let Some(latest) = &info.latest_version {
            self.settings.set_setting(KEY_LATEST, latest).await?;
        }
        // An inconclusive check must not leave an older verdict behind.
        if info.status == UpdateStatus::Unknown {
            self.settings.remove_setting(KEY_UPDATE_AVAILABLE).await?;
        } else {
            let available = if info.update_available() { "1" } else { "0" };
            self.settings
                .set_setting(KEY_UPDATE_AVAILABLE, available)
                .await?;
        }
        self.settings
            .set_setting(
                KEY_CHECKED_AT,
                &info.checked_at.timestamp_millis().to_string(),
            )
            .await
    }

    /// Run the extractor's self-update. Returns whether it reported success;
    /// its output is persisted either way.
    pub async fn run_update(&self) -> Result<bool> {
        let run = match self.tool.self_update().await {
            Ok(run) => run,
            Err(e) => {
                if let Err(persist_err) = self
                    .settings
                    .set_setting(KEY_LAST_UPDATE_OUTPUT, &format!("error: {e}"))
                    .await
                {
                    warn!(error = %persist_err, "Failed to persist self-update output");
                }
                return Err(e);
            }
        };

        self.settings
            .set_setting(KEY_LAST_UPDATE_OUTPUT, &run.output)
            .await?;
        if run.success {
            info!("yt-dlp self-update succeeded");
            if let Ok(version) = self.tool.installed_version().await {
                self.settings.set_setting(KEY_CURRENT, &version).await?;
                if let Some(latest) = self.settings.get_setting(KEY_LATEST).await? {
                    let available = compare_versions(&version, &latest) == UpdateStatus::UpdateAvailable;
                    self.settings
                        .set_setting(KEY_UPDATE_AVAILABLE, if available { "1" } else { "0" })
                        .await?;
                }
            }
        } else {
            warn!(output = %run.output, "yt-dlp self-update failed");
        }
        Ok(run.success)
    }

    /// The last persisted check result, if a check ever completed.
    pub async fn stored_status(&self) -> Result<Option<YtDlpUpdateInfo>> {
        let Some(checked_at) = self.settings.get_setting(KEY_CHECKED_AT).await? else {
            return Ok(None);
        };
        let current = self.settings.get_setting(KEY_CURRENT).await?;
        let latest = self.settings.get_setting(KEY_LATEST).await?;
        let status = match self
            .settings
            .get_setting(KEY_UPDATE_AVAILABLE)
            .await?
            .as_deref()
        {
            Some("1") => UpdateStatus::UpdateAvailable,
            Some("0") => UpdateStatus::UpToDate,
            _ => UpdateStatus::Unknown,
        };
        Ok(Some(YtDlpUpdateInfo {
            current_version: current,
            latest_version: latest,
            status,
            detail: None,
            checked_at: ms_to_datetime(checked_at.parse().unwrap_or_default()),
        }))
    }

    pub async fn record_boot_error(&self, message: &str) {
        if let Err(e) = self.settings.set_setting(KEY_BOOT_ERROR, message).await {
            warn!(error = %e, "Failed to persist boot error");
        }
    }

    pub async fn last_boot_error(&self) -> Result<Option<String>> {
        self.settings.get_setting(KEY_BOOT_ERROR).await
    }

    pub async fn clear_boot_error(&self) -> Result<()> {
        self.settings.remove_setting(KEY_BOOT_ERROR).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::database::repositories::SqlxSettingRepository;
    use parking_lot::Mutex;
    use rstest::rstest;

    #[rstest]
    #[case("v2025.01.01", "2025.01.01")]
    #[case("V2025.01.02", "2025.01.02")]
    #[case(" 2025.01.03 ", "2025.01.03")]
    fn test_normalize_tag(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_tag(raw), expected);
    }

    #[rstest]
    #[case("2025.06.09", "2025.06.09", UpdateStatus::UpToDate)]
    #[case("2025.05.22", "v2025.06.09", UpdateStatus::UpdateAvailable)]
    #[case("2025.06.10.123456", "2025.06.09", UpdateStatus::UpToDate)]
    #[case("2025.06.09-dev", "2025.06.09", UpdateStatus::UpdateAvailable)]
    #[case("", "2025.06.09", UpdateStatus::Unknown)]
    fn test_compare_versions(
        #[case] current: &str,
        #[case] latest: &str,
        #[case] expected: UpdateStatus,
    ) {
        assert_eq!(compare_versions(current, latest), expected);
    }

    struct FakeTool {
        version: Mutex<Option<String>>,
        update: Option<SelfUpdateRun>,
    }

    #[async_trait]
    impl ExtractorMaintenance for FakeTool {
        async fn installed_version(&self) -> Result<String> {
            self.version
                .lock()
                .clone()
                .ok_or_else(|| Error::Other("not installed".into()))
        }

        async fn self_update(&self) -> Result<SelfUpdateRun> {
            let run = self
                .update
                .clone()
                .ok_or_else(|| Error::Other("cannot start".into()))?;
            if run.success {
                *self.version.lock() = Some("2025.06.09".into());
            }
            Ok(run)
        }
    }

    async fn release_server(body: &'static str) -> String {
        let app = axum::Router::new().route(
            "/latest",
            axum::routing::get(move || async move { body }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/latest")
    }

    async fn checker(
        dir: &std::path::Path,
        release_api: String,
        tool: FakeTool,
    ) -> (Database, UpdateChecker) {
        let db = Database::open(dir.join("db.sqlite")).await.unwrap();
        let settings = SqlxSettingRepository::new(db.pool().clone(), db.write_pool().clone());
        crate::utils::http_client::install_rustls_provider();
        let checker = UpdateChecker::new(
            reqwest::Client::new(),
            release_api,
            Arc::new(tool),
            Arc::new(settings),
        );
        (db, checker)
    }

    #[tokio::test]
    async fn test_check_detects_update_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let api = release_server(r#"{"tag_name": "2025.06.09"}"#).await;
        let tool = FakeTool {
            version: Mutex::new(Some("2025.05.22".into())),
            update: Some(SelfUpdateRun {
                success: true,
                output: "Updated yt-dlp to 2025.06.09".into(),
            }),
        };
        let (_db, checker) = checker(dir.path(), api, tool).await;

        let info = checker.check().await;
        assert!(info.update_available());
        assert!(info.detail.is_none());

        let stored = checker.stored_status().await.unwrap().unwrap();
        assert_eq!(stored.status, UpdateStatus::UpdateAvailable);
        assert_eq!(stored.latest_version.as_deref(), Some("2025.06.09"));

        assert!(checker.run_update().await.unwrap());
        let stored = checker.stored_status().await.unwrap().unwrap();
        assert_eq!(stored.status, UpdateStatus::UpToDate);
        assert_eq!(stored.current_version.as_deref(), Some("2025.06.09"));
    }

    #[tokio::test]
    async fn test_check_never_fails() {
        let dir = tempfile::tempdir().unwrap();
        let api = release_server("<html>rate limited</html>").await;
        let tool = FakeTool {
            version: Mutex::new(None),
            update: None,
        };
        let (_db, checker) = checker(dir.path(), api, tool).await;

        let info = checker.check().await;
        assert_eq!(info.status, UpdateStatus::Unknown);
        let detail = info.detail.unwrap();
        assert!(detail.contains("installed version unknown"));
        assert!(detail.contains("malformed release response"));

        assert!(checker.run_update().await.is_err());
    }

    #[tokio::test]
    async fn test_inconclusive_check_clears_previous_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let api = release_server(r#"{"tag_name": "2025.06.09"}"#).await;
        let tool = FakeTool {
            version: Mutex::new(Some("2025.05.22".into())),
            update: None,
        };
        let tool = Arc::new(tool);
        let db = Database::open(dir.path().join("db.sqlite")).await.unwrap();
        let settings = SqlxSettingRepository::new(db.pool().clone(), db.write_pool().clone());
        crate::utils::http_client::install_rustls_provider();
        let checker = UpdateChecker::new(
            reqwest::Client::new(),
            api,
            tool.clone(),
            Arc::new(settings),
        );

        assert!(checker.check().await.update_available());
        let stored = checker.stored_status().await.unwrap().unwrap();
        assert_eq!(stored.status, UpdateStatus::UpdateAvailable);

        *tool.version.lock() = None;
        assert_eq!(checker.check().await.status, UpdateStatus::Unknown);
        let stored = checker.stored_status().await.unwrap().unwrap();
        assert_eq!(stored.status, UpdateStatus::Unknown);
    }

    #[tokio::test]
    async fn test_update_start_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            version: Mutex::new(None),
            update: None,
        };
        let (db, checker) = checker(dir.path(), "http://127.0.0.1:9/".into(), tool).await;

        assert!(checker.run_update().await.is_err());
        let settings = SqlxSettingRepository::new(db.pool().clone(), db.write_pool().clone());
        let output = settings.get_setting(KEY_LAST_UPDATE_OUTPUT).await.unwrap().unwrap();
        assert!(output.starts_with("error:"));
    }

    #[tokio::test]
    async fn test_failed_update_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FakeTool {
            version: Mutex::new(Some("2025.05.22".into())),
            update: Some(SelfUpdateRun {
                success: false,
                output: "ERROR: permission denied".into(),
            }),
        };
        let (db, checker) = checker(dir.path(), "http://127.0.0.1:9/".into(), tool).await;

        assert!(!checker.run_update().await.unwrap());
        let settings = SqlxSettingRepository::new(db.pool().clone(), db.write_pool().clone());
        assert_eq!(
            settings.get_setting(KEY_LAST_UPDATE_OUTPUT).await.unwrap().as_deref(),
            Some("ERROR: permission denied")
        );
    }
}
