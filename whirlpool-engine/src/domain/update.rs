use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of comparing the installed extractor with the latest release.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    UpdateAvailable,
    /// Either version could not be determined.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YtDlpUpdateInfo {
    pub current_version: Option<String>,
    pub latest_version: Option<String>,
    pub status: UpdateStatus,
    /// Human-readable reason when the status is `Unknown`.
    pub detail: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl YtDlpUpdateInfo {
    pub fn update_available(&self) -> bool {
        self.status == UpdateStatus::UpdateAvailable
    }
}
