//! Server-declared catalog metadata.
//!
//! Channels and their filter options are declared at runtime by each source,
//! so they are plain data records. Nothing here is validated against a fixed
//! schema; the filter normalizer reconciles stored selections against
//! whatever the server currently declares.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSummary {
    pub name: String,
    pub api_version: Option<String>,
    pub icon_url: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    /// Coarse category labels.
    pub sources: Vec<String>,
    /// Channel ids, in declared order.
    pub channels: Vec<String>,
    pub channel_details: Vec<StatusChannel>,
    pub adblock_required: bool,
    pub source_releases_url: Option<String>,
}

impl StatusSummary {
    pub fn channel(&self, channel_id: &str) -> Option<&StatusChannel> {
        self.channel_details.iter().find(|c| c.id == channel_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChannel {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub favicon_url: Option<String>,
    /// Extra extractor arguments applied to every resolution in this channel.
    pub ytdlp_command: Option<String>,
    pub options: Vec<StatusFilterOption>,
}

impl StatusChannel {
    /// Channel known only by id (legacy status responses).
    pub fn bare(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            description: None,
            favicon_url: None,
            ytdlp_command: None,
            options: Vec::new(),
        }
    }

    pub fn extractor_args(&self) -> Option<&str> {
        self.ytdlp_command
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One filterable dimension of a channel (sort order, duration, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFilterOption {
    pub id: String,
    pub title: String,
    pub multi_select: bool,
    pub choices: Vec<StatusChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChoice {
    pub id: String,
    pub label: String,
}
