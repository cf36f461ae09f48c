//! Source registry.
//!
//! Adding a source probes it with a status request before anything is
//! stored: a bare host is tried over HTTPS first, then HTTP.

use std::sync::Arc;

use tracing::{debug, info};

use crate::database::models::SourceServerDbModel;
use crate::database::repositories::SourceRepository;
use crate::database::time::now_ms;
use crate::discovery::CatalogClient;
use crate::domain::{SourceServerConfig, StatusSummary};
use crate::utils::url::{base_url_candidates, canonical_base_url, extract_host};
use crate::{Error, Result};

pub struct SourceRegistry {
    sources: Arc<dyn SourceRepository>,
    catalog: Arc<dyn CatalogClient>,
}

impl SourceRegistry {
    pub fn new(sources: Arc<dyn SourceRepository>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { sources, catalog }
    }

    /// Probe `raw` and store it as the new active source.
    ///
    /// Returns the stored source together with the status that answered
    /// the probe.
    pub async fn add(&self, raw: &str) -> Result<(SourceServerConfig, StatusSummary)> {
        let candidates = base_url_candidates(raw)?;
        for candidate in &candidates {
            if self.sources.get_source(candidate).await?.is_some() {
                return Err(Error::validation(format!(
                    "source {candidate} is already configured"
                )));
            }
        }

        let mut last_error = None;
        for candidate in candidates {
            match self.catalog.status(&candidate).await {
                Ok(status) => {
                    let model = SourceServerDbModel {
                        title: display_title(&status, &candidate),
                        icon_url: status.icon_url.clone(),
                        color: status.primary_color.clone(),
                        base_url: candidate,
                        is_active: 1,
                        created_at: now_ms(),
                    };
                    self.sources.insert_active_source(&model).await?;
                    info!(base_url = %model.base_url, title = %model.title, "Source added");
                    return Ok((model.into(), status));
                }
                Err(e) => {
                    debug!(base_url = %candidate, error = %e, "Source probe failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::validation("no usable source address")))
    }

    pub async fn remove(&self, base_url: &str) -> Result<bool> {
        let removed = self.sources.remove_source(&lookup_key(base_url)).await?;
        if removed {
            info!(base_url, "Source removed");
        }
        Ok(removed)
    }

    /// All sources, oldest first.
    pub async fn list(&self) -> Result<Vec<SourceServerConfig>> {
        Ok(self
            .sources
            .list_sources()
            .await?
            .into_iter()
            .map(SourceServerConfig::from)
            .collect())
    }

    /// Make `base_url` active. `false` when it is not configured.
    pub async fn set_active(&self, base_url: &str) -> Result<bool> {
        self.sources.set_active_source(&lookup_key(base_url)).await
    }

    pub async fn active(&self) -> Result<Option<SourceServerConfig>> {
        Ok(self
            .sources
            .get_active_source()
            .await?
            .map(SourceServerConfig::from))
    }

    /// Base URL of the active source, or an error when none is configured.
    pub async fn active_base_url(&self) -> Result<String> {
        self.active()
            .await?
            .map(|s| s.base_url)
            .ok_or_else(|| Error::not_found("active source", "none"))
    }

    /// Store display metadata from a freshly fetched status.
    pub async fn refresh_metadata(&self, base_url: &str, status: &StatusSummary) -> Result<()> {
        self.sources
            .update_source_metadata(
                base_url,
                &display_title(status, base_url),
                status.icon_url.as_deref(),
                status.primary_color.as_deref(),
            )
            .await
    }
}

fn lookup_key(base_url: &str) -> String {
    canonical_base_url(base_url).unwrap_or_else(|_| base_url.trim().to_string())
}

fn display_title(status: &StatusSummary, base_url: &str) -> String {
    let name = status.name.trim();
    if name.is_empty() || name == "unknown" {
        extract_host(base_url).unwrap_or_else(|| base_url.to_string())
    } else {
        name.to_string()
    }
}
