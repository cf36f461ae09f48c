//! Playback resolution: turning a page URL into a playable stream.
//!
//! The pipeline tries, in order:
//! 1. the impersonation bridge, for hosts routed through it;
//! 2. the stream extractor with the channel's declared arguments;
//! 3. the stream extractor without them, if step 2 failed.
//!
//! Every fallback taken is recorded in the resolution's diagnostics.

pub mod args;
pub mod download;
pub mod parse;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::bridge::ImpersonationBridge;
use crate::domain::PlaybackResolution;
use crate::{Error, Result};

pub use args::extractor_args;
pub use download::{DownloadRequest, Downloader};
pub use ytdlp::YtDlpExtractor;

/// Produces a playable stream for a page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    async fn extract(&self, page_url: &str, extra_args: &[String]) -> Result<PlaybackResolution>;
}

/// Downloads the media behind a page into a staging directory.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Returns the path of the finished file inside `staging_dir`. The file
    /// name starts with `stem`.
    async fn fetch_media(
        &self,
        page_url: &str,
        extra_args: &[String],
        staging_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf>;
}

pub struct ResolutionPipeline {
    extractor: Arc<dyn StreamExtractor>,
    bridge: Option<Arc<ImpersonationBridge>>,
    user_agent: String,
    permits: Semaphore,
}

impl ResolutionPipeline {
    pub fn new(
        extractor: Arc<dyn StreamExtractor>,
        bridge: Option<Arc<ImpersonationBridge>>,
        user_agent: impl Into<String>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            extractor,
            bridge,
            user_agent: user_agent.into(),
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Resolve `page_url`, applying the channel's declared extractor
    /// arguments when present.
    pub async fn resolve(
        &self,
        page_url: &str,
        declared_args: Option<&str>,
    ) -> Result<PlaybackResolution> {
        let page_url = page_url.trim();
        if page_url.is_empty() {
            return Err(Error::validation("page URL must not be empty"));
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| Error::Other("resolution pipeline is shut down".to_string()))?;

        let mut diagnostics = Vec::new();

        if let Some(bridge) = &self.bridge
            && bridge.handles(page_url)
        {
            match bridge.resolve_page(page_url, &self.user_agent).await {
                Ok(Some(resolution)) => return Ok(resolution),
                Ok(None) => diagnostics
                    .push("impersonation bridge found no stream; using extractor".to_string()),
                Err(e) => {
                    warn!(page_url, error = %e, "Impersonation bridge failed");
                    diagnostics.push(format!("impersonation bridge failed: {e}"));
                }
            }
        }

        let args = declared_args.map(extractor_args).unwrap_or_default();
        let result = match self.extractor.extract(page_url, &args).await {
            Err(e) if !args.is_empty() => {
                debug!(page_url, error = %e, "Retrying extraction without channel arguments");
                diagnostics.extend(e.diagnostics().iter().cloned());
                diagnostics.push(format!(
                    "extraction with channel arguments failed ({e}); retried without them"
                ));
                self.extractor.extract(page_url, &[]).await
            }
            other => other,
        };

        match result {
            Ok(mut resolution) => {
                diagnostics.append(&mut resolution.diagnostics);
                if resolution.stream_url.trim().is_empty() {
                    return Err(Error::resolution_with(
                        "extractor output is missing stream URL",
                        diagnostics,
                    ));
                }
                resolution.diagnostics = diagnostics;
                Ok(resolution)
            }
            Err(Error::Resolution {
                detail,
                diagnostics: mut extra,
            }) => {
                diagnostics.append(&mut extra);
                Err(Error::resolution_with(detail, diagnostics))
            }
            Err(e @ Error::Validation(_)) => Err(e),
            Err(e) => Err(Error::resolution_with(e.to_string(), diagnostics)),
        }
    }

    /// Stop admitting new resolutions. In-flight ones finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
