//! Anti-bot bridge.
//!
//! Some sites reject plain HTTP clients. The bridge is an external script
//! (run by the configured Python interpreter) that performs a request with
//! browser impersonation and prints the response body:
//!
//! ```text
//! <python> <script> <METHOD> <url> <payload_json>
//! ```
//!
//! Discovery uses it to retry requests rejected with 403/429/503. Resolution
//! uses it to fetch a page and scan the HTML for a playable stream before the
//! extractor is tried.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::domain::{PlaybackResolution, clean_headers};
use crate::utils::url::{extract_host, host_matches};
use crate::{Error, Result};

static OG_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+(?:property|name)=["']og:video(?::url|:secure_url)?["'][^>]*content=["']([^"']+)["']"#,
    )
    .expect("valid og:video regex")
});
static OG_VIDEO_REVERSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+content=["']([^"']+)["'][^>]*(?:property|name)=["']og:video(?::url|:secure_url)?["']"#,
    )
    .expect("valid reversed og:video regex")
});
static HLS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\]+?\.m3u8(?:\?[^\s"'<>\\]*)?"#).expect("valid m3u8 regex")
});
static MP4_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>\\]+?\.mp4(?:\?[^\s"'<>\\]*)?"#).expect("valid mp4 regex")
});
static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<title[^>]*>(.*?)</title>"#).expect("valid title regex")
});

/// Whether a discovery response status warrants a retry through the bridge.
pub fn should_use_bridge(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
    )
}

/// A stream URL found in a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedStream {
    pub url: String,
    pub ext: &'static str,
    pub protocol: &'static str,
    pub title: Option<String>,
}

pub struct ImpersonationBridge {
    python_executable: String,
    script_path: PathBuf,
    hosts: Vec<String>,
    timeout: Duration,
}

impl ImpersonationBridge {
    pub fn new(
        python_executable: impl Into<String>,
        script_path: impl Into<PathBuf>,
        hosts: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            python_executable: python_executable.into(),
            script_path: script_path.into(),
            hosts,
            timeout,
        }
    }

    /// Whether pages on this URL's host should be fetched through the bridge
    /// during resolution.
    pub fn handles(&self, page_url: &str) -> bool {
        let Some(host) = extract_host(page_url) else {
            return false;
        };
        self.hosts.iter().any(|pattern| host_matches(&host, pattern))
    }

    /// Perform one request through the bridge and return the response body.
    pub async fn fetch(&self, method: &str, url: &str, payload: &Value) -> Result<String> {
        let mut cmd = process_utils::tokio_command(&self.python_executable);
        cmd.arg(&self.script_path)
            .arg(method.to_ascii_uppercase())
            .arg(url)
            .arg(payload.to_string());

        debug!(method, url, "Fetching through impersonation bridge");
        let output = process_utils::output_with_timeout(&mut cmd, self.timeout).await?;
        if !output.success() {
            let tail = output.stderr_tail(3).join(" | ");
            return Err(Error::Other(format!(
                "bridge exited with {}: {tail}",
                output.status
            )));
        }
        Ok(output.stdout)
    }

    /// Fetch `page_url` and look for a playable stream in the HTML.
    ///
    /// `Ok(None)` means the page was fetched but contained nothing usable.
    pub async fn resolve_page(
        &self,
        page_url: &str,
        user_agent: &str,
    ) -> Result<Option<PlaybackResolution>> {
        let html = self
            .fetch("GET", page_url, &Value::Object(Default::default()))
            .await?;
        let Some(found) = scan_for_stream(&html) else {
            return Ok(None);
        };

        Ok(Some(PlaybackResolution {
            id: page_url.to_string(),
            title: found.title.unwrap_or_else(|| page_url.to_string()),
            page_url: page_url.to_string(),
            stream_url: found.url,
            request_headers: clean_headers([("User-Agent", user_agent), ("Referer", page_url)]),
            thumbnail_url: None,
            author_name: None,
            extractor: Some("impersonation-bridge".to_string()),
            format_id: None,
            ext: Some(found.ext.to_string()),
            protocol: Some(found.protocol.to_string()),
            duration_seconds: None,
            yt_dlp_version: None,
            diagnostics: vec!["stream found by impersonation bridge".to_string()],
        }))
    }
}

/// Find the most promising stream URL in a page: an `og:video` declaration,
/// then any HLS playlist, then any MP4 file.
pub fn scan_for_stream(html: &str) -> Option<ScannedStream> {
    let text = html.replace("\\/", "/").replace("&amp;", "&");

    let classify = |url: &str| {
        if url.to_ascii_lowercase().contains(".m3u8") {
            ("m3u8", "m3u8_native")
        } else {
            ("mp4", "https")
        }
    };

    let og = OG_VIDEO
        .captures(&text)
        .or_else(|| OG_VIDEO_REVERSED.captures(&text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"));

    let url = og
        .or_else(|| HLS_URL.find(&text).map(|m| m.as_str().to_string()))
        .or_else(|| MP4_URL.find(&text).map(|m| m.as_str().to_string()))?;

    let (ext, protocol) = classify(&url);
    let title = TITLE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    Some(ScannedStream {
        url,
        ext,
        protocol,
        title,
    })
}
