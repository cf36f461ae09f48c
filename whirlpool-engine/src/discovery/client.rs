//! HTTP client for the discovery protocol.
//!
//! - `POST {base}/api/status` returns source metadata and channel declarations.
//! - `POST {base}/api/videos` returns a page of items; servers that do not
//!   support it are retried once at `POST {base}/api/video`.
//!
//! Requests rejected with 403/429/503 are replayed through the impersonation
//! bridge when one is configured. No other retries happen here.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::wire::{ListingBody, StatusResponse, parse_listing};
use crate::bridge::{ImpersonationBridge, should_use_bridge};
use crate::domain::{StatusSummary, VideoItem};
use crate::filters::{AppliedFilter, request_fields};
use crate::utils::url::endpoint;
use crate::{Error, Result};

const STATUS_PATH: &str = "api/status";
const VIDEOS_PATH: &str = "api/videos";
const VIDEO_FALLBACK_PATH: &str = "api/video";

/// Parameters of one listing request. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoQuery {
    pub channel_id: String,
    pub query: String,
    pub page: u32,
    pub per_page: u32,
    pub filters: Vec<AppliedFilter>,
}

impl VideoQuery {
    pub fn new(channel_id: impl Into<String>, page: u32, per_page: u32) -> Self {
        Self {
            channel_id: channel_id.into(),
            query: String::new(),
            page,
            per_page,
            filters: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_filters(mut self, filters: Vec<AppliedFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() {
            return Err(Error::validation("channel id must not be empty"));
        }
        if self.page == 0 || self.per_page == 0 {
            return Err(Error::validation("page and perPage must be at least 1"));
        }
        Ok(())
    }

    /// JSON request body: fixed fields plus one field per applied filter.
    pub fn body(&self) -> Value {
        let mut body: Map<String, Value> = request_fields(&self.filters);
        body.insert("channel".into(), Value::from(self.channel_id.clone()));
        body.insert("query".into(), Value::from(self.query.trim()));
        body.insert("page".into(), Value::from(self.page));
        body.insert("perPage".into(), Value::from(self.per_page));
        Value::Object(body)
    }
}

/// The discovery operations the engine depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn status(&self, base_url: &str) -> Result<StatusSummary>;
    async fn videos(&self, base_url: &str, query: &VideoQuery) -> Result<Vec<VideoItem>>;
}

pub struct DiscoveryClient {
    http: reqwest::Client,
    bridge: Option<Arc<ImpersonationBridge>>,
}

impl DiscoveryClient {
    pub fn new(http: reqwest::Client, bridge: Option<Arc<ImpersonationBridge>>) -> Self {
        Self { http, bridge }
    }

    /// POST `payload` to `url` and return the body of a 2xx response.
    async fn post(&self, url: &str, payload: &Value) -> Result<String> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::discovery(url, format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| Error::discovery(url, format!("failed to read body: {e}")));
        }

        if should_use_bridge(status)
            && let Some(bridge) = &self.bridge
        {
            debug!(url, %status, "Retrying through impersonation bridge");
            return bridge
                .fetch("POST", url, payload)
                .await
                .map_err(|e| Error::discovery(url, format!("bridge fetch failed: {e}")));
        }

        Err(Error::discovery(url, format!("server responded with {status}")))
    }

    async fn fetch_listing(&self, url: &str, body: &Value) -> Result<Vec<VideoItem>> {
        let text = self.post(url, body).await?;
        match parse_listing(&text) {
            ListingBody::Items(items) => Ok(items),
            ListingBody::Malformed(detail) => Err(Error::discovery(url, detail)),
        }
    }
}

#[async_trait]
impl CatalogClient for DiscoveryClient {
    async fn status(&self, base_url: &str) -> Result<StatusSummary> {
        let url = endpoint(base_url, STATUS_PATH);
        let text = self.post(&url, &Value::Object(Map::new())).await?;
        let wire: StatusResponse = serde_json::from_str(&text)
            .map_err(|e| Error::discovery(&url, format!("malformed status body: {e}")))?;
        Ok(wire.into())
    }

    async fn videos(&self, base_url: &str, query: &VideoQuery) -> Result<Vec<VideoItem>> {
        query.validate()?;
        let body = query.body();

        let primary = endpoint(base_url, VIDEOS_PATH);
        match self.fetch_listing(&primary, &body).await {
            Ok(items) => Ok(items),
            Err(primary_err) => {
                let fallback = endpoint(base_url, VIDEO_FALLBACK_PATH);
                debug!(error = %primary_err, fallback = %fallback, "Listing endpoint failed, trying fallback");
                self.fetch_listing(&fallback, &body).await.map_err(|fallback_err| {
                    warn!(error = %fallback_err, "Fallback listing endpoint failed");
                    primary_err
                })
            }
        }
    }
}
