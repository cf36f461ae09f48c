#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{Value, json};
use whirlpool_engine::EngineConfig;
use whirlpool_engine::domain::PlaybackResolution;
use whirlpool_engine::resolver::{MediaFetcher, StreamExtractor};
use whirlpool_engine::{Error, Result};

/// Bind an axum app to an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn status_body() -> Value {
    json!({
        "name": "Test Catalog",
        "primaryColor": "#112233",
        "sources": ["movies", "shows"],
        "channels": [
            "news",
            { "id": "clips", "title": "Clips", "ytdlpCommand": "yt-dlp --format best" }
        ],
        "channelDetails": [{
            "id": "news",
            "name": "News",
            "options": [
                {
                    "id": "sort",
                    "title": "Sort",
                    "options": [{ "id": "new", "title": "Newest" }, { "id": "top", "title": "Top" }]
                },
                {
                    "id": "tags",
                    "multiSelect": true,
                    "choices": [{ "id": "a", "label": "A" }, { "id": "b", "label": "B" }]
                }
            ]
        }]
    })
}

/// Requests seen by [`catalog_app`], as `(path, body)`.
#[derive(Clone, Default)]
pub struct Recorded(pub Arc<Mutex<Vec<(String, Value)>>>);

impl Recorded {
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.0
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

/// A well-behaved catalog server.
pub fn catalog_app(recorded: Recorded) -> Router {
    async fn status(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.0.lock().push(("/api/status".into(), body));
        Json(status_body())
    }

    async fn videos(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.0.lock().push(("/api/videos".into(), body.clone()));
        let page = body["page"].as_u64().unwrap_or(1);
        Json(json!({
            "items": [
                { "id": format!("v{page}-1"), "title": "First", "url": "https://videos.example.org/watch/1" },
                { "id": format!("v{page}-2"), "title": "Second", "url": "https://videos.example.org/watch/2" }
            ]
        }))
    }

    Router::new()
        .route("/api/status", post(status))
        .route("/api/videos", post(videos))
        .with_state(recorded)
}

/// A server that rejects everything with 403.
pub fn forbidden_app() -> Router {
    async fn forbidden() -> StatusCode {
        StatusCode::FORBIDDEN
    }
    Router::new()
        .route("/api/status", post(forbidden))
        .route("/api/videos", post(forbidden))
        .route("/api/video", post(forbidden))
}

/// Engine configuration rooted in `dir` with background update checks off.
pub fn test_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::new(dir.join("whirlpool.db"));
    config.check_updates_on_boot = false;
    config.yt_dlp_path = dir.join("missing-yt-dlp").display().to_string();
    config.python_executable = "python3-missing-for-tests".to_string();
    config.download_dir = Some(dir.join("downloads"));
    config.http_timeout_secs = 5;
    config
}

/// Extractor double returning a fixed resolution and counting calls.
pub struct FakeExtractor {
    pub stream_url: String,
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeExtractor {
    pub fn new(stream_url: &str) -> Arc<Self> {
        Arc::new(Self {
            stream_url: stream_url.to_string(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl StreamExtractor for FakeExtractor {
    async fn extract(&self, page_url: &str, extra_args: &[String]) -> Result<PlaybackResolution> {
        self.calls
            .lock()
            .push((page_url.to_string(), extra_args.to_vec()));
        if !extra_args.is_empty() {
            return Err(Error::resolution("unsupported arguments"));
        }
        Ok(PlaybackResolution {
            id: "fake".into(),
            title: "Fake".into(),
            page_url: page_url.to_string(),
            stream_url: self.stream_url.clone(),
            request_headers: [("User-Agent".to_string(), "test-agent".to_string())].into(),
            thumbnail_url: None,
            author_name: None,
            extractor: Some("fake".into()),
            format_id: None,
            ext: Some("mp4".into()),
            protocol: Some("https".into()),
            duration_seconds: None,
            yt_dlp_version: None,
            diagnostics: Vec::new(),
        })
    }
}

/// Fetcher double writing a small file into the staging directory.
pub struct FakeFetcher {
    pub fail: bool,
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch_media(
        &self,
        _page_url: &str,
        _extra_args: &[String],
        staging_dir: &Path,
        stem: &str,
    ) -> Result<PathBuf> {
        let path = staging_dir.join(format!("{stem}-fake.mp4"));
        tokio::fs::write(&path, b"media").await?;
        if self.fail {
            return Err(Error::resolution("network dropped"));
        }
        Ok(path)
    }
}
