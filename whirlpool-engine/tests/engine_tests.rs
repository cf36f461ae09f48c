mod common;

use std::sync::Arc;

use whirlpool_engine::domain::VideoItem;
use whirlpool_engine::filters::FilterSelections;
use whirlpool_engine::{Engine, ErrorKind, PlaybackRequest};

use common::{FakeExtractor, FakeFetcher, Recorded, catalog_app, serve, test_config};

async fn engine_with(
    dir: &std::path::Path,
    extractor: Arc<FakeExtractor>,
    fail_downloads: bool,
) -> Arc<Engine> {
    Engine::builder(test_config(dir))
        .with_extractor(extractor)
        .with_fetcher(Arc::new(FakeFetcher {
            fail: fail_downloads,
        }))
        .build()
        .await
        .unwrap()
}

fn video(id: &str, title: &str) -> VideoItem {
    VideoItem {
        id: id.to_string(),
        title: title.to_string(),
        page_url: format!("https://videos.example.org/watch/{id}"),
        duration_seconds: None,
        thumbnail_url: None,
        network: None,
        author_name: None,
        extractor: None,
        view_count: None,
        raw: None,
    }
}

#[tokio::test]
async fn bare_host_falls_back_to_http() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(catalog_app(Recorded::default())).await;
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;

    let source = engine.add_source(&addr.to_string()).await.unwrap();
    assert_eq!(source.base_url, format!("http://{addr}"));
    assert_eq!(source.title, "Test Catalog");

    let active = engine.active_source().await.unwrap().unwrap();
    assert_eq!(active.base_url, source.base_url);

    let categories = engine
        .settings()
        .get_string_list(&format!("categories:{}", source.base_url))
        .await
        .unwrap();
    assert_eq!(categories, vec!["movies", "shows"]);

    let err = engine.add_source(&source.base_url).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(engine.list_sources().await.unwrap().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn set_active_keeps_a_single_active_source() {
    let dir = tempfile::tempdir().unwrap();
    let first = serve(catalog_app(Recorded::default())).await;
    let second = serve(catalog_app(Recorded::default())).await;
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;

    let a = engine.add_source(&format!("http://{first}")).await.unwrap();
    let b = engine.add_source(&format!("http://{second}/")).await.unwrap();
    assert_eq!(engine.active_source().await.unwrap().unwrap().base_url, b.base_url);

    assert!(!engine.set_active_source("http://unknown.invalid").await.unwrap());
    assert_eq!(engine.active_source().await.unwrap().unwrap().base_url, b.base_url);

    assert!(engine.set_active_source(&a.base_url).await.unwrap());
    assert!(engine.set_active_source(&a.base_url).await.unwrap());
    let sources = engine.list_sources().await.unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources.iter().filter(|s| s.is_active).count(), 1);
    assert_eq!(engine.active_source().await.unwrap().unwrap().base_url, a.base_url);

    engine.shutdown().await;
}

#[tokio::test]
async fn listing_applies_stored_filters_and_uses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let recorded = Recorded::default();
    let addr = serve(catalog_app(recorded.clone())).await;
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;
    engine.add_source(&format!("http://{addr}")).await.unwrap();

    let defaults = engine.channel_filters("news").await.unwrap();
    assert_eq!(defaults.applied[0].choice_ids, vec!["new"]);
    assert_eq!(defaults.applied[1].choice_ids, vec!["a"]);

    let mut selection = FilterSelections::new();
    selection.insert("sort".into(), vec!["stale".into(), "top".into()]);
    selection.insert("tags".into(), vec![]);
    selection.insert("ghost".into(), vec!["x".into()]);
    let saved = engine.save_filter_selection("news", &selection).await.unwrap();
    assert_eq!(saved.applied[0].choice_ids, vec!["top"]);
    assert!(saved.applied[1].choice_ids.is_empty());

    let page = engine.discover_videos("news", "dogs", 1, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    let again = engine.discover_videos("news", "dogs", 1, 2).await.unwrap();
    assert_eq!(again, page);

    let bodies = recorded.bodies("/api/videos");
    assert_eq!(bodies.len(), 1, "second page load should be served from cache");
    assert_eq!(bodies[0]["sort"], "top");
    assert_eq!(bodies[0]["tags"], serde_json::json!([]));
    assert!(bodies[0].get("ghost").is_none());
    assert_eq!(recorded.bodies("/api/status").len(), 1);

    let searches = engine.list_search_history(10).await.unwrap();
    assert_eq!(searches[0].query, "dogs");

    engine.shutdown().await;
}

#[tokio::test]
async fn undeclared_channel_is_listed_without_filters() {
    let dir = tempfile::tempdir().unwrap();
    let recorded = Recorded::default();
    let addr = serve(catalog_app(recorded.clone())).await;
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;
    engine.add_source(&format!("http://{addr}")).await.unwrap();

    engine.discover_videos("other", "", 1, 5).await.unwrap();
    let body = &recorded.bodies("/api/videos")[0];
    assert_eq!(body["channel"], "other");
    assert!(body.get("sort").is_none());

    let err = engine.channel_filters("other").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(engine.list_search_history(10).await.unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn failing_channel_arguments_are_retried_without_them() {
    let dir = tempfile::tempdir().unwrap();
    let addr = serve(catalog_app(Recorded::default())).await;
    let extractor = FakeExtractor::new("https://cdn.example.org/clip.m3u8");
    let engine = engine_with(dir.path(), extractor.clone(), false).await;
    engine.add_source(&format!("http://{addr}")).await.unwrap();

    let request = PlaybackRequest::for_video("clips", &video("c1", "Clip"));
    let resolution = engine.resolve(&request).await.unwrap();
    assert_eq!(resolution.stream_url, "https://cdn.example.org/clip.m3u8");
    assert_eq!(resolution.request_headers["User-Agent"], "test-agent");
    assert!(
        resolution
            .diagnostics
            .iter()
            .any(|d| d.contains("retried without them"))
    );

    {
        let calls = extractor.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec!["--format", "best"]);
        assert!(calls[1].1.is_empty());
    }

    engine.resolve(&request).await.unwrap();
    assert_eq!(extractor.call_count(), 2, "repeat resolution should hit the cache");

    let history = engine.list_watch_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].video_id, "c1");
    assert_eq!(history[0].title, "Clip");

    engine.shutdown().await;
}

#[tokio::test]
async fn blank_stream_url_is_a_resolution_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(dir.path(), FakeExtractor::new("  "), false).await;

    let err = engine
        .resolve(&PlaybackRequest::for_url("https://videos.example.org/watch/9"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.to_string().contains("missing stream URL"));

    let err = engine
        .resolve(&PlaybackRequest::for_url("   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    engine.shutdown().await;
}

#[tokio::test]
async fn downloaded_item_plays_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = FakeExtractor::new("https://cdn.example.org/remote.mp4");
    let engine = engine_with(dir.path(), extractor.clone(), false).await;
    let request = PlaybackRequest::for_video("news", &video("n1", "Breaking: News/Today"));

    let record = engine.download(&request).await.unwrap();
    assert!(record.file_path.is_file());
    assert!(record.file_path.starts_with(dir.path().join("downloads").join("news")));
    assert_eq!(record.file_size, 5);

    let again = engine.download(&request).await.unwrap();
    assert_eq!(engine.list_downloads().await.unwrap().len(), 1);
    assert!(again.file_path.is_file());
    assert_eq!(again.file_path, record.file_path);

    let local = engine.resolve(&request).await.unwrap();
    assert!(local.is_local());
    assert!(local.stream_url.starts_with("file://"));
    assert_eq!(local.ext.as_deref(), Some("mp4"));
    assert_eq!(extractor.call_count(), 0);

    assert!(engine.remove_download("news", "n1").await.unwrap());
    assert!(!again.file_path.exists());
    assert!(engine.download_path("news", "n1").await.unwrap().is_none());

    let remote = engine.resolve(&request).await.unwrap();
    assert_eq!(remote.stream_url, "https://cdn.example.org/remote.mp4");
    assert_eq!(extractor.call_count(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn engine_start_sweeps_leftover_staging() {
    let dir = tempfile::tempdir().unwrap();
    let leftover = dir.path().join("downloads").join(".partial-interrupted");
    std::fs::create_dir_all(&leftover).unwrap();
    std::fs::write(leftover.join("clip.mp4.part"), b"half").unwrap();

    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;
    assert!(!leftover.exists());

    engine.shutdown().await;
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), true).await;
    let request = PlaybackRequest::for_video("news", &video("n2", "Broken"));

    assert!(engine.download(&request).await.is_err());
    assert!(engine.list_downloads().await.unwrap().is_empty());

    let leftovers = std::fs::read_dir(dir.path().join("downloads"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);

    let err = engine
        .download(&PlaybackRequest::for_url("https://videos.example.org/watch/3"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    engine.shutdown().await;
}

#[tokio::test]
async fn favorites_render_offline_and_join_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;

    engine.add_favorite(Some("news"), &video("a", "A")).await.unwrap();
    assert!(engine.toggle_favorite(Some("news"), &video("b", "B")).await.unwrap());
    assert!(!engine.toggle_favorite(Some("news"), &video("b", "B")).await.unwrap());
    engine.add_favorite(None, &video("c", "C")).await.unwrap();

    assert!(engine.is_favorite("a").await.unwrap());
    assert!(!engine.is_favorite("b").await.unwrap());

    let offline = engine.favorite_videos().await.unwrap();
    assert_eq!(offline.len(), 2);

    let mut fresh = video("a", "A (updated)");
    fresh.view_count = Some(10);
    let joined = engine
        .resolve_favorites(&[video("zzz", "Z"), fresh.clone()])
        .await
        .unwrap();
    assert_eq!(joined, vec![fresh]);

    assert_eq!(engine.clear_favorites().await.unwrap(), 2);
    assert!(engine.list_favorites().await.unwrap().is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn health_reflects_state() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(dir.path(), FakeExtractor::new("https://cdn/x.mp4"), false).await;

    let health = engine.health().await;
    assert!(health.engine_ready);
    assert!(health.db_accessible);
    assert!(health.extractor_version.is_none());
    assert!(health.active_source.is_none());
    assert!(health.last_error.is_none());

    engine.shutdown().await;
    assert!(!engine.health().await.engine_ready);
}
