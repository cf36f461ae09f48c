mod common;

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::task::JoinSet;
use whirlpool_engine::domain::VideoItem;
use whirlpool_engine::{Engine, ErrorKind, PlaybackRequest};

use common::{FakeExtractor, test_config};

async fn engine(dir: &std::path::Path) -> Arc<Engine> {
    Engine::builder(test_config(dir))
        .with_extractor(FakeExtractor::new("https://cdn.example.org/v.mp4"))
        .build()
        .await
        .unwrap()
}

fn video(id: &str) -> VideoItem {
    VideoItem {
        id: id.to_string(),
        title: format!("Video {id}"),
        page_url: format!("https://videos.example.org/watch/{id}"),
        duration_seconds: Some(30),
        thumbnail_url: None,
        network: None,
        author_name: None,
        extractor: None,
        view_count: None,
        raw: None,
    }
}

#[tokio::test]
async fn export_then_import_restores_state() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path()).await;

    engine.add_favorite(Some("news"), &video("keep")).await.unwrap();
    engine.set_setting("theme", "dark").await.unwrap();
    assert!(engine.unlock_achievement("first-play", "First play").await.unwrap());
    assert!(!engine.unlock_achievement("first-play", "First play").await.unwrap());

    let backup = dir.path().join("backups").join("backup.db");
    assert!(engine.export_database(&backup).await.unwrap());
    let header = std::fs::read(&backup).unwrap();
    assert!(header.starts_with(b"SQLite format 3\0"));

    engine.clear_favorites().await.unwrap();
    engine.set_setting("theme", "light").await.unwrap();
    engine.clear_achievements().await.unwrap();

    assert!(engine.import_database(&backup).await.unwrap());
    let favorites = engine.list_favorites().await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].video_id, "keep");
    assert_eq!(favorites[0].channel_id.as_deref(), Some("news"));
    assert_eq!(engine.get_setting("theme").await.unwrap().as_deref(), Some("dark"));
    assert_eq!(engine.list_achievements().await.unwrap().len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn export_imports_into_another_store() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();
    let first = engine(first_dir.path()).await;
    let second = engine(second_dir.path()).await;

    first.add_favorite(None, &video("a")).await.unwrap();
    let backup = first_dir.path().join("out.db");
    first.export_database(&backup).await.unwrap();

    second.add_favorite(None, &video("old")).await.unwrap();
    second.import_database(&backup).await.unwrap();
    let ids: Vec<String> = second
        .list_favorites()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.video_id)
        .collect();
    assert_eq!(ids, vec!["a"]);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn invalid_imports_leave_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path()).await;
    engine.add_favorite(None, &video("safe")).await.unwrap();

    let text = dir.path().join("notes.txt");
    std::fs::write(&text, "definitely not a database, just some text").unwrap();
    let err = engine.import_database(&text).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportValidation);

    let missing = dir.path().join("missing.db");
    let err = engine.import_database(&missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportValidation);

    let corrupt = dir.path().join("corrupt.db");
    let mut bytes = b"SQLite format 3\0".to_vec();
    bytes.extend(std::iter::repeat_n(0xA5u8, 4096));
    std::fs::write(&corrupt, bytes).unwrap();
    let err = engine.import_database(&corrupt).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportValidation);

    let foreign = dir.path().join("foreign.db");
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&foreign)
                .create_if_missing(true),
        )
        .await
        .unwrap();
    sqlx::query("CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let err = engine.import_database(&foreign).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImportValidation);

    let favorites = engine.list_favorites().await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].video_id, "safe");

    let err = engine
        .export_database(&dir.path().join("whirlpool.db"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    engine.shutdown().await;
}

#[tokio::test]
async fn concurrent_toggles_and_exports_stay_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path()).await;

    let mut tasks = JoinSet::new();
    for i in 0..20 {
        let engine = engine.clone();
        tasks.spawn(async move {
            engine
                .toggle_favorite(Some("news"), &video(&format!("v{i}")))
                .await
                .map(|_| None)
        });
    }
    for i in 0..3 {
        let engine = engine.clone();
        let path = dir.path().join(format!("snapshot-{i}.db"));
        tasks.spawn(async move { engine.export_database(&path).await.map(|_| Some(path)) });
    }

    let mut snapshots = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Some(path) = joined.unwrap().unwrap() {
            snapshots.push(path);
        }
    }
    assert_eq!(engine.list_favorites().await.unwrap().len(), 20);

    let check_dir = tempfile::tempdir().unwrap();
    let checker = self::engine(check_dir.path()).await;
    for snapshot in &snapshots {
        checker.import_database(snapshot).await.unwrap();
        assert!(checker.list_favorites().await.unwrap().len() <= 20);
    }

    checker.shutdown().await;
    engine.shutdown().await;
}

#[tokio::test]
async fn maintenance_reports_rows_and_reset_recreates_schema() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(dir.path()).await;

    for id in ["a", "b"] {
        engine
            .resolve(&PlaybackRequest::for_video("news", &video(id)))
            .await
            .unwrap();
    }
    assert_eq!(engine.list_watch_history(10).await.unwrap().len(), 2);
    assert_eq!(engine.clear_watch_history().await.unwrap(), 2);
    assert!(engine.clear_cache().await.unwrap() >= 2);
    assert_eq!(engine.clear_cache().await.unwrap(), 0);

    engine.add_favorite(None, &video("x")).await.unwrap();
    engine.set_setting("theme", "dark").await.unwrap();
    engine.reset_all().await.unwrap();

    assert!(engine.list_favorites().await.unwrap().is_empty());
    assert!(engine.get_setting("theme").await.unwrap().is_none());
    engine.add_favorite(None, &video("y")).await.unwrap();
    assert_eq!(engine.list_favorites().await.unwrap().len(), 1);

    engine.shutdown().await;
}
