//! Bulk maintenance operations over the store.
//!
//! Every operation runs in its own `BEGIN IMMEDIATE` transaction on the write
//! pool, so a failure part-way leaves the previous state intact.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::now_ms;
use crate::database::{SCHEMA_SQL, TABLES, WritePool, begin_immediate};
use crate::Result;

/// Clears and resets persisted state.
#[derive(Clone)]
pub struct MaintenanceService {
    write_pool: WritePool,
}

impl MaintenanceService {
    pub fn new(write_pool: WritePool) -> Self {
        Self { write_pool }
    }

    async fn clear_tables(&self, op_name: &'static str, tables: &[&str]) -> Result<u64> {
        let rows = retry_on_sqlite_busy(op_name, || async {
            let mut tx = begin_immediate(&self.write_pool).await?;
            let mut rows = 0u64;
            for table in tables {
                rows += sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            tx.commit().await?;
            Ok(rows)
        })
        .await?;

        info!(op = op_name, rows, "Maintenance operation completed");
        Ok(rows)
    }

    pub async fn clear_cache(&self) -> Result<u64> {
        self.clear_tables("clear_cache", &["cache_entries"]).await
    }

    pub async fn clear_favorites(&self) -> Result<u64> {
        self.clear_tables("clear_favorites", &["favorites"]).await
    }

    /// Clears watch history and search history.
    pub async fn clear_watch_history(&self) -> Result<u64> {
        self.clear_tables("clear_watch_history", &["watch_history", "search_history"])
            .await
    }

    pub async fn clear_achievements(&self) -> Result<u64> {
        self.clear_tables("clear_achievements", &["achievements"])
            .await
    }

    /// Drop every engine table and recreate the schema.
    pub async fn reset_all(&self) -> Result<()> {
        retry_on_sqlite_busy("reset_all", || async {
            let mut tx = begin_immediate(&self.write_pool).await?;
            for table in TABLES {
                sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::raw_sql(SCHEMA_SQL).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        info!("All persisted data reset");
        Ok(())
    }

    /// Delete cache entries older than `max_age`.
    pub async fn purge_expired_cache(&self, max_age: Duration) -> Result<u64> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms().saturating_sub(max_age_ms);
        let result = sqlx::query("DELETE FROM cache_entries WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.write_pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Periodically purge cache entries older than `max_age` until cancelled.
    pub fn start_cache_sweeper(
        &self,
        interval: Duration,
        max_age: Duration,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match service.purge_expired_cache(max_age).await {
                            Ok(0) => {}
                            Ok(rows) => info!(rows, "Purged expired cache entries"),
                            Err(e) => warn!(error = %e, "Failed to purge expired cache entries"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn seeded() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db")).await.unwrap();
        sqlx::raw_sql(
            r#"
            INSERT INTO cache_entries VALUES ('a', 'listing', '[]', 0);
            INSERT INTO cache_entries VALUES ('b', 'listing', '[]', 9999999999999);
            INSERT INTO favorites (video_id, title, page_url, added_at) VALUES ('v1', 't', 'u', 1);
            INSERT INTO watch_history VALUES ('c', 'v1', 't', 'u', NULL, 1);
            INSERT INTO search_history VALUES ('cats', 1);
            INSERT INTO achievements VALUES ('first', 'First', 1);
            INSERT INTO settings VALUES ('k', 'v', 1);
            "#,
        )
        .execute(db.write_pool())
        .await
        .unwrap();
        (dir, db)
    }

    async fn count(db: &Database, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn test_clear_operations_report_rows() {
        let (_dir, db) = seeded().await;
        let maintenance = MaintenanceService::new(db.write_pool().clone());

        assert_eq!(maintenance.clear_cache().await.unwrap(), 2);
        assert_eq!(maintenance.clear_favorites().await.unwrap(), 1);
        assert_eq!(maintenance.clear_watch_history().await.unwrap(), 2);
        assert_eq!(maintenance.clear_achievements().await.unwrap(), 1);
        assert_eq!(maintenance.clear_cache().await.unwrap(), 0);
        assert_eq!(count(&db, "settings").await, 1);
    }

    #[tokio::test]
    async fn test_purge_expired_cache_keeps_fresh_rows() {
        let (_dir, db) = seeded().await;
        let maintenance = MaintenanceService::new(db.write_pool().clone());

        let purged = maintenance
            .purge_expired_cache(Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(count(&db, "cache_entries").await, 1);
    }

    #[tokio::test]
    async fn test_purge_with_unbounded_age_keeps_everything() {
        let (_dir, db) = seeded().await;
        let maintenance = MaintenanceService::new(db.write_pool().clone());

        let purged = maintenance.purge_expired_cache(Duration::MAX).await.unwrap();
        assert_eq!(purged, 0);
        assert_eq!(count(&db, "cache_entries").await, 2);
    }

    #[tokio::test]
    async fn test_reset_all_recreates_empty_schema() {
        let (_dir, db) = seeded().await;
        let maintenance = MaintenanceService::new(db.write_pool().clone());

        maintenance.reset_all().await.unwrap();
        for table in TABLES {
            assert_eq!(count(&db, table).await, 0, "{table} not empty");
        }

        // The single-active index must survive the reset.
        sqlx::raw_sql(
            "INSERT INTO source_servers VALUES ('https://a', 'a', NULL, NULL, 1, 1);",
        )
        .execute(db.write_pool())
        .await
        .unwrap();
        let second = sqlx::raw_sql(
            "INSERT INTO source_servers VALUES ('https://b', 'b', NULL, NULL, 1, 2);",
        )
        .execute(db.write_pool())
        .await;
        assert!(second.is_err());
    }
}
