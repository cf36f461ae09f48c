//! Persistence layer.
//!
//! A single SQLite file accessed through sqlx. Reads go through a pooled
//! read pool; every mutation goes through a one-connection write pool so
//! writers are serialized and use short `BEGIN IMMEDIATE` transactions.

pub mod maintenance;
pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;
pub mod transfer;

pub use maintenance::MaintenanceService;
pub use transfer::TransferManager;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::fs;
use crate::{Error, Result};

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Serialized write pool type alias (max_connections=1).
pub type WritePool = Pool<Sqlite>;

/// Tables owned by the engine, in dependency-free order.
pub const TABLES: &[&str] = &[
    "source_servers",
    "settings",
    "favorites",
    "cache_entries",
    "downloads",
    "watch_history",
    "search_history",
    "achievements",
];

/// Full schema DDL, also used to recreate tables on reset.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/20250601000000_initial_schema.sql");

/// Maximum read pool size.
const DEFAULT_POOL_SIZE: u32 = 8;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Default cache size (negative means KiB).
const DEFAULT_CACHE_SIZE_KB: i32 = -16000;

/// Default WAL auto-checkpoint threshold in pages.
const DEFAULT_WAL_AUTOCHECKPOINT_PAGES: i32 = 1000;

async fn apply_per_connection_pragmas(
    conn: &mut sqlx::SqliteConnection,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "PRAGMA wal_autocheckpoint = {}",
        DEFAULT_WAL_AUTOCHECKPOINT_PAGES
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!("PRAGMA cache_size = {}", DEFAULT_CACHE_SIZE_KB))
        .execute(&mut *conn)
        .await?;

    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn ensure_wal_mode(pool: &DbPool, pool_name: &str) -> std::result::Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let row = sqlx::query("PRAGMA journal_mode")
        .fetch_one(&mut *conn)
        .await?;
    let mode: String = row.get(0);
    if mode != "wal" && mode != "memory" {
        tracing::warn!(
            pool = pool_name,
            mode = %mode,
            "journal_mode is not WAL; re-setting"
        );
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

fn connect_options(path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true)
}

/// Compute a sensible default read pool size based on available CPU cores.
pub fn default_read_pool_size() -> u32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(2);
    (cores * 2).clamp(2, DEFAULT_POOL_SIZE)
}

/// Initialize the read pool for the database file at `path`.
pub async fn init_pool_with_size(
    path: &Path,
    max_connections: u32,
) -> std::result::Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| {
            Box::pin(async move { apply_per_connection_pragmas(&mut *conn).await })
        })
        .connect_with(connect_options(path))
        .await?;

    ensure_wal_mode(&pool, "read_pool").await?;

    tracing::debug!(max_connections, "Read pool initialized");
    Ok(pool)
}

/// Initialize a serialized write pool with `max_connections = 1`.
///
/// All writes go through this pool so only one connection ever attempts to
/// take the SQLite write lock.
pub async fn init_write_pool(path: &Path) -> std::result::Result<WritePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(60))
        .after_connect(|conn, _meta| {
            Box::pin(async move { apply_per_connection_pragmas(&mut *conn).await })
        })
        .connect_with(connect_options(path))
        .await?;

    ensure_wal_mode(&pool, "write_pool").await?;

    tracing::debug!("Write pool initialized (serialized writes)");
    Ok(pool)
}

pub async fn run_migrations(pool: &WritePool) -> Result<()> {
    tracing::debug!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn begin_immediate(pool: &WritePool) -> std::result::Result<ImmediateTransaction, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction::new(conn))
}

/// Wrapper for a manual immediate transaction.
///
/// `BEGIN IMMEDIATE` takes the write lock up front so a transaction never has
/// to upgrade from a read lock halfway through. If the wrapper is dropped
/// without `commit`/`rollback` (caller abandoned the future) the connection is
/// closed instead of being returned to the pool, which rolls the transaction
/// back.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    pub fn new(conn: sqlx::pool::PoolConnection<Sqlite>) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    pub async fn commit(mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.close_on_drop();
        }
    }
}

/// Handle to the embedded store: file path plus both pools.
#[derive(Clone)]
pub struct Database {
    path: PathBuf,
    pool: DbPool,
    write_pool: WritePool,
}

impl Database {
    /// Open (creating if needed) the database file and apply migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(Error::config("database path must not be empty"));
        }
        fs::ensure_parent_dir_with_op("creating database directory", &path).await?;

        let write_pool = init_write_pool(&path).await?;
        run_migrations(&write_pool).await?;
        let pool = init_pool_with_size(&path, default_read_pool_size()).await?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(Self {
            path,
            pool,
            write_pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn write_pool(&self) -> &WritePool {
        &self.write_pool
    }

    /// Cheap liveness probe used by health reporting.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
        self.write_pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_applies_schema_in_wal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nested/engine.db"))
            .await
            .unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mode, "wal");

        for table in TABLES {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(db.pool())
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
        assert!(db.ping().await);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db")).await.unwrap();

        {
            let mut tx = begin_immediate(db.write_pool()).await.unwrap();
            sqlx::query("INSERT INTO settings (key, value, updated_at) VALUES ('k', 'v', 0)")
                .execute(&mut *tx)
                .await
                .unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);

        // The write pool must still hand out a usable connection.
        let tx = begin_immediate(db.write_pool()).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[test]
    fn test_default_read_pool_size_bounds() {
        let size = default_read_pool_size();
        assert!((2..=DEFAULT_POOL_SIZE).contains(&size));
    }
}
