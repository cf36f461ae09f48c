//! Whole-database export and import.
//!
//! Export snapshots the live file with `VACUUM INTO` on the write connection,
//! so no writer can commit while the snapshot is taken. The snapshot lands in
//! a temporary file next to the destination and is renamed into place only
//! once it is complete and synced.
//!
//! Import attaches the candidate file, checks integrity and schema, and then
//! replaces the contents of every table inside one immediate transaction.
//! Any validation failure happens before the live tables are touched.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::{info, warn};

use crate::database::{Database, TABLES};
use crate::utils::fs;
use crate::{Error, Result};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Tables an importable file must contain. Missing optional tables are
/// imported as empty.
const REQUIRED_TABLES: &[&str] = &[
    "source_servers",
    "settings",
    "favorites",
    "cache_entries",
    "downloads",
];

const ATTACHED_SCHEMA: &str = "incoming";

pub struct TransferManager {
    db: Database,
}

impl TransferManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Write a consistent copy of the live database to `dest`.
    pub async fn export(&self, dest: &Path) -> Result<bool> {
        if dest.as_os_str().is_empty() {
            return Err(Error::validation("export path must not be empty"));
        }
        if same_file(dest, self.db.path()).await {
            return Err(Error::validation(
                "export path must differ from the live database",
            ));
        }
        fs::ensure_parent_dir_with_op("creating export directory", dest).await?;

        let tmp = temp_sibling(dest);
        let result = self.snapshot_into(&tmp, dest).await;
        if result.is_err() {
            fs::remove_file_quietly(&tmp).await;
        }
        result?;

        info!(path = %dest.display(), "Database exported");
        Ok(true)
    }

    async fn snapshot_into(&self, tmp: &Path, dest: &Path) -> Result<()> {
        {
            let mut conn = self.db.write_pool().acquire().await?;
            sqlx::query("VACUUM INTO ?")
                .bind(tmp.to_string_lossy().into_owned())
                .execute(&mut *conn)
                .await?;
        }
        fs::sync_file(tmp).await?;
        tokio::fs::rename(tmp, dest)
            .await
            .map_err(|e| fs::io_error("moving export into place", dest, e))
    }

    /// Replace the live contents with those of the database file at `src`.
    ///
    /// Fails with [`Error::ImportValidation`] and leaves the live store
    /// untouched if `src` is not a database with the expected schema.
    pub async fn import(&self, src: &Path) -> Result<bool> {
        check_header(src).await?;
        if same_file(src, self.db.path()).await {
            return Err(Error::import_validation(
                "cannot import the live database into itself",
            ));
        }

        let mut conn = self.db.write_pool().acquire().await?;
        sqlx::query(&format!("ATTACH DATABASE ? AS {ATTACHED_SCHEMA}"))
            .bind(src.to_string_lossy().into_owned())
            .persistent(false)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::import_validation(format!("cannot attach {}: {e}", src.display()))
            })?;

        let result = validate_and_copy(&mut conn).await;

        if let Err(e) = sqlx::query(&format!("DETACH DATABASE {ATTACHED_SCHEMA}"))
            .persistent(false)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to detach imported database; discarding connection");
            conn.close_on_drop();
        }

        result?;
        info!(path = %src.display(), "Database imported");
        Ok(true)
    }
}

async fn validate_and_copy(conn: &mut PoolConnection<Sqlite>) -> Result<()> {
    let present = validate_attached(conn).await?;

    sqlx::query("BEGIN IMMEDIATE").execute(&mut **conn).await?;
    match copy_tables(conn, &present).await {
        Ok(()) => {
            sqlx::query("COMMIT").execute(&mut **conn).await?;
            Ok(())
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut **conn).await {
                warn!(error = %rollback, "Rollback after failed import also failed");
                conn.close_on_drop();
            }
            Err(e)
        }
    }
}

/// Check the attached file and return the set of engine tables it contains.
async fn validate_attached(conn: &mut SqliteConnection) -> Result<BTreeSet<&'static str>> {
    let check: String = sqlx::query(&format!("PRAGMA {ATTACHED_SCHEMA}.quick_check"))
        .persistent(false)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::import_validation(format!("file is not a readable database: {e}")))?
        .try_get(0)?;
    if check != "ok" {
        return Err(Error::import_validation(format!(
            "integrity check failed: {check}"
        )));
    }

    let mut present = BTreeSet::new();
    for table in TABLES {
        let expected = table_columns(conn, "main", table).await?;
        let found = table_columns(conn, ATTACHED_SCHEMA, table).await?;

        if found.is_empty() {
            if REQUIRED_TABLES.contains(table) {
                return Err(Error::import_validation(format!(
                    "missing table '{table}'"
                )));
            }
            continue;
        }

        let missing: Vec<&String> = expected.difference(&found).collect();
        if !missing.is_empty() {
            return Err(Error::import_validation(format!(
                "table '{table}' is missing columns: {missing:?}"
            )));
        }
        present.insert(*table);
    }
    Ok(present)
}

async fn table_columns(
    conn: &mut SqliteConnection,
    schema: &str,
    table: &str,
) -> Result<BTreeSet<String>> {
    let rows = sqlx::query(&format!("PRAGMA {schema}.table_info({table})"))
        .persistent(false)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(Error::from))
        .collect()
}

async fn copy_tables(conn: &mut SqliteConnection, present: &BTreeSet<&'static str>) -> Result<()> {
    for table in TABLES {
        sqlx::query(&format!("DELETE FROM main.{table}"))
            .execute(&mut *conn)
            .await?;
        if !present.contains(table) {
            continue;
        }

        let columns: Vec<String> = table_columns(conn, "main", table)
            .await?
            .into_iter()
            .collect();
        let column_list = columns.join(", ");
        // Rows are inserted inactive first; the single active row is restored
        // below so a file with several active rows cannot break the index.
        let select_list = if *table == "source_servers" {
            columns
                .iter()
                .map(|c| if c == "is_active" { "0" } else { c.as_str() })
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            column_list.clone()
        };

        sqlx::query(&format!(
            "INSERT INTO main.{table} ({column_list}) SELECT {select_list} FROM {ATTACHED_SCHEMA}.{table}"
        ))
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query(&format!(
        r#"
        UPDATE main.source_servers SET is_active = 1
        WHERE base_url = (
            SELECT base_url FROM {ATTACHED_SCHEMA}.source_servers
            WHERE is_active = 1
            ORDER BY created_at, base_url LIMIT 1
        )
        "#
    ))
    .persistent(false)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn check_header(src: &Path) -> Result<()> {
    use tokio::io::AsyncReadExt;

    let mut file = tokio::fs::File::open(src)
        .await
        .map_err(|e| Error::import_validation(format!("cannot open {}: {e}", src.display())))?;
    let mut header = [0u8; 16];
    file.read_exact(&mut header)
        .await
        .map_err(|_| Error::import_validation("file is too short to be a database"))?;
    if &header != SQLITE_HEADER {
        return Err(Error::import_validation("file is not an SQLite database"));
    }
    Ok(())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export".to_string());
    dest.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open(dir: &Path, name: &str) -> Database {
        Database::open(dir.join(name)).await.unwrap()
    }

    #[tokio::test]
    async fn test_export_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path(), "live.db").await;
        let out_dir = dir.path().join("out");

        let transfer = TransferManager::new(db);
        assert!(transfer.export(&out_dir.join("backup.db")).await.unwrap());

        let names: Vec<String> = std::fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["backup.db".to_string()]);
    }

    #[tokio::test]
    async fn test_export_refuses_live_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path(), "live.db").await;
        let live = db.path().to_path_buf();
        let err = TransferManager::new(db).export(&live).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_import_rejects_non_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path(), "live.db").await;
        let junk = dir.path().join("junk.db");
        tokio::fs::write(&junk, b"definitely not sqlite, just text")
            .await
            .unwrap();

        let err = TransferManager::new(db).import(&junk).await.unwrap_err();
        assert!(matches!(err, Error::ImportValidation(_)));
    }

    #[tokio::test]
    async fn test_import_rejects_foreign_schema_and_keeps_live_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = open(dir.path(), "live.db").await;
        sqlx::query("INSERT INTO settings (key, value, updated_at) VALUES ('keep', 'me', 1)")
            .execute(db.write_pool())
            .await
            .unwrap();

        // A valid SQLite file with an unrelated schema.
        let foreign_path = dir.path().join("foreign.db");
        let foreign = crate::database::init_write_pool(&foreign_path).await.unwrap();
        sqlx::query("CREATE TABLE settings (key TEXT)")
            .execute(&foreign)
            .await
            .unwrap();
        foreign.close().await;

        let transfer = TransferManager::new(db.clone());
        let err = transfer.import(&foreign_path).await.unwrap_err();
        assert!(matches!(err, Error::ImportValidation(_)), "{err}");

        let (value,): (String,) = sqlx::query_as("SELECT value FROM settings WHERE key = 'keep'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(value, "me");
    }

    #[tokio::test]
    async fn test_import_tolerates_missing_optional_tables() {
        let dir = tempfile::tempdir().unwrap();
        let source = open(dir.path(), "source.db").await;
        sqlx::raw_sql(
            r#"
            INSERT INTO settings VALUES ('theme', 'dark', 1);
            DROP TABLE achievements;
            "#,
        )
        .execute(source.write_pool())
        .await
        .unwrap();
        source.close().await;

        let live = open(dir.path(), "live.db").await;
        sqlx::query("INSERT INTO achievements VALUES ('old', 'Old', 1)")
            .execute(live.write_pool())
            .await
            .unwrap();

        let transfer = TransferManager::new(live.clone());
        assert!(transfer.import(&dir.path().join("source.db")).await.unwrap());

        let (theme,): (String,) = sqlx::query_as("SELECT value FROM settings WHERE key = 'theme'")
            .fetch_one(live.pool())
            .await
            .unwrap();
        assert_eq!(theme, "dark");
        let (achievements,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM achievements")
            .fetch_one(live.pool())
            .await
            .unwrap();
        assert_eq!(achievements, 0);
    }
}
