use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::config::SqliteConfig;
use crate::error::SeshdexError;

const MIGRATION_001: &str = include_str!("schema.sql");

const MIGRATIONS: &[(u32, &str)] = &[(1, MIGRATION_001)];

/// Open or create a SQLite database with default PRAGMA settings.
pub fn open(path: &Path) -> Result<Connection> {
    open_with_config(path, &SqliteConfig::default())
}

/// Open or create a SQLite database with configurable PRAGMA settings.
/// Runs an integrity check on an existing file and migrates to the latest
/// schema version.
pub fn open_with_config(path: &Path, sqlite_config: &SqliteConfig) -> Result<Connection> {
    let existed = path.exists();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    let cache_size_kb = sqlite_config.cache_size_mb as i64 * 1000;
    let mmap_size = sqlite_config.mmap_size_mb as i64 * 1_048_576;

    let pragmas = format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -{cache_size_kb};
         PRAGMA mmap_size = {mmap_size};"
    );

    conn.execute_batch(&pragmas)
        .context("failed to set database PRAGMAs")?;

    if existed {
        check_integrity(&conn, path)?;
    }

    migrate(&conn)?;

    Ok(conn)
}

fn check_integrity(conn: &Connection, path: &Path) -> Result<()> {
    let result: String = conn.query_row("PRAGMA quick_check(1)", [], |row| row.get(0))?;
    if result != "ok" {
        return Err(SeshdexError::DbCorrupted(path.to_path_buf()).into());
    }
    Ok(())
}

/// Checkpoints the WAL into the main database file, truncating it. Called
/// on clean shutdown and after large batch ingests.
pub fn checkpoint_truncate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .context("wal checkpoint failed")?;
    Ok(())
}

/// Returns the default database path: ~/.seshdex/seshdex.db
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".seshdex")
        .join("seshdex.db")
}

/// Run pending migrations against the database.
fn migrate(conn: &Connection) -> Result<()> {
    let current_version: u32 =
        conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for &(version, sql) in MIGRATIONS {
        if version > current_version {
            tracing::info!("running migration v{version}");
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql)
                .with_context(|| format!("migration v{version} failed"))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()
                .with_context(|| format!("failed to commit migration v{version}"))?;
            tracing::info!("migration v{version} complete");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_db_and_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("test.db");
        let conn = open(&db_path).unwrap();

        assert!(db_path.exists());

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_migration_sets_version() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let conn = open(&db_path).unwrap();

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_migration_idempotent() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");

        let _conn1 = open(&db_path).unwrap();
        let conn2 = open(&db_path).unwrap();

        let version: u32 = conn2
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_all_tables_created() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let conn = open(&db_path).unwrap();

        let expected_tables = [
            "sessions",
            "messages_meta",
            "tool_uses",
            "extraction_state",
            "links",
            "entities",
            "entity_sessions",
            "entity_links",
        ];

        for table in &expected_tables {
            let exists: bool = conn
                .prepare(&format!(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='{table}'"
                ))
                .unwrap()
                .query_row([], |row| row.get::<_, i32>(0))
                .map(|c| c > 0)
                .unwrap();
            assert!(exists, "table {table} should exist");
        }

        let fts_exists: bool = conn
            .prepare(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='messages_fts'",
            )
            .unwrap()
            .query_row([], |row| row.get::<_, i32>(0))
            .map(|c| c > 0)
            .unwrap();
        assert!(fts_exists, "messages_fts virtual table should exist");
    }

    #[test]
    fn test_integrity_check_passes_on_fresh_db() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let _conn = open(&db_path).unwrap();
        // Reopening an existing, healthy file exercises check_integrity.
        let conn2 = open(&db_path).unwrap();
        let result: String = conn2
            .query_row("PRAGMA quick_check(1)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(result, "ok");
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with(".seshdex/seshdex.db"));
    }
}
