//! SQLite connection management for the vector store.
//!
//! The store lives in a single database file inside the vector store
//! directory. WAL mode is enabled so a long indexing pass does not block
//! reads from the same process.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Database file name inside the vector store directory.
pub const DB_FILE_NAME: &str = "vectors.sqlite";

pub fn db_path(store_dir: &Path) -> PathBuf {
    store_dir.join(DB_FILE_NAME)
}

/// Open a pool on `db_path`. With `create`, the file and its parent
/// directories are created if missing.
pub async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(create)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}
