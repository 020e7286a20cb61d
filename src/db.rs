//! SQLite connection management.
//!
//! Every query operation opens its own connection and drops it before
//! returning. The query layer only ever opens stores read-only; the index
//! builder is the single writer and only writes the search store.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, SqliteConnection};
use std::path::Path;

use crate::config::Config;
use crate::error::{QueryError, QueryResult};
use crate::schema;

/// Opens `path` read-only; a missing file is `StoreUnavailable`.
async fn open_read_only(path: &Path, label: &str) -> QueryResult<SqliteConnection> {
    if !path.exists() {
        return Err(QueryError::StoreUnavailable(format!(
            "{} not found: {}",
            label,
            path.display()
        )));
    }

    SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false)
        .connect()
        .await
        .map_err(|e| {
            QueryError::StoreUnavailable(format!("cannot open {} {}: {}", label, path.display(), e))
        })
}

/// Read-only connection to the authoritative task ledger.
pub async fn connect_source(config: &Config) -> QueryResult<SqliteConnection> {
    open_read_only(&config.db.source_path, "botsunichiroku.db").await
}

/// Read-only connection to the search store, checked against the schema version.
pub async fn connect_index(config: &Config) -> QueryResult<SqliteConnection> {
    let mut conn = open_read_only(&config.db.index_path, "search_index.db").await?;
    schema::verify(&mut conn).await?;
    Ok(conn)
}

/// Deletes any existing search store at `path` and opens an empty one.
pub async fn recreate_index(path: &Path) -> Result<SqliteConnection> {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = Path::new(&file);
        if file.exists() {
            std::fs::remove_file(file)
                .with_context(|| format!("Failed to remove {}", file.display()))?;
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete)
        .connect()
        .await
        .with_context(|| format!("Failed to create search index at {}", path.display()))?;

    Ok(conn)
}

/// Whether `table` exists in the connected database.
pub async fn has_table(conn: &mut SqliteConnection, table: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_one(&mut *conn)
        .await
}
