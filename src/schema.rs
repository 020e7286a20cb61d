//! The search-store contract.
//!
//! Both the index builder and the query layer import this module; neither
//! owns the table shape. Changing the columns means bumping
//! [`SCHEMA_VERSION`], which makes the query layer refuse stale stores until
//! they are rebuilt.

use sqlx::SqliteConnection;

use crate::error::{QueryError, QueryResult};
use crate::models::SearchDocument;

/// Stamped into `PRAGMA user_version` by the builder.
pub const SCHEMA_VERSION: i64 = 1;

pub const TABLE: &str = "search_index";

/// Zero-based index of `content`, as needed by FTS5 `snippet()`.
pub const CONTENT_COLUMN: usize = 6;

/// Only `content` is tokenized by FTS5; the rest is carried for display
/// and filtering.
pub const CREATE_TABLE: &str = r#"
CREATE VIRTUAL TABLE search_index USING fts5(
    source_type UNINDEXED,
    source_id UNINDEXED,
    parent_id UNINDEXED,
    project UNINDEXED,
    worker_id UNINDEXED,
    status UNINDEXED,
    content
)
"#;

pub const INSERT_DOCUMENT: &str = r#"
INSERT INTO search_index (source_type, source_id, parent_id, project, worker_id, status, content)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

/// Creates the table in an empty store and stamps the version.
pub async fn create(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_TABLE).execute(&mut *conn).await?;
    let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
    sqlx::query(&pragma).execute(&mut *conn).await?;
    Ok(())
}

pub async fn insert(conn: &mut SqliteConnection, doc: &SearchDocument) -> Result<(), sqlx::Error> {
    sqlx::query(INSERT_DOCUMENT)
        .bind(doc.source_type.as_str())
        .bind(&doc.source_id)
        .bind(&doc.parent_id)
        .bind(&doc.project)
        .bind(&doc.worker_id)
        .bind(&doc.status)
        .bind(&doc.content)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Fails with `StoreUnavailable` unless the store was built with this
/// schema version.
pub async fn verify(conn: &mut SqliteConnection) -> QueryResult<()> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    if version != SCHEMA_VERSION {
        return Err(QueryError::StoreUnavailable(format!(
            "search index schema version {} (expected {}); rebuild the index",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

pub async fn count(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let sql = format!("SELECT COUNT(*) FROM {}", TABLE);
    sqlx::query_scalar(&sql).fetch_one(&mut *conn).await
}

/// Wraps each term in double quotes so FTS5 reads it as a literal string.
pub fn quote_term(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Match expression requiring every term (implicit AND).
pub fn match_all<'a>(terms: impl IntoIterator<Item = &'a str>) -> String {
    terms
        .into_iter()
        .map(quote_term)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match expression accepting any term.
pub fn match_any<'a>(terms: impl IntoIterator<Item = &'a str>) -> String {
    terms
        .into_iter()
        .map(quote_term)
        .collect::<Vec<_>>()
        .join(" OR ")
}
