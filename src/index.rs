//! Search index builder.
//!
//! Rebuilds the search store from the task ledger on every run:
//!
//! ```text
//! botsunichiroku.db ──(read-only)──▶ tokenize ──▶ search_index.db (fresh)
//! ```
//!
//! Idempotence comes from always starting with an empty store, never from
//! deduplication. The optional `dashboard_entries` table is probed once up
//! front; older ledgers without it index the other three types.

use anyhow::{bail, Context, Result};
use sqlx::{Connection, Row, SqliteConnection};

use crate::config::Config;
use crate::db;
use crate::models::{IndexCounts, SearchDocument, SourceType};
use crate::schema;
use crate::tokenizer::TextAnalyzer;

const DASHBOARD_TABLE: &str = "dashboard_entries";

/// CLI entry point for `botsu build-index`.
pub async fn run_build_index(config: &Config, analyzer: &TextAnalyzer) -> Result<()> {
    let counts = build_index(config, analyzer).await?;
    println!("{}", counts);
    Ok(())
}

/// Rebuilds the search store and returns the per-type document counts.
pub async fn build_index(config: &Config, analyzer: &TextAnalyzer) -> Result<IndexCounts> {
    let source_path = &config.db.source_path;
    if !source_path.exists() {
        bail!("botsunichiroku.db not found: {}", source_path.display());
    }

    let mut src = db::connect_source(config)
        .await
        .with_context(|| format!("Failed to open {}", source_path.display()))?;

    let documents = collect_documents(&mut src, analyzer).await?;
    src.close().await?;

    let mut idx = db::recreate_index(&config.db.index_path).await?;
    schema::create(&mut idx).await?;

    let mut counts = IndexCounts::default();
    let mut tx = idx.begin().await?;
    for doc in &documents {
        schema::insert(&mut *tx, doc).await?;
        counts.record(doc.source_type);
    }
    tx.commit().await?;
    idx.close().await?;

    tracing::info!(
        commands = counts.command,
        subtasks = counts.subtask,
        reports = counts.report,
        dashboard = counts.dashboard,
        index = %config.db.index_path.display(),
        "search index rebuilt"
    );

    Ok(counts)
}

/// Reads every eligible row of the ledger as a search document.
pub async fn collect_documents(
    src: &mut SqliteConnection,
    analyzer: &TextAnalyzer,
) -> Result<Vec<SearchDocument>> {
    let mut documents = Vec::new();
    documents.extend(collect_commands(src, analyzer).await?);
    documents.extend(collect_subtasks(src, analyzer).await?);
    documents.extend(collect_reports(src, analyzer).await?);

    if db::has_table(src, DASHBOARD_TABLE).await? {
        documents.extend(collect_dashboard(src, analyzer).await?);
    } else {
        tracing::info!("no {} table in source; skipping", DASHBOARD_TABLE);
    }

    Ok(documents)
}

/// Joins the non-empty fields with single spaces.
fn join_fields(fields: &[Option<String>]) -> String {
    fields
        .iter()
        .flatten()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

async fn collect_commands(
    src: &mut SqliteConnection,
    analyzer: &TextAnalyzer,
) -> Result<Vec<SearchDocument>> {
    let rows = sqlx::query("SELECT id, command, project, status, details FROM commands ORDER BY id")
        .fetch_all(&mut *src)
        .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        let text = join_fields(&[row.try_get("command")?, row.try_get("details")?]);
        docs.push(SearchDocument {
            source_type: SourceType::Command,
            source_id: row.try_get("id")?,
            parent_id: String::new(),
            project: opt(row.try_get("project")?),
            worker_id: String::new(),
            status: opt(row.try_get("status")?),
            content: analyzer.tokenize_for_index(&text).await?,
        });
    }
    Ok(docs)
}

async fn collect_subtasks(
    src: &mut SqliteConnection,
    analyzer: &TextAnalyzer,
) -> Result<Vec<SearchDocument>> {
    let rows = sqlx::query(
        "SELECT id, parent_cmd, worker_id, project, description, status, notes FROM subtasks ORDER BY id",
    )
    .fetch_all(&mut *src)
    .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        let text = join_fields(&[row.try_get("description")?, row.try_get("notes")?]);
        docs.push(SearchDocument {
            source_type: SourceType::Subtask,
            source_id: row.try_get("id")?,
            parent_id: opt(row.try_get("parent_cmd")?),
            project: opt(row.try_get("project")?),
            worker_id: opt(row.try_get("worker_id")?),
            status: opt(row.try_get("status")?),
            content: analyzer.tokenize_for_index(&text).await?,
        });
    }
    Ok(docs)
}

async fn collect_reports(
    src: &mut SqliteConnection,
    analyzer: &TextAnalyzer,
) -> Result<Vec<SearchDocument>> {
    let rows = sqlx::query(
        "SELECT id, worker_id, task_id, status, summary, findings, notes FROM reports ORDER BY id",
    )
    .fetch_all(&mut *src)
    .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        let text = join_fields(&[
            row.try_get("summary")?,
            row.try_get("findings")?,
            row.try_get("notes")?,
        ]);
        let id: i64 = row.try_get("id")?;
        docs.push(SearchDocument {
            source_type: SourceType::Report,
            source_id: id.to_string(),
            parent_id: opt(row.try_get("task_id")?),
            project: String::new(),
            worker_id: opt(row.try_get("worker_id")?),
            status: opt(row.try_get("status")?),
            content: analyzer.tokenize_for_index(&text).await?,
        });
    }
    Ok(docs)
}

async fn collect_dashboard(
    src: &mut SqliteConnection,
    analyzer: &TextAnalyzer,
) -> Result<Vec<SearchDocument>> {
    let rows = sqlx::query("SELECT id, cmd_id, content, status, tags FROM dashboard_entries ORDER BY id")
        .fetch_all(&mut *src)
        .await?;

    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        let text = join_fields(&[row.try_get("content")?]);
        let id: i64 = row.try_get("id")?;
        docs.push(SearchDocument {
            source_type: SourceType::Dashboard,
            source_id: id.to_string(),
            parent_id: opt(row.try_get("cmd_id")?),
            project: String::new(),
            // the dashboard has no worker; its tags ride in this column
            worker_id: opt(row.try_get("tags")?),
            status: opt(row.try_get("status")?),
            content: analyzer.tokenize_for_index(&text).await?,
        });
    }
    Ok(docs)
}

fn opt(value: Option<String>) -> String {
    value.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_skips_null_and_blank_fields() {
        let joined = join_fields(&[
            Some("watchdog タイマー".to_string()),
            None,
            Some("  ".to_string()),
            Some("リセット".to_string()),
        ]);
        assert_eq!(joined, "watchdog タイマー リセット");
        assert_eq!(join_fields(&[None, None]), "");
    }
}
