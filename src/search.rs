//! Full-text search and similar-task retrieval over the search store.
//!
//! Both operations tokenize input with the same analyzer used at index
//! time, so query terms line up with stored `content` tokens.
//!
//! - [`search`] requires every query token (implicit AND).
//! - [`search_similar`] accepts any keyword of a subtask's description (OR),
//!   drops the subtask itself, and attaches the live `audit_status` of
//!   subtask hits.

use serde::Serialize;
use sqlx::{Connection, Row, SqliteConnection};

use crate::config::Config;
use crate::db;
use crate::error::{QueryError, QueryResult};
use crate::schema;
use crate::tokenizer::TextAnalyzer;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub source_type: String,
    pub source_id: String,
    pub parent_id: String,
    pub project: String,
    pub worker_id: String,
    pub status: String,
    pub snippet: String,
    /// 1-based position in the result list.
    pub rank: usize,
    /// FTS5 rank; lower is better.
    pub score: f64,
    /// Only present on subtask hits of [`search_similar`]; `null` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_status: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub tokenized_query: String,
    pub total_hits: i64,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarResponse {
    pub subtask_id: String,
    pub keywords: Vec<String>,
    pub results: Vec<SearchHit>,
}

/// Checks `limit` against `1..=max`, falling back to `default`.
pub(crate) fn resolve_limit(limit: Option<i64>, default: i64, max: i64) -> QueryResult<i64> {
    let limit = limit.unwrap_or(default);
    if !(1..=max).contains(&limit) {
        return Err(QueryError::InvalidInput(format!(
            "limit must be between 1 and {}",
            max
        )));
    }
    Ok(limit)
}

/// Searches indexed documents containing every token of `query`.
///
/// `total_hits` counts all matches; `limit` only bounds `results`.
pub async fn search(
    config: &Config,
    analyzer: &TextAnalyzer,
    query: &str,
    limit: Option<i64>,
) -> QueryResult<SearchResponse> {
    let r = &config.retrieval;
    let limit = resolve_limit(limit, r.search_default_limit, r.search_max_limit)?;
    if query.trim().is_empty() {
        return Err(QueryError::InvalidInput("query must not be empty".to_string()));
    }

    let tokenized = analyzer.tokenize_for_index(query).await?;
    if tokenized.trim().is_empty() {
        return Err(QueryError::InvalidInput(
            "query is empty after tokenization".to_string(),
        ));
    }
    let match_query = schema::match_all(tokenized.split_whitespace());

    let mut conn = db::connect_index(config).await?;
    let results = fetch_hits(&mut conn, &match_query, limit, r.snippet_tokens).await?;
    let total_hits: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM search_index WHERE search_index MATCH ?")
            .bind(&match_query)
            .fetch_one(&mut conn)
            .await?;
    conn.close().await?;

    Ok(SearchResponse {
        query: query.to_string(),
        tokenized_query: tokenized,
        total_hits,
        results,
    })
}

/// Finds documents sharing keywords with a subtask's description.
pub async fn search_similar(
    config: &Config,
    analyzer: &TextAnalyzer,
    subtask_id: &str,
    limit: Option<i64>,
) -> QueryResult<SimilarResponse> {
    let r = &config.retrieval;
    let limit = resolve_limit(limit, r.similar_default_limit, r.similar_max_limit)?;
    if subtask_id.trim().is_empty() {
        return Err(QueryError::InvalidInput("subtask_id must not be empty".to_string()));
    }

    let mut src = db::connect_source(config).await?;
    let description: Option<Option<String>> =
        sqlx::query_scalar("SELECT description FROM subtasks WHERE id = ?")
            .bind(subtask_id)
            .fetch_optional(&mut src)
            .await?;
    let description = match description {
        Some(d) => d.unwrap_or_default(),
        None => {
            return Err(QueryError::NotFound(format!(
                "subtask not found: {}",
                subtask_id
            )))
        }
    };

    let keywords = analyzer.extract_keywords(&description).await?;
    if keywords.is_empty() {
        src.close().await?;
        return Ok(SimilarResponse {
            subtask_id: subtask_id.to_string(),
            keywords,
            results: Vec::new(),
        });
    }

    let match_query = schema::match_any(keywords.iter().map(String::as_str));
    let mut idx = db::connect_index(config).await?;
    // one round-trip: over-fetch so dropping the subtask itself leaves `limit`
    let candidates = fetch_hits(
        &mut idx,
        &match_query,
        limit + r.similar_margin,
        r.snippet_tokens,
    )
    .await?;
    idx.close().await?;

    let mut results = exclude_self(candidates, subtask_id, limit as usize);
    for hit in results.iter_mut().filter(|h| h.source_type == "subtask") {
        let status: Option<Option<String>> =
            sqlx::query_scalar("SELECT audit_status FROM subtasks WHERE id = ?")
                .bind(&hit.source_id)
                .fetch_optional(&mut src)
                .await?;
        hit.audit_status = Some(status.flatten());
    }
    src.close().await?;

    Ok(SimilarResponse {
        subtask_id: subtask_id.to_string(),
        keywords,
        results,
    })
}

/// Drops hits for `source_id`, keeps at most `limit`, and renumbers ranks.
fn exclude_self(candidates: Vec<SearchHit>, source_id: &str, limit: usize) -> Vec<SearchHit> {
    candidates
        .into_iter()
        .filter(|hit| hit.source_id != source_id)
        .take(limit)
        .enumerate()
        .map(|(i, hit)| SearchHit { rank: i + 1, ..hit })
        .collect()
}

async fn fetch_hits(
    conn: &mut SqliteConnection,
    match_query: &str,
    limit: i64,
    snippet_tokens: i64,
) -> QueryResult<Vec<SearchHit>> {
    let sql = format!(
        r#"
        SELECT source_type, source_id, parent_id, project, worker_id, status,
               snippet(search_index, {}, '', '', '...', {}) AS snippet,
               rank
        FROM search_index
        WHERE search_index MATCH ?
        ORDER BY rank
        LIMIT ?
        "#,
        schema::CONTENT_COLUMN,
        snippet_tokens
    );

    let rows = sqlx::query(&sql)
        .bind(match_query)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .enumerate()
        .map(|(i, row)| -> QueryResult<SearchHit> {
            Ok(SearchHit {
                source_type: row.try_get("source_type")?,
                source_id: row.try_get("source_id")?,
                parent_id: row.try_get("parent_id")?,
                project: row.try_get("project")?,
                worker_id: row.try_get("worker_id")?,
                status: row.try_get("status")?,
                snippet: row.try_get("snippet")?,
                rank: i + 1,
                score: row.try_get("rank")?,
                audit_status: None,
            })
        })
        .collect()
}
