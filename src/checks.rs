//! Consistency checks over the task ledger.
//!
//! Two families, both read-only:
//! 1. **Orphan checks**: records whose state contradicts the ledger's own
//!    bookkeeping, such as a command left open after all its subtasks
//!    finished or completed work without a report.
//! 2. **Coverage**: how many nouns of a command's instruction reappear in
//!    the summaries of its reports.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{Connection, Row, SqliteConnection};
use std::collections::HashSet;

use crate::config::Config;
use crate::db;
use crate::error::{QueryError, QueryResult};
use crate::tokenizer::TextAnalyzer;

/// Offending record of one check; the shape depends on the check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrphanItem {
    OpenCommand {
        cmd_id: String,
        status: Option<String>,
        subtask_count: i64,
    },
    StaleCommand {
        cmd_id: String,
        status: Option<String>,
        created_at: Option<String>,
    },
    StaleSubtask {
        subtask_id: String,
        parent_cmd: Option<String>,
        worker_id: Option<String>,
        assigned_at: Option<String>,
    },
    UnreportedSubtask {
        subtask_id: String,
        parent_cmd: Option<String>,
        worker_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyCheck {
    pub check_type: &'static str,
    pub description: String,
    pub count: usize,
    pub items: Vec<OrphanItem>,
}

impl ConsistencyCheck {
    fn new(check_type: &'static str, description: String, items: Vec<OrphanItem>) -> Self {
        Self {
            check_type,
            description,
            count: items.len(),
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrphanReport {
    pub timestamp: String,
    pub checks: Vec<ConsistencyCheck>,
    pub total_issues: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub cmd_id: String,
    pub instruction_keywords: Vec<String>,
    pub report_keywords: Vec<String>,
    pub missing_keywords: Vec<String>,
    pub coverage_ratio: f64,
    pub subtask_count: i64,
    pub report_count: i64,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Runs the four orphan checks as of `now`.
pub async fn check_orphans(config: &Config, now: DateTime<Utc>) -> QueryResult<OrphanReport> {
    let stale_days = config.checks.stale_days;
    let cutoff = (now - Duration::days(stale_days))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    let mut conn = db::connect_source(config).await?;
    let checks = vec![
        ConsistencyCheck::new(
            "cmd_all_subtasks_done_but_pending",
            "all subtasks are done but the command is still open".to_string(),
            open_commands(&mut conn).await?,
        ),
        ConsistencyCheck::new(
            "cmd_pending_over_7_days",
            format!("command pending for more than {} days", stale_days),
            stale_commands(&mut conn, &cutoff).await?,
        ),
        ConsistencyCheck::new(
            "subtask_assigned_over_7_days",
            format!("subtask assigned for more than {} days", stale_days),
            stale_subtasks(&mut conn, &cutoff).await?,
        ),
        ConsistencyCheck::new(
            "subtask_done_without_report",
            "subtask is done but has no report".to_string(),
            unreported_subtasks(&mut conn).await?,
        ),
    ];
    conn.close().await?;

    let total_issues = checks.iter().map(|c| c.count).sum();
    Ok(OrphanReport {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        checks,
        total_issues,
    })
}

async fn open_commands(conn: &mut SqliteConnection) -> QueryResult<Vec<OrphanItem>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id AS cmd_id, c.status, COUNT(s.id) AS subtask_count
        FROM commands c
        JOIN subtasks s ON s.parent_cmd = c.id
        WHERE c.status IS NOT 'done'
        GROUP BY c.id
        HAVING COUNT(s.id) > 0
           AND COUNT(s.id) = SUM(CASE WHEN s.status = 'done' THEN 1 ELSE 0 END)
        ORDER BY c.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> QueryResult<OrphanItem> {
            Ok(OrphanItem::OpenCommand {
                cmd_id: row.try_get("cmd_id")?,
                status: row.try_get("status")?,
                subtask_count: row.try_get("subtask_count")?,
            })
        })
        .collect()
}

async fn stale_commands(conn: &mut SqliteConnection, cutoff: &str) -> QueryResult<Vec<OrphanItem>> {
    let rows = sqlx::query(
        r#"
        SELECT id AS cmd_id, status, created_at
        FROM commands
        WHERE status = 'pending'
          AND julianday(created_at) <= julianday(?)
        ORDER BY id
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> QueryResult<OrphanItem> {
            Ok(OrphanItem::StaleCommand {
                cmd_id: row.try_get("cmd_id")?,
                status: row.try_get("status")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

async fn stale_subtasks(conn: &mut SqliteConnection, cutoff: &str) -> QueryResult<Vec<OrphanItem>> {
    let rows = sqlx::query(
        r#"
        SELECT id AS subtask_id, parent_cmd, worker_id, assigned_at
        FROM subtasks
        WHERE status = 'assigned'
          AND julianday(assigned_at) <= julianday(?)
        ORDER BY id
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> QueryResult<OrphanItem> {
            Ok(OrphanItem::StaleSubtask {
                subtask_id: row.try_get("subtask_id")?,
                parent_cmd: row.try_get("parent_cmd")?,
                worker_id: row.try_get("worker_id")?,
                assigned_at: row.try_get("assigned_at")?,
            })
        })
        .collect()
}

async fn unreported_subtasks(conn: &mut SqliteConnection) -> QueryResult<Vec<OrphanItem>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id AS subtask_id, s.parent_cmd, s.worker_id
        FROM subtasks s
        LEFT JOIN reports r ON r.task_id = s.id
        WHERE s.status = 'done'
          AND r.id IS NULL
        ORDER BY s.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> QueryResult<OrphanItem> {
            Ok(OrphanItem::UnreportedSubtask {
                subtask_id: row.try_get("subtask_id")?,
                parent_cmd: row.try_get("parent_cmd")?,
                worker_id: row.try_get("worker_id")?,
            })
        })
        .collect()
}

/// Instruction keywords absent from `report_keywords`, in instruction order,
/// and the covered fraction rounded to two decimals.
pub fn coverage_of(instruction_keywords: &[String], report_keywords: &[String]) -> (Vec<String>, f64) {
    let reported: HashSet<&str> = report_keywords.iter().map(String::as_str).collect();
    let missing: Vec<String> = instruction_keywords
        .iter()
        .filter(|kw| !reported.contains(kw.as_str()))
        .cloned()
        .collect();

    let ratio = if instruction_keywords.is_empty() {
        0.0
    } else {
        let covered = instruction_keywords.len() - missing.len();
        round2(covered as f64 / instruction_keywords.len() as f64)
    };
    (missing, ratio)
}

/// Compares a command's instruction against the summaries of its reports.
pub async fn check_coverage(
    config: &Config,
    analyzer: &TextAnalyzer,
    cmd_id: &str,
) -> QueryResult<CoverageReport> {
    if cmd_id.trim().is_empty() {
        return Err(QueryError::InvalidInput("cmd_id must not be empty".to_string()));
    }

    let mut conn = db::connect_source(config).await?;

    let row = sqlx::query("SELECT command, details FROM commands WHERE id = ?")
        .bind(cmd_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| QueryError::NotFound(format!("command not found: {}", cmd_id)))?;
    let instruction_text = [
        row.try_get::<Option<String>, _>("command")?,
        row.try_get::<Option<String>, _>("details")?,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(" ");

    let summaries: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT r.summary
        FROM reports r
        JOIN subtasks s ON r.task_id = s.id
        WHERE s.parent_cmd = ?
          AND r.summary IS NOT NULL
        ORDER BY r.id
        "#,
    )
    .bind(cmd_id)
    .fetch_all(&mut conn)
    .await?;

    let subtask_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subtasks WHERE parent_cmd = ?")
        .bind(cmd_id)
        .fetch_one(&mut conn)
        .await?;
    conn.close().await?;

    let instruction_keywords = analyzer.extract_keywords(&instruction_text).await?;
    let report_text = summaries
        .iter()
        .filter(|s| !s.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    let report_keywords = analyzer.extract_keywords(&report_text).await?;

    let (missing_keywords, coverage_ratio) = coverage_of(&instruction_keywords, &report_keywords);

    Ok(CoverageReport {
        cmd_id: cmd_id.to_string(),
        instruction_keywords,
        report_keywords,
        missing_keywords,
        coverage_ratio,
        subtask_count,
        report_count: summaries.len() as i64,
    })
}
