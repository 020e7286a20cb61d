//! Audit history and per-worker statistics.
//!
//! Both read the ledger directly; the search store is not involved, so the
//! numbers are always current.

use serde::Serialize;
use sqlx::{Connection, Row};
use std::collections::BTreeMap;

use crate::checks::round2;
use crate::config::Config;
use crate::db;
use crate::error::QueryResult;
use crate::search::resolve_limit;

#[derive(Debug, Clone, Serialize)]
pub struct AuditItem {
    pub subtask_id: String,
    pub parent_cmd: Option<String>,
    pub worker_id: Option<String>,
    pub project: Option<String>,
    pub description: Option<String>,
    pub audit_status: Option<String>,
    pub completed_at: Option<String>,
    pub latest_report_summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditStats {
    pub total: i64,
    pub done: i64,
    pub rejected: i64,
    pub pending: i64,
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditHistory {
    pub items: Vec<AuditItem>,
    pub stats: AuditStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStats {
    pub worker_id: String,
    pub total_tasks: i64,
    pub done: i64,
    pub blocked: i64,
    pub cancelled: i64,
    pub audit_approved: i64,
    pub audit_rejected: i64,
    pub approval_rate: f64,
    pub projects: BTreeMap<String, i64>,
    pub top_project: Option<String>,
    pub avg_completion_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatsResponse {
    pub workers: Vec<WorkerStats>,
}

/// One subtask row as seen by [`summarize_worker`].
#[derive(Debug, Clone, Default)]
pub struct WorkerTask {
    pub status: Option<String>,
    pub project: Option<String>,
    pub needs_audit: bool,
    pub audit_status: Option<String>,
    /// Completion minus assignment; `None` unless both timestamps are set.
    pub hours: Option<f64>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn ratio(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64)
    }
}

/// Audit-required subtasks, newest completion first, plus outcome totals
/// over every matching row.
pub async fn audit_history(
    config: &Config,
    worker_id: Option<&str>,
    project: Option<&str>,
    limit: Option<i64>,
) -> QueryResult<AuditHistory> {
    let r = &config.retrieval;
    let limit = resolve_limit(limit, r.audit_default_limit, r.audit_max_limit)?;

    let mut conn = db::connect_source(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT s.id AS subtask_id, s.parent_cmd, s.worker_id, s.project,
               s.description, s.audit_status, s.completed_at,
               (SELECT r.summary FROM reports r
                WHERE r.task_id = s.id
                ORDER BY r.timestamp DESC, r.id DESC
                LIMIT 1) AS latest_report_summary
        FROM subtasks s
        WHERE s.needs_audit = 1
          AND (?1 IS NULL OR s.worker_id = ?1)
          AND (?2 IS NULL OR s.project = ?2)
        ORDER BY s.completed_at DESC, s.id
        LIMIT ?3
        "#,
    )
    .bind(worker_id)
    .bind(project)
    .bind(limit)
    .fetch_all(&mut conn)
    .await?;

    let items = rows
        .iter()
        .map(|row| -> QueryResult<AuditItem> {
            Ok(AuditItem {
                subtask_id: row.try_get("subtask_id")?,
                parent_cmd: row.try_get("parent_cmd")?,
                worker_id: row.try_get("worker_id")?,
                project: row.try_get("project")?,
                description: row.try_get("description")?,
                audit_status: row.try_get("audit_status")?,
                completed_at: row.try_get("completed_at")?,
                latest_report_summary: row.try_get("latest_report_summary")?,
            })
        })
        .collect::<QueryResult<Vec<_>>>()?;

    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(CASE WHEN audit_status = 'done' THEN 1 ELSE 0 END), 0) AS done,
               COALESCE(SUM(CASE WHEN audit_status = 'rejected' THEN 1 ELSE 0 END), 0) AS rejected,
               COALESCE(SUM(CASE WHEN audit_status = 'pending' OR audit_status IS NULL
                                 THEN 1 ELSE 0 END), 0) AS pending
        FROM subtasks
        WHERE needs_audit = 1
          AND (?1 IS NULL OR worker_id = ?1)
          AND (?2 IS NULL OR project = ?2)
        "#,
    )
    .bind(worker_id)
    .bind(project)
    .fetch_one(&mut conn)
    .await?;
    conn.close().await?;

    let total: i64 = totals.try_get("total")?;
    let done: i64 = totals.try_get("done")?;
    let stats = AuditStats {
        total,
        done,
        rejected: totals.try_get("rejected")?,
        pending: totals.try_get("pending")?,
        approval_rate: ratio(done, total),
    };

    Ok(AuditHistory { items, stats })
}

/// Per-worker statistics for `worker_id`, or for every worker with at
/// least one subtask.
pub async fn worker_stats(config: &Config, worker_id: Option<&str>) -> QueryResult<WorkerStatsResponse> {
    let mut conn = db::connect_source(config).await?;

    let workers: Vec<String> = match worker_id {
        Some(id) => vec![id.to_string()],
        None => {
            sqlx::query_scalar(
                "SELECT DISTINCT worker_id FROM subtasks WHERE worker_id IS NOT NULL ORDER BY worker_id",
            )
            .fetch_all(&mut conn)
            .await?
        }
    };

    let mut stats = Vec::with_capacity(workers.len());
    for worker in workers {
        let rows = sqlx::query(
            r#"
            SELECT status, project, needs_audit, audit_status,
                   CASE WHEN assigned_at IS NOT NULL AND completed_at IS NOT NULL
                        THEN (julianday(completed_at) - julianday(assigned_at)) * 24.0
                   END AS hours
            FROM subtasks
            WHERE worker_id = ?
            ORDER BY id
            "#,
        )
        .bind(&worker)
        .fetch_all(&mut conn)
        .await?;

        let tasks = rows
            .iter()
            .map(|row| -> QueryResult<WorkerTask> {
                Ok(WorkerTask {
                    status: row.try_get("status")?,
                    project: row.try_get("project")?,
                    needs_audit: row.try_get::<Option<i64>, _>("needs_audit")?.unwrap_or(0) == 1,
                    audit_status: row.try_get("audit_status")?,
                    hours: row.try_get("hours")?,
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;

        stats.push(summarize_worker(worker, &tasks));
    }
    conn.close().await?;

    Ok(WorkerStatsResponse { workers: stats })
}

/// Folds one worker's subtasks into [`WorkerStats`].
pub fn summarize_worker(worker_id: String, tasks: &[WorkerTask]) -> WorkerStats {
    let count_status = |wanted: &str| {
        tasks
            .iter()
            .filter(|t| t.status.as_deref() == Some(wanted))
            .count() as i64
    };
    let count_audit = |wanted: &str| {
        tasks
            .iter()
            .filter(|t| t.needs_audit && t.audit_status.as_deref() == Some(wanted))
            .count() as i64
    };

    let audit_approved = count_audit("done");
    let audit_rejected = count_audit("rejected");

    let mut projects: BTreeMap<String, i64> = BTreeMap::new();
    for project in tasks.iter().filter_map(|t| t.project.as_ref()) {
        *projects.entry(project.clone()).or_insert(0) += 1;
    }

    let hours: Vec<f64> = tasks.iter().filter_map(|t| t.hours).collect();
    let avg_completion_hours = if hours.is_empty() {
        None
    } else {
        Some(round1(hours.iter().sum::<f64>() / hours.len() as f64))
    };

    WorkerStats {
        worker_id,
        total_tasks: tasks.len() as i64,
        done: count_status("done"),
        blocked: count_status("blocked"),
        cancelled: count_status("cancelled"),
        audit_approved,
        audit_rejected,
        approval_rate: ratio(audit_approved, audit_approved + audit_rejected),
        top_project: top_project(&projects),
        projects,
        avg_completion_hours,
    }
}

/// Project with the most tasks; ties go to the lexicographically first.
fn top_project(projects: &BTreeMap<String, i64>) -> Option<String> {
    let mut best: Option<(&String, i64)> = None;
    for (name, &count) in projects {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.clone())
}
