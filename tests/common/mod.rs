//! Shared fixture: a small task ledger with known inconsistencies.
//!
//! | Record | Why it is there |
//! |--------|-----------------|
//! | `cmd_100` | done, two audited subtasks, matches "watchdog timer" |
//! | `cmd_101` | pending 10 days, every subtask done |
//! | `cmd_102` | pending 3 days, mixed subtasks |
//! | `cmd_103` | instruction "alpha beta gamma", report covers two of three |
//! | `subtask_203` | done without a report |
//! | `subtask_207` | assigned 10 days ago |

#![allow(dead_code)]

use botsunichiroku_search::config::Config;
use botsunichiroku_search::tokenizer::{PartOfSpeech, SimpleTokenizer, TextAnalyzer};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const LEDGER_SCHEMA: &[&str] = &[
    r#"CREATE TABLE commands (
        id TEXT PRIMARY KEY,
        timestamp TEXT,
        command TEXT NOT NULL,
        project TEXT,
        priority TEXT,
        status TEXT,
        assigned_karo TEXT,
        details TEXT,
        created_at TEXT,
        completed_at TEXT
    )"#,
    r#"CREATE TABLE subtasks (
        id TEXT PRIMARY KEY,
        parent_cmd TEXT,
        worker_id TEXT,
        project TEXT,
        description TEXT NOT NULL,
        target_path TEXT,
        status TEXT,
        wave INTEGER,
        notes TEXT,
        assigned_at TEXT,
        completed_at TEXT,
        needs_audit INTEGER DEFAULT 0,
        audit_status TEXT
    )"#,
    r#"CREATE TABLE reports (
        id INTEGER PRIMARY KEY,
        worker_id TEXT,
        task_id TEXT,
        timestamp TEXT,
        status TEXT,
        summary TEXT,
        completed_steps TEXT,
        blocking_reason TEXT,
        findings TEXT,
        next_actions TEXT,
        files_modified TEXT,
        notes TEXT,
        skill_candidate_name TEXT,
        skill_candidate_desc TEXT
    )"#,
];

const DASHBOARD_SCHEMA: &str = r#"CREATE TABLE dashboard_entries (
    id INTEGER PRIMARY KEY,
    cmd_id TEXT,
    section TEXT,
    content TEXT,
    status TEXT,
    tags TEXT,
    created_at TEXT
)"#;

pub struct TestEnv {
    pub tmp: TempDir,
    pub config: Config,
    pub now: DateTime<Utc>,
}

impl TestEnv {
    pub fn source_path(&self) -> &Path {
        &self.config.db.source_path
    }

    pub fn index_path(&self) -> &Path {
        &self.config.db.index_path
    }
}

pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.db.source_path = root.join("botsunichiroku.db");
    config.db.index_path = root.join("index").join("search_index.db");
    config.tokenizer.provider = "simple".to_string();
    config.server.bind = "127.0.0.1:0".to_string();
    config
}

pub fn analyzer() -> TextAnalyzer {
    TextAnalyzer::new(
        Arc::new(SimpleTokenizer),
        [PartOfSpeech::Noun, PartOfSpeech::Verb, PartOfSpeech::Adjective],
    )
}

/// Temp dir with the fixture ledger written; the index is not built.
pub async fn setup(with_dashboard: bool) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let now = Utc::now();
    create_ledger(&config.db.source_path, now, with_dashboard).await;
    TestEnv { tmp, config, now }
}

fn days_ago(now: DateTime<Utc>, days: i64) -> String {
    (now - Duration::days(days)).to_rfc3339_opts(SecondsFormat::Secs, false)
}

async fn open_writable(path: &Path) -> SqliteConnection {
    SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap()
}

pub async fn create_ledger(path: &Path, now: DateTime<Utc>, with_dashboard: bool) {
    let mut conn = open_writable(path).await;
    for ddl in LEDGER_SCHEMA {
        sqlx::query(ddl).execute(&mut conn).await.unwrap();
    }

    let commands: [(&str, &str, Option<&str>, &str, &str, String); 4] = [
        (
            "cmd_100",
            "Implement watchdog timer",
            Some("Use hardware watchdog reset"),
            "shogun",
            "done",
            days_ago(now, 20),
        ),
        ("cmd_101", "Build search engine", None, "arsprout", "pending", days_ago(now, 10)),
        ("cmd_102", "Old pending cleanup", None, "shogun", "pending", days_ago(now, 3)),
        ("cmd_103", "alpha beta gamma", None, "shogun", "done", days_ago(now, 1)),
    ];
    for (id, command, details, project, status, created_at) in &commands {
        sqlx::query(
            "INSERT INTO commands (id, command, details, project, status, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(command)
        .bind(details)
        .bind(project)
        .bind(status)
        .bind(created_at)
        .execute(&mut conn)
        .await
        .unwrap();
    }

    struct Subtask {
        id: &'static str,
        parent: &'static str,
        worker: &'static str,
        project: Option<&'static str>,
        description: &'static str,
        status: &'static str,
        notes: Option<&'static str>,
        assigned_at: Option<String>,
        completed_at: Option<String>,
        needs_audit: i64,
        audit_status: Option<&'static str>,
    }

    fn plain(
        id: &'static str,
        parent: &'static str,
        worker: &'static str,
        description: &'static str,
        status: &'static str,
    ) -> Subtask {
        Subtask {
            id,
            parent,
            worker,
            project: None,
            description,
            status,
            notes: None,
            assigned_at: None,
            completed_at: None,
            needs_audit: 0,
            audit_status: None,
        }
    }

    let subtasks = vec![
        Subtask {
            project: Some("shogun"),
            notes: Some("hardware watchdog"),
            assigned_at: Some("2026-02-01T10:00:00".into()),
            completed_at: Some("2026-02-01T14:00:00".into()),
            needs_audit: 1,
            audit_status: Some("done"),
            ..plain("subtask_200", "cmd_100", "ashigaru1", "watchdog timer firmware", "done")
        },
        Subtask {
            project: Some("shogun"),
            assigned_at: Some("2026-02-01T10:00:00".into()),
            completed_at: Some("2026-02-01T12:00:00".into()),
            needs_audit: 1,
            audit_status: Some("done"),
            ..plain("subtask_201", "cmd_100", "ashigaru1", "watchdog timer tests", "done")
        },
        Subtask {
            project: Some("arsprout"),
            assigned_at: Some("2026-02-02T10:00:00".into()),
            completed_at: Some("2026-02-02T16:00:00".into()),
            needs_audit: 1,
            audit_status: Some("rejected"),
            ..plain("subtask_202", "cmd_101", "ashigaru1", "search engine indexer", "done")
        },
        plain("subtask_203", "cmd_101", "ashigaru2", "search api server", "done"),
        plain("subtask_204", "cmd_102", "ashigaru2", "cleanup scripts", "done"),
        plain("subtask_205", "cmd_102", "ashigaru3", "cleanup docs", "pending"),
        plain("subtask_206", "cmd_103", "ashigaru2", "coverage task", "done"),
        Subtask {
            assigned_at: Some(days_ago(now, 10)),
            ..plain("subtask_207", "cmd_102", "ashigaru3", "stale assignment", "assigned")
        },
        Subtask {
            assigned_at: Some(days_ago(now, 1)),
            ..plain("subtask_208", "cmd_102", "ashigaru3", "fresh assignment", "assigned")
        },
    ];
    for s in &subtasks {
        sqlx::query(
            r#"INSERT INTO subtasks
               (id, parent_cmd, worker_id, project, description, status, notes,
                assigned_at, completed_at, needs_audit, audit_status)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(s.id)
        .bind(s.parent)
        .bind(s.worker)
        .bind(s.project)
        .bind(s.description)
        .bind(s.status)
        .bind(s.notes)
        .bind(&s.assigned_at)
        .bind(&s.completed_at)
        .bind(s.needs_audit)
        .bind(s.audit_status)
        .execute(&mut conn)
        .await
        .unwrap();
    }

    // ids 3 and 4 are in reverse timestamp order on purpose
    let reports: [(i64, &str, &str, &str, Option<&str>, &str); 6] = [
        (1, "ashigaru1", "subtask_200", "watchdog timer implemented", Some("reset verified"), "2026-02-01T14:00:00"),
        (2, "ashigaru1", "subtask_201", "watchdog tests written", None, "2026-02-01T12:00:00"),
        (3, "ashigaru1", "subtask_202", "indexer finished", None, "2026-02-02T16:00:00"),
        (4, "ashigaru1", "subtask_202", "indexer draft", None, "2026-02-02T15:00:00"),
        (5, "ashigaru2", "subtask_204", "cleanup scripts merged", None, "2026-02-03T09:00:00"),
        (6, "ashigaru2", "subtask_206", "alpha gamma done", None, "2026-02-04T09:00:00"),
    ];
    for (id, worker, task, summary, findings, timestamp) in &reports {
        sqlx::query(
            "INSERT INTO reports (id, worker_id, task_id, status, summary, findings, timestamp) VALUES (?, ?, ?, 'done', ?, ?, ?)",
        )
        .bind(id)
        .bind(worker)
        .bind(task)
        .bind(summary)
        .bind(findings)
        .bind(timestamp)
        .execute(&mut conn)
        .await
        .unwrap();
    }

    if with_dashboard {
        sqlx::query(DASHBOARD_SCHEMA).execute(&mut conn).await.unwrap();
        let entries: [(Option<&str>, &str, &str, &str, &str); 2] = [
            (Some("cmd_100"), "results", "watchdog rollout complete", "done", "watchdog,firmware"),
            (None, "decision", "migrate dashboards", "resolved", "dashboard"),
        ];
        for (cmd_id, section, content, status, tags) in &entries {
            sqlx::query(
                "INSERT INTO dashboard_entries (cmd_id, section, content, status, tags, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(cmd_id)
            .bind(section)
            .bind(content)
            .bind(status)
            .bind(tags)
            .bind(days_ago(now, 2))
            .execute(&mut conn)
            .await
            .unwrap();
        }
    }

    conn.close().await.unwrap();
}

/// Rows currently in the search store, as `(source_type, source_id)`.
pub async fn indexed_ids(index_path: &Path) -> Vec<(String, String)> {
    let mut conn = SqliteConnectOptions::new()
        .filename(index_path)
        .read_only(true)
        .connect()
        .await
        .unwrap();
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT source_type, source_id FROM search_index ORDER BY source_type, source_id")
            .fetch_all(&mut conn)
            .await
            .unwrap();
    conn.close().await.unwrap();
    rows
}

pub fn botsu_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("botsu");
    path
}

pub fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}
