//! HTTP API tests: spawn the server on a free port and call it with reqwest.

mod common;

use std::sync::Arc;

use botsunichiroku_search::index::build_index;
use botsunichiroku_search::server::run_server;
use common::{analyzer, find_free_port, setup, wait_for_server, TestEnv};
use serde_json::Value;

struct Running {
    env: TestEnv,
    base: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl Running {
    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap();
        (status, body)
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start(build: bool) -> Running {
    let mut env = setup(true).await;
    if build {
        build_index(&env.config, &analyzer()).await.unwrap();
    }

    let port = find_free_port();
    env.config.server.bind = format!("127.0.0.1:{}", port);

    let cfg = env.config.clone();
    let handle = tokio::spawn(async move {
        run_server(&cfg, Arc::new(analyzer())).await.ok();
    });
    wait_for_server(port).await;

    Running {
        env,
        base: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
        handle,
    }
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or("")
}

#[tokio::test]
async fn test_search_endpoint() {
    let srv = start(true).await;

    let (status, body) = srv.get("/search?q=watchdog%20timer&limit=3").await;
    assert_eq!(status, 200);
    assert_eq!(body["query"], "watchdog timer");
    assert_eq!(body["total_hits"], 4);
    assert_eq!(body["results"].as_array().unwrap().len(), 3);
    assert_eq!(body["results"][0]["rank"], 1);
}

#[tokio::test]
async fn test_search_bad_requests() {
    let srv = start(true).await;

    for path in [
        "/search",
        "/search?q=",
        "/search?q=%21%21%21",
        "/search?q=watchdog&limit=0",
        "/search?q=watchdog&limit=51",
        "/search?q=watchdog&limit=many",
    ] {
        let (status, body) = srv.get(path).await;
        assert_eq!(status, 400, "{} -> {}", path, body);
        assert_eq!(error_code(&body), "bad_request");
        assert!(body["error"]["message"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_search_without_index_is_503() {
    let srv = start(false).await;

    let (status, body) = srv.get("/search?q=watchdog").await;
    assert_eq!(status, 503);
    assert_eq!(error_code(&body), "store_unavailable");

    // other endpoints only need the ledger
    let (status, _) = srv.get("/check/orphans").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_similar_endpoint() {
    let srv = start(true).await;

    let (status, body) = srv.get("/search/similar?subtask_id=subtask_200").await;
    assert_eq!(status, 200);
    let results = body["results"].as_array().unwrap();
    assert!(results.iter().all(|r| r["source_id"] != "subtask_200"));
    let sibling = results
        .iter()
        .find(|r| r["source_id"] == "subtask_201")
        .unwrap();
    assert_eq!(sibling["audit_status"], "done");

    let (status, body) = srv.get("/search/similar?subtask_id=subtask_999").await;
    assert_eq!(status, 404);
    assert_eq!(error_code(&body), "not_found");

    let (status, _) = srv.get("/search/similar?subtask_id=").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_check_endpoints() {
    let srv = start(false).await;

    let (status, body) = srv.get("/check/orphans").await;
    assert_eq!(status, 200);
    assert_eq!(body["total_issues"], 4);
    assert_eq!(body["checks"][3]["items"][0]["subtask_id"], "subtask_203");

    let (status, body) = srv.get("/check/coverage?cmd_id=cmd_103").await;
    assert_eq!(status, 200);
    assert_eq!(body["missing_keywords"], serde_json::json!(["beta"]));
    assert_eq!(body["coverage_ratio"], 0.67);

    let (status, _) = srv.get("/check/coverage?cmd_id=cmd_999").await;
    assert_eq!(status, 404);

    let (status, _) = srv.get("/check/coverage").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_stats_endpoints() {
    let srv = start(false).await;

    let (status, body) = srv.get("/audit/history?worker_id=&project=&limit=2").await;
    assert_eq!(status, 200);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert_eq!(body["stats"]["total"], 3);

    let (status, _) = srv.get("/audit/history?limit=101").await;
    assert_eq!(status, 400);

    let (status, body) = srv.get("/worker/stats?worker_id=ashigaru1").await;
    assert_eq!(status, 200);
    let workers = body["workers"].as_array().unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0]["approval_rate"], 0.67);
    assert_eq!(workers[0]["avg_completion_hours"], 4.0);

    let (status, body) = srv.get("/worker/stats?worker_id=").await;
    assert_eq!(status, 200);
    assert_eq!(body["workers"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_health_endpoint() {
    let srv = start(true).await;

    let (status, body) = srv.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["index_record_count"], 21);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    std::fs::remove_file(srv.env.index_path()).unwrap();
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["index_db_exists"], false);

    let (status, _) = srv.get("/search?q=watchdog").await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_missing_ledger_is_503() {
    let srv = start(false).await;
    std::fs::remove_file(srv.env.source_path()).unwrap();

    let (status, body) = srv.get("/worker/stats").await;
    assert_eq!(status, 503);
    assert_eq!(error_code(&body), "store_unavailable");

    let (status, body) = srv.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["botsunichiroku_db_exists"], false);
}
