//! Read-only JSON HTTP API over the search store and the task ledger.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search?q=&limit=` | Full-text search (all tokens must match) |
//! | `GET`  | `/search/similar?subtask_id=&limit=` | Documents sharing keywords with a subtask |
//! | `GET`  | `/check/orphans` | Ledger consistency checks |
//! | `GET`  | `/check/coverage?cmd_id=` | Instruction keywords covered by reports |
//! | `GET`  | `/audit/history?worker_id=&project=&limit=` | Audit outcomes |
//! | `GET`  | `/worker/stats?worker_id=` | Per-worker statistics |
//! | `GET`  | `/health` | Store and tokenizer status |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `store_unavailable` (503),
//! `tokenizer_unavailable` (503), `internal` (500).
//!
//! Empty query-string parameters count as absent.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::checks::{self, CoverageReport, OrphanReport};
use crate::config::Config;
use crate::error::QueryError;
use crate::health::{self, HealthReport};
use crate::search::{self, SearchResponse, SimilarResponse};
use crate::stats::{self, AuditHistory, WorkerStatsResponse};
use crate::tokenizer::TextAnalyzer;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub analyzer: Arc<TextAnalyzer>,
}

/// Builds the router with every endpoint, CORS, and request tracing.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search", get(handle_search))
        .route("/search/similar", get(handle_similar))
        .route("/check/orphans", get(handle_orphans))
        .route("/check/coverage", get(handle_coverage))
        .route("/audit/history", get(handle_audit_history))
        .route("/worker/stats", get(handle_worker_stats))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `[server].bind` and serves until the process is terminated.
pub async fn run_server(config: &Config, analyzer: Arc<TextAnalyzer>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        analyzer,
    };

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %bind_addr,
        source = %config.db.source_path.display(),
        index = %config.db.index_path.display(),
        tokenizer = state.analyzer.tokenizer_name(),
        "server listening"
    );
    axum::serve(listener, router(state)).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            _ if err.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Drops empty parameters so `?worker_id=` behaves like no filter.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    present(value).ok_or_else(|| bad_request(format!("{} is required", name)))
}

/// `limit` arrives as a string so that `?limit=` and `?limit=abc` can be
/// told apart from a missing value.
fn parse_limit(value: Option<String>) -> Result<Option<i64>, AppError> {
    present(value)
        .map(|v| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| bad_request(format!("limit must be an integer, got {:?}", v)))
        })
        .transpose()
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = required(params.q, "q")?;
    let limit = parse_limit(params.limit)?;
    let response = search::search(&state.config, &state.analyzer, &query, limit).await?;
    Ok(Json(response))
}

// ============ GET /search/similar ============

#[derive(Deserialize)]
struct SimilarParams {
    subtask_id: Option<String>,
    limit: Option<String>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Result<Json<SimilarResponse>, AppError> {
    let subtask_id = required(params.subtask_id, "subtask_id")?;
    let limit = parse_limit(params.limit)?;
    let response = search::search_similar(&state.config, &state.analyzer, &subtask_id, limit).await?;
    Ok(Json(response))
}

// ============ GET /check/orphans ============

async fn handle_orphans(State(state): State<AppState>) -> Result<Json<OrphanReport>, AppError> {
    let report = checks::check_orphans(&state.config, chrono::Utc::now()).await?;
    Ok(Json(report))
}

// ============ GET /check/coverage ============

#[derive(Deserialize)]
struct CoverageParams {
    cmd_id: Option<String>,
}

async fn handle_coverage(
    State(state): State<AppState>,
    Query(params): Query<CoverageParams>,
) -> Result<Json<CoverageReport>, AppError> {
    let cmd_id = required(params.cmd_id, "cmd_id")?;
    let report = checks::check_coverage(&state.config, &state.analyzer, &cmd_id).await?;
    Ok(Json(report))
}

// ============ GET /audit/history ============

#[derive(Deserialize)]
struct AuditParams {
    worker_id: Option<String>,
    project: Option<String>,
    limit: Option<String>,
}

async fn handle_audit_history(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Result<Json<AuditHistory>, AppError> {
    let worker_id = present(params.worker_id);
    let project = present(params.project);
    let limit = parse_limit(params.limit)?;
    let history =
        stats::audit_history(&state.config, worker_id.as_deref(), project.as_deref(), limit).await?;
    Ok(Json(history))
}

// ============ GET /worker/stats ============

#[derive(Deserialize)]
struct WorkerParams {
    worker_id: Option<String>,
}

async fn handle_worker_stats(
    State(state): State<AppState>,
    Query(params): Query<WorkerParams>,
) -> Result<Json<WorkerStatsResponse>, AppError> {
    let worker_id = present(params.worker_id);
    let response = stats::worker_stats(&state.config, worker_id.as_deref()).await?;
    Ok(Json(response))
}

// ============ GET /health ============

async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(health::health(&state.config, &state.analyzer).await)
}
