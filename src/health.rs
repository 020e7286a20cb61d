//! Service health.
//!
//! Never fails: every probe that errors is reported as a degraded field
//! instead.

use serde::Serialize;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};

use crate::config::Config;
use crate::schema;
use crate::tokenizer::TextAnalyzer;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub index_db_exists: bool,
    pub index_record_count: i64,
    pub botsunichiroku_db_exists: bool,
    pub mecab_available: bool,
    pub tokenizer: String,
}

pub async fn health(config: &Config, analyzer: &TextAnalyzer) -> HealthReport {
    let index_db_exists = config.db.index_path.exists();
    let botsunichiroku_db_exists = config.db.source_path.exists();

    let index_record_count = if index_db_exists {
        match index_record_count(config).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "search index unreadable");
                0
            }
        }
    } else {
        0
    };

    let mecab_available = match analyzer.probe().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(tokenizer = analyzer.tokenizer_name(), error = %e, "tokenizer probe failed");
            false
        }
    };

    let status = if index_db_exists && botsunichiroku_db_exists && mecab_available {
        "ok"
    } else {
        "degraded"
    };

    HealthReport {
        status,
        version: env!("CARGO_PKG_VERSION"),
        index_db_exists,
        index_record_count,
        botsunichiroku_db_exists,
        mecab_available,
        tokenizer: analyzer.tokenizer_name().to_string(),
    }
}

async fn index_record_count(config: &Config) -> Result<i64, sqlx::Error> {
    let mut conn = SqliteConnectOptions::new()
        .filename(&config.db.index_path)
        .read_only(true)
        .connect()
        .await?;
    let count = schema::count(&mut conn).await?;
    conn.close().await?;
    Ok(count)
}
