//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment overrides,
//! then validation. With no file at all the defaults match the container
//! layout (`/data/botsunichiroku.db`, `/data/search_index.db`).
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `BOTSUNICHIROKU_DB` | `db.source_path` |
//! | `INDEX_DB` | `db.index_path` |
//! | `BOTSU_TOKENIZER` | `tokenizer.provider` |
//! | `BOTSU_BIND` | `server.bind` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::tokenizer::PartOfSpeech;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Authoritative task ledger. Only ever opened read-only.
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,
    /// Full-text search store, rebuilt by `botsu build-index`.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            index_path: default_index_path(),
        }
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from("/data/botsunichiroku.db")
}
fn default_index_path() -> PathBuf {
    PathBuf::from("/data/search_index.db")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenizerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// MeCab executable for the `mecab` provider.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    /// Analysis endpoint for the `remote` provider.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Parts of speech kept in the index token stream.
    #[serde(default = "default_index_pos")]
    pub index_pos: Vec<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            binary: default_binary(),
            args: Vec::new(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            index_pos: default_index_pos(),
        }
    }
}

fn default_provider() -> String {
    "mecab".to_string()
}
fn default_binary() -> PathBuf {
    PathBuf::from("mecab")
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_index_pos() -> Vec<String> {
    vec![
        "noun".to_string(),
        "verb".to_string(),
        "adjective".to_string(),
    ]
}

impl TokenizerConfig {
    /// Resolves `index_pos` into part-of-speech classes.
    pub fn index_pos_set(&self) -> Result<Vec<PartOfSpeech>> {
        self.index_pos
            .iter()
            .map(|name| {
                PartOfSpeech::from_config_name(name)
                    .with_context(|| format!("tokenizer.index_pos: unknown class '{}'", name))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub search_default_limit: i64,
    #[serde(default = "default_search_max")]
    pub search_max_limit: i64,
    #[serde(default = "default_similar_limit")]
    pub similar_default_limit: i64,
    #[serde(default = "default_similar_max")]
    pub similar_max_limit: i64,
    /// Extra candidates fetched so self-exclusion still leaves `limit` rows.
    #[serde(default = "default_similar_margin")]
    pub similar_margin: i64,
    #[serde(default = "default_audit_limit")]
    pub audit_default_limit: i64,
    #[serde(default = "default_audit_max")]
    pub audit_max_limit: i64,
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_default_limit: default_search_limit(),
            search_max_limit: default_search_max(),
            similar_default_limit: default_similar_limit(),
            similar_max_limit: default_similar_max(),
            similar_margin: default_similar_margin(),
            audit_default_limit: default_audit_limit(),
            audit_max_limit: default_audit_max(),
            snippet_tokens: default_snippet_tokens(),
        }
    }
}

fn default_search_limit() -> i64 {
    10
}
fn default_search_max() -> i64 {
    50
}
fn default_similar_limit() -> i64 {
    5
}
fn default_similar_max() -> i64 {
    20
}
fn default_similar_margin() -> i64 {
    10
}
fn default_audit_limit() -> i64 {
    20
}
fn default_audit_max() -> i64 {
    100
}
fn default_snippet_tokens() -> i64 {
    32
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChecksConfig {
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            stale_days: default_stale_days(),
        }
    }
}

fn default_stale_days() -> i64 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

impl Config {
    /// Applies overrides from a variable lookup. `load_config` passes the
    /// process environment; tests pass a map.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = set("BOTSUNICHIROKU_DB") {
            self.db.source_path = PathBuf::from(path);
        }
        if let Some(path) = set("INDEX_DB") {
            self.db.index_path = PathBuf::from(path);
        }
        if let Some(provider) = set("BOTSU_TOKENIZER") {
            self.tokenizer.provider = provider;
        }
        if let Some(bind) = set("BOTSU_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.tokenizer.provider.as_str() {
            "mecab" | "simple" => {}
            "remote" => {
                if self.tokenizer.endpoint.is_none() {
                    anyhow::bail!("tokenizer.endpoint must be set when provider is 'remote'");
                }
            }
            other => anyhow::bail!(
                "Unknown tokenizer provider: '{}'. Must be mecab, remote, or simple.",
                other
            ),
        }

        if self.tokenizer.timeout_secs == 0 {
            anyhow::bail!("tokenizer.timeout_secs must be > 0");
        }
        if self.tokenizer.index_pos.is_empty() {
            anyhow::bail!("tokenizer.index_pos must name at least one class");
        }
        self.tokenizer.index_pos_set()?;

        let r = &self.retrieval;
        for (name, default, max) in [
            ("search", r.search_default_limit, r.search_max_limit),
            ("similar", r.similar_default_limit, r.similar_max_limit),
            ("audit", r.audit_default_limit, r.audit_max_limit),
        ] {
            if default < 1 || default > max {
                anyhow::bail!(
                    "retrieval.{}_default_limit must be in [1, {}_max_limit]",
                    name,
                    name
                );
            }
        }
        if r.similar_margin < 0 {
            anyhow::bail!("retrieval.similar_margin must be >= 0");
        }
        if !(1..=64).contains(&r.snippet_tokens) {
            anyhow::bail!("retrieval.snippet_tokens must be in [1, 64]");
        }

        if self.checks.stale_days < 1 {
            anyhow::bail!("checks.stale_days must be >= 1");
        }

        Ok(())
    }
}

/// Loads configuration from `path` (if given), applies environment
/// overrides and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
