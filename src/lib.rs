//! # Botsunichiroku Search
//!
//! Search and consistency auditing for a multi-agent task ledger.
//!
//! The ledger (`botsunichiroku.db`) records commands, the subtasks they are
//! split into, worker reports, and dashboard entries. This crate rebuilds a
//! Japanese-aware FTS5 index from it and answers read-only queries: keyword
//! search, similar-task lookup, orphan and coverage checks, and audit and
//! worker statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌────────────┐   ┌─────────────────┐
//! │ botsunichiroku.db│──▶│ Tokenizer  │──▶│ search_index.db │
//! │  (read-only)     │   │ MeCab/HTTP │   │  FTS5           │
//! └────────┬─────────┘   └────────────┘   └────────┬────────┘
//!          │                                       │
//!          └──────────────┬────────────────────────┘
//!                         ▼
//!                 ┌───────────────┐
//!                 │ Query service │
//!                 └──────┬────────┘
//!                ┌───────┴───────┐
//!                ▼               ▼
//!          ┌──────────┐    ┌──────────┐
//!          │   CLI    │    │   HTTP   │
//!          │ (botsu)  │    │  (axum)  │
//!          └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! botsu build-index                 # rebuild search_index.db
//! botsu search "ウォッチドッグ タイマー"
//! botsu check orphans
//! botsu serve                       # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`tokenizer`] | Morphological analysis behind the [`tokenizer::Tokenizer`] trait |
//! | [`models`] | Source types and index documents |
//! | [`schema`] | Search-store table contract |
//! | [`db`] | SQLite connections |
//! | [`index`] | Index builder |
//! | [`search`] | Full-text and similar-task search |
//! | [`checks`] | Orphan and coverage checks |
//! | [`stats`] | Audit history and worker statistics |
//! | [`health`] | Service health |
//! | [`error`] | Query error taxonomy |
//! | [`server`] | HTTP API |

pub mod checks;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod index;
pub mod models;
pub mod schema;
pub mod search;
pub mod server;
pub mod stats;
pub mod tokenizer;
