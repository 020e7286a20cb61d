//! # Botsunichiroku search CLI (`botsu`)
//!
//! Builds the search index from the task ledger and answers queries against
//! it, either once from the command line or as an HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! botsu [--config ./botsu.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `botsu build-index` | Rebuild `search_index.db` from `botsunichiroku.db` |
//! | `botsu serve` | Start the HTTP API |
//! | `botsu search "<query>"` | Full-text search |
//! | `botsu similar <subtask_id>` | Documents similar to a subtask |
//! | `botsu check orphans` | Ledger consistency checks |
//! | `botsu check coverage <cmd_id>` | Report coverage of a command |
//! | `botsu audit` | Audit history |
//! | `botsu workers` | Per-worker statistics |
//! | `botsu health` | Store and tokenizer status |
//!
//! Query commands print the same JSON the HTTP API returns. Log output goes
//! to stderr and is filtered with `RUST_LOG`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use botsunichiroku_search::{checks, config, health, index, search, server, stats, tokenizer};

/// Search and consistency auditing for the botsunichiroku task ledger.
#[derive(Parser)]
#[command(
    name = "botsu",
    about = "Search and consistency auditing for the botsunichiroku task ledger",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional; built-in defaults and environment variables
    /// (`BOTSUNICHIROKU_DB`, `INDEX_DB`, `BOTSU_TOKENIZER`, `BOTSU_BIND`)
    /// apply without one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the search index from the task ledger.
    ///
    /// Deletes any existing index first, so running it twice yields the
    /// same store.
    BuildIndex,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Search indexed documents; every query token must match.
    Search {
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Find documents sharing keywords with a subtask's description.
    Similar {
        subtask_id: String,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Ledger consistency checks.
    Check {
        #[command(subcommand)]
        check: CheckCommand,
    },

    /// Audit history of audit-required subtasks.
    Audit {
        #[arg(long)]
        worker: Option<String>,

        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },

    /// Per-worker task statistics.
    Workers {
        #[arg(long)]
        worker: Option<String>,
    },

    /// Report store and tokenizer status.
    Health,
}

#[derive(Subcommand)]
enum CheckCommand {
    /// Commands and subtasks whose state looks abandoned or inconsistent.
    Orphans,

    /// How many instruction keywords of a command reappear in its reports.
    Coverage { cmd_id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;
    let analyzer = tokenizer::TextAnalyzer::from_config(&cfg.tokenizer)?;

    match cli.command {
        Commands::BuildIndex => {
            index::run_build_index(&cfg, &analyzer).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg, Arc::new(analyzer)).await?;
        }
        Commands::Search { query, limit } => {
            print_json(&search::search(&cfg, &analyzer, &query, limit).await?)?;
        }
        Commands::Similar { subtask_id, limit } => {
            print_json(&search::search_similar(&cfg, &analyzer, &subtask_id, limit).await?)?;
        }
        Commands::Check { check } => match check {
            CheckCommand::Orphans => {
                print_json(&checks::check_orphans(&cfg, chrono::Utc::now()).await?)?;
            }
            CheckCommand::Coverage { cmd_id } => {
                print_json(&checks::check_coverage(&cfg, &analyzer, &cmd_id).await?)?;
            }
        },
        Commands::Audit {
            worker,
            project,
            limit,
        } => {
            let history =
                stats::audit_history(&cfg, worker.as_deref(), project.as_deref(), limit).await?;
            print_json(&history)?;
        }
        Commands::Workers { worker } => {
            print_json(&stats::worker_stats(&cfg, worker.as_deref()).await?)?;
        }
        Commands::Health => {
            print_json(&health::health(&cfg, &analyzer).await)?;
        }
    }

    Ok(())
}
