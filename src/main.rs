//! # chunkseek CLI
//!
//! Query a chunked document index from the command line, or serve the
//! retrieval tools over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! chunkseek --config ./config/chunkseek.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chunkseek semantic "<query>"` | Embedding-similarity search |
//! | `chunkseek lexical "<terms>"` | Keyword search with highlights |
//! | `chunkseek regex '<pattern>'` | Line-level regex search with context |
//! | `chunkseek get <file_name>` | Print a file reconstructed from its chunks |
//! | `chunkseek serve` | Start the HTTP tool server |
//!
//! ## Examples
//!
//! ```bash
//! chunkseek semantic "how are sessions invalidated" --top-k 5 --file-type rs
//! chunkseek lexical "token refresh" --operator AND --fuzzy
//! chunkseek regex 'fn\s+handle_\w+' --context 1 --json
//! chunkseek get src/auth/session.rs
//! chunkseek serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use chunkseek::search::{LexicalArgs, RegexArgs, SemanticArgs};
use chunkseek::services::Services;
use chunkseek::tools::ToolRegistry;
use chunkseek::{config, get, logging, search, server};
use chunkseek_core::store::Operator;

/// Semantic, lexical, and regex retrieval over a chunked document index.
#[derive(Parser)]
#[command(name = "chunkseek", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/chunkseek.toml")]
    config: PathBuf,

    /// Print the JSON response instead of a human-readable listing.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find chunks semantically similar to a query.
    Semantic {
        query: String,
        /// Maximum results (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        top_k: Option<i64>,
        /// Minimum normalized score in [0, 1].
        #[arg(long)]
        min_score: Option<f64>,
        /// Restrict to a file extension. Repeatable.
        #[arg(long = "file-type")]
        file_types: Vec<String>,
    },

    /// Keyword search over chunk content and file names.
    Lexical {
        query: String,
        /// Field to search, optionally boosted (`content^2`). Repeatable.
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Term combination: AND or OR.
        #[arg(long, value_parser = parse_operator)]
        operator: Option<Operator>,
        #[arg(long)]
        top_k: Option<i64>,
        /// Tolerate small typos.
        #[arg(long)]
        fuzzy: bool,
    },

    /// Find lines matching a regular expression.
    Regex {
        pattern: String,
        #[arg(long = "file-type")]
        file_types: Vec<String>,
        #[arg(long, short = 'i')]
        ignore_case: bool,
        /// Per-file match cap (1-1000).
        #[arg(long)]
        max_matches: Option<usize>,
        /// Context lines around each match (0-20).
        #[arg(long)]
        context: Option<usize>,
    },

    /// Print a file reconstructed from its chunks.
    Get {
        file_name: String,
        /// Also print the metadata of the file's first chunk.
        #[arg(long)]
        metadata: bool,
    },

    /// Start the HTTP tool server on `[server].bind`.
    Serve,
}

fn parse_operator(s: &str) -> Result<Operator, String> {
    s.parse().map_err(|e: chunkseek_core::RetrievalError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);
    let services = Services::from_config(cfg)?;

    match cli.command {
        Commands::Semantic {
            query,
            top_k,
            min_score,
            file_types,
        } => {
            let args = SemanticArgs {
                top_k,
                min_score,
                file_types,
            };
            search::run_semantic(&services, &query, args, cli.json).await?;
        }
        Commands::Lexical {
            query,
            fields,
            operator,
            top_k,
            fuzzy,
        } => {
            let args = LexicalArgs {
                fields,
                operator,
                top_k,
                fuzzy,
            };
            search::run_lexical(&services, &query, args, cli.json).await?;
        }
        Commands::Regex {
            pattern,
            file_types,
            ignore_case,
            max_matches,
            context,
        } => {
            let args = RegexArgs {
                file_types,
                ignore_case,
                max_matches,
                context,
            };
            search::run_regex(&services, &pattern, args, cli.json).await?;
        }
        Commands::Get {
            file_name,
            metadata,
        } => {
            get::run_get(&services, &file_name, metadata, cli.json).await?;
        }
        Commands::Serve => {
            let tools = Arc::new(ToolRegistry::with_builtins());
            server::run_server(Arc::new(services), tools).await?;
        }
    }

    Ok(())
}
