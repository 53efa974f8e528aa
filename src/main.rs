//! # docsearch CLI
//!
//! ## Usage
//!
//! ```bash
//! docsearch --config ./config/docsearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsearch serve` | Start the HTTP API |
//! | `docsearch upload <path>` | Store a file as a document |
//! | `docsearch parse <name>` | Convert an upload to markdown |
//! | `docsearch ingest <name>` | Index a parsed document |
//! | `docsearch search "<query>"` | Hybrid keyword + vector search |
//! | `docsearch list` | List documents and their state |
//! | `docsearch delete <name>` | Delete a document everywhere |
//! | `docsearch summarize <name>` | Summarize a parsed document |
//! | `docsearch questions <name>` | Generate questions about a document |
//! | `docsearch faq <name>` | Generate an FAQ for a document |
//!
//! ## Examples
//!
//! ```bash
//! docsearch upload ./contracts/msa.pdf
//! docsearch parse msa.pdf
//! docsearch ingest msa.pdf
//! docsearch search "termination notice period" --top-k 3 --answer
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsearch::commands;
use docsearch::config;
use docsearch::server;
use docsearch::services::{SearchQuery, Services};

/// docsearch: document processing with hybrid keyword + vector retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsearch.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsearch",
    about = "Document processing and hybrid keyword + vector search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Upload a file. The document name defaults to the file name.
    Upload {
        path: PathBuf,
        /// Store under this name instead.
        #[arg(long)]
        name: Option<String>,
    },

    /// Parse an uploaded document into markdown.
    Parse { name: String },

    /// Build the keyword record and vectors for a parsed document.
    Ingest { name: String },

    /// Search ingested documents.
    Search {
        query: String,

        /// Number of results (defaults to `[retrieval].default_top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict results to this document. Repeatable.
        #[arg(long = "document")]
        documents: Vec<String>,

        /// Show raw scores and engine diagnostics.
        #[arg(long)]
        debug: bool,

        /// Generate an answer from the top passages.
        #[arg(long)]
        answer: bool,
    },

    /// List documents.
    List,

    /// Delete a document's upload, parsed text, keyword record and vectors.
    Delete { name: String },

    /// Summarize a parsed document.
    Summarize { name: String },

    /// Generate questions answerable from a parsed document.
    Questions {
        name: String,
        #[arg(long)]
        count: Option<usize>,
    },

    /// Generate FAQ items for a parsed document.
    Faq {
        name: String,
        #[arg(long)]
        count: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    let services = Services::from_config(&cfg)?;

    match cli.command {
        Commands::Serve => server::run_server(services, &cfg.server.bind).await?,
        Commands::Upload { path, name } => commands::run_upload(&services, &path, name).await?,
        Commands::Parse { name } => commands::run_parse(&services, &name).await?,
        Commands::Ingest { name } => commands::run_ingest(&services, &name).await?,
        Commands::Search {
            query,
            top_k,
            documents,
            debug,
            answer,
        } => {
            let query = SearchQuery {
                query,
                top_k,
                documents,
                debug,
                answer,
            };
            commands::run_search(&services, query).await?;
        }
        Commands::List => commands::run_list(&services).await?,
        Commands::Delete { name } => commands::run_delete(&services, &name).await?,
        Commands::Summarize { name } => commands::run_summarize(&services, &name).await?,
        Commands::Questions { name, count } => {
            commands::run_questions(&services, &name, count).await?
        }
        Commands::Faq { name, count } => commands::run_faq(&services, &name, count).await?,
    }

    Ok(())
}
