//! # Nexus CLI (`nexus`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nexus init` | Create the SQLite database and schema |
//! | `nexus ingest <collection>...` | Ingest one or more configured collections |
//! | `nexus ingest --all` | Ingest every configured collection |
//! | `nexus collections` | List stored collections |
//! | `nexus docs <collection>` | List a collection's documents |
//! | `nexus search "<query>"` | Similarity search |
//! | `nexus ask "<query>"` | Grounded answer with sources |
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `nexus=info`).

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexus::commands;
use nexus::config::{self, DEFAULT_CONFIG_PATH};
use nexus::migrate;
use nexus::progress::ProgressMode;

/// Nexus: PDF ingestion and grounded retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nexus.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "nexus", version, about = "PDF ingestion and grounded retrieval")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest PDFs for one or more collections.
    ///
    /// Unchanged files are skipped, duplicate content is recorded without
    /// chunks, and files that fail are counted without stopping the run.
    Ingest {
        /// Collection names from `[collections.<name>]`.
        collections: Vec<String>,

        /// Ingest every configured collection.
        #[arg(long, conflicts_with = "collections")]
        all: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// List stored collections.
    Collections,

    /// List documents in a collection.
    Docs {
        collection: String,
    },

    /// Search chunks by similarity.
    Search {
        query: String,

        /// Collection to search (repeatable). Defaults to all configured collections.
        #[arg(long = "collection", short = 'c')]
        collections: Vec<String>,

        /// Only documents carrying this tag (repeatable; any match).
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        min_score: Option<f64>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        query: String,

        #[arg(long = "collection", short = 'c')]
        collections: Vec<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            collections,
            all,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_ingest(cfg, collections, all, mode).await?;
        }
        Commands::Collections => {
            commands::run_collections(&cfg).await?;
        }
        Commands::Docs { collection } => {
            commands::run_docs(&cfg, &collection).await?;
        }
        Commands::Search {
            query,
            collections,
            tags,
            top_k,
            min_score,
        } => {
            commands::run_search(&cfg, &query, collections, tags, top_k, min_score).await?;
        }
        Commands::Ask {
            query,
            collections,
            tags,
            top_k,
        } => {
            commands::run_ask(&cfg, &query, collections, tags, top_k).await?;
        }
    }

    Ok(())
}
