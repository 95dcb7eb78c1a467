//! CLI command implementations.
//!
//! Each `run_*` function backs one `nexus` subcommand and prints its
//! result to stdout. Logs and progress go to stderr.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nexus_core::answer::answer;
use nexus_core::generate::GenerationParams;
use nexus_core::models::SearchRequest;
use nexus_core::search::retrieve;
use nexus_core::store::CorpusStore;

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generate::create_generator;
use crate::ingest::{IngestSummary, Ingestor};
use crate::migrate;
use crate::progress::ProgressMode;
use crate::sqlite_store::SqliteStore;

/// Connect and make sure the schema exists.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    migrate::migrate(&pool).await?;
    Ok(SqliteStore::new(pool))
}

/// `nexus ingest`: run one or more collections.
///
/// Fails (non-zero exit) if any collection hits a pre-flight error; files
/// that fail inside a run only show up in the summary.
pub async fn run_ingest(
    config: Config,
    names: Vec<String>,
    all: bool,
    progress: ProgressMode,
) -> Result<()> {
    let names: Vec<String> = if all {
        config.collections.keys().cloned().collect()
    } else {
        names
    };
    if names.is_empty() {
        bail!("No collections given. Name one or more collections, or pass --all.");
    }

    let config = Arc::new(config);
    let embedder = create_embedder(&config.embedding)?;
    let store = Arc::new(open_store(&config).await?);

    let cancel = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current file");
                cancel.store(true, Ordering::Relaxed);
            }
        })
    };

    let ingestor = Ingestor::new(Arc::clone(&config), store.clone(), embedder)
        .with_progress(progress.reporter());
    let results = ingestor.ingest_many(&names, &cancel).await;
    watcher.abort();

    let mut failed_runs = Vec::new();
    for (name, result) in results {
        match result {
            Ok(summary) => print_summary(&summary),
            Err(e) => {
                eprintln!("ingest {}: {}", name, e);
                failed_runs.push(name);
            }
        }
    }

    store.pool().close().await;

    if !failed_runs.is_empty() {
        bail!("Ingestion failed for: {}", failed_runs.join(", "));
    }
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    println!("ingest {}", summary.collection);
    println!("  scanned: {}", summary.scanned);
    println!("  processed: {}", summary.processed);
    println!("  skipped: {}", summary.skipped);
    println!("  duplicates: {}", summary.duplicates);
    println!("  failed: {}", summary.failed);
    println!("  chunks written: {}", summary.chunks);
    println!("  ocr applied: {}", summary.ocr_applied);
    if summary.cancelled {
        println!("  cancelled: true");
    }
    println!("ok");
}

/// `nexus collections`: list stored collections.
pub async fn run_collections(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let collections = store.list_collections().await?;

    if collections.is_empty() {
        println!("No collections.");
    }
    for c in &collections {
        let created = chrono::DateTime::from_timestamp(c.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{} (v{}){}",
            c.name,
            c.version,
            if c.active { "" } else { " [inactive]" }
        );
        println!("    model: {} ({} dims)", c.embed_model, c.embed_dim);
        println!("    chunking: {} / {} overlap", c.chunk_size, c.overlap);
        println!("    created: {}", created);
    }

    store.pool().close().await;
    Ok(())
}

/// `nexus docs <collection>`: list documents with status and chunk counts.
pub async fn run_docs(config: &Config, name: &str) -> Result<()> {
    let store = open_store(config).await?;
    let collection = match store.get_collection(name).await? {
        Some(c) => c,
        None => bail!("Collection '{}' has not been ingested yet.", name),
    };

    let docs = store.list_documents(collection.id).await?;
    let counts: std::collections::HashMap<i64, i64> =
        store.chunk_counts(collection.id).await?.into_iter().collect();

    if docs.is_empty() {
        println!("No documents.");
    }
    for doc in &docs {
        let chunks = counts.get(&doc.id).copied().unwrap_or(0);
        println!("[{}] {}", doc.status, doc.path);
        println!(
            "    chunks: {}  chars: {}  empty pages: {:.0}%{}",
            chunks,
            doc.extracted_chars,
            doc.empty_page_ratio * 100.0,
            if doc.ocr_applied { "  ocr" } else { "" }
        );
    }
    println!("{} documents", docs.len());

    store.pool().close().await;
    Ok(())
}

fn search_request(
    config: &Config,
    collections: Vec<String>,
    tags: Vec<String>,
    top_k: Option<usize>,
    min_score: Option<f64>,
) -> SearchRequest {
    let collections = if collections.is_empty() {
        config.collections.keys().cloned().collect()
    } else {
        collections
    };
    let mut request = SearchRequest::new(collections, top_k.unwrap_or(config.retrieval.top_k));
    request.tags = tags;
    request.min_score = min_score.or(config.retrieval.min_score);
    request
}

/// `nexus search`: similarity search over one or more collections.
pub async fn run_search(
    config: &Config,
    query: &str,
    collections: Vec<String>,
    tags: Vec<String>,
    top_k: Option<usize>,
    min_score: Option<f64>,
) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let store = open_store(config).await?;
    let request = search_request(config, collections, tags, top_k, min_score);

    let results = retrieve(&store, embedder.as_ref(), query, &request).await?;
    if results.is_empty() {
        println!("No results.");
    }
    for (i, r) in results.iter().enumerate() {
        let excerpt: String = r.content.chars().take(240).collect();
        println!("{}. [{:.3}] {} / {}#page={}", i + 1, r.score, r.collection, r.path, r.page);
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
        println!();
    }

    store.pool().close().await;
    Ok(())
}

/// `nexus ask`: retrieve, then generate a cited answer.
pub async fn run_ask(
    config: &Config,
    query: &str,
    collections: Vec<String>,
    tags: Vec<String>,
    top_k: Option<usize>,
) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let generator = create_generator(&config.generation)?;
    let store = open_store(config).await?;
    let request = search_request(config, collections, tags, top_k, None);
    let params = GenerationParams::from(&config.generation);

    let result = answer(
        &store,
        embedder.as_ref(),
        generator.as_ref(),
        query,
        &request,
        &params,
    )
    .await?;

    println!("{}", result.text);
    if !result.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, s) in result.sources.iter().enumerate() {
            println!("  [{}] {}#page={} ({:.3})", i + 1, s.path, s.page, s.score);
        }
    }

    store.pool().close().await;
    Ok(())
}
