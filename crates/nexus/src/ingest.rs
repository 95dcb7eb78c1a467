//! Ingestion pipeline orchestration.
//!
//! Drives one collection run: discovery → pre-ingest hook → per-file
//! processing → post-ingest hook. Each file ends in a [`FileOutcome`]:
//!
//! | Outcome | When |
//! |---------|------|
//! | `Unchanged` | A document with the same path, hash, and mtime exists |
//! | `Duplicate` | Another path in the collection has the same hash |
//! | `Ingested` | Extracted (with OCR fallback), chunked, embedded, committed |
//! | `Failed` | Any error while handling the file |
//!
//! Errors are contained at the file boundary: a failing file is logged and
//! counted, and the run moves on. Only pre-flight problems (unknown
//! collection, dimension mismatch) abort a run, before any file is touched.
//!
//! Every run satisfies
//! `scanned == processed + skipped + duplicates + failed`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;

use nexus_core::chunk::chunk_text;
use nexus_core::embedding::Embedder;
use nexus_core::models::{
    Collection, CollectionSpec, DiscoveredFile, DocumentStatus, DocumentUpsert, NewChunk, PageText,
};
use nexus_core::quality::{assess, QualityReport};
use nexus_core::store::CorpusStore;

use crate::config::Config;
use crate::discover::discover;
use crate::extract::{PdfExtractor, TextExtractor};
use crate::hooks::HookExecutor;
use crate::ocr::{OcrEngine, OcrMyPdf, OcrSettings};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

/// Run-level failures. Per-file problems never surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("embedding provider is disabled; set [embedding] provider, model and dims to ingest")]
    EmbeddingDisabled,

    #[error(
        "collection '{collection}' stores {stored}-dimensional vectors but embedding.dims is {configured}"
    )]
    DimensionMismatch {
        collection: String,
        stored: usize,
        configured: usize,
    },

    #[error("embedder '{model}' declares {actual} dimensions but embedding.dims is {expected}")]
    EmbedderDimension {
        model: String,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-file failure raised when a returned vector has the wrong length.
#[derive(Debug, Error)]
#[error("embedding has {actual} dimensions, collection expects {expected}")]
pub struct VectorDimensionError {
    pub expected: usize,
    pub actual: usize,
}

/// Result of handling one discovered file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Unchanged,
    Duplicate,
    Ingested { chunks: usize, ocr_applied: bool },
    Failed { error: String },
}

/// Counters for one collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub collection: String,
    pub scanned: u64,
    pub processed: u64,
    pub skipped: u64,
    pub duplicates: u64,
    pub failed: u64,
    pub chunks: u64,
    pub ocr_applied: u64,
    pub cancelled: bool,
}

impl IngestSummary {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Self::default()
        }
    }

    /// Count one examined file.
    pub fn record(&mut self, outcome: &FileOutcome) {
        self.scanned += 1;
        match outcome {
            FileOutcome::Unchanged => self.skipped += 1,
            FileOutcome::Duplicate => self.duplicates += 1,
            FileOutcome::Ingested {
                chunks,
                ocr_applied,
            } => {
                self.processed += 1;
                self.chunks += *chunks as u64;
                if *ocr_applied {
                    self.ocr_applied += 1;
                }
            }
            FileOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.scanned == self.processed + self.skipped + self.duplicates + self.failed
    }
}

/// Runs ingestion for configured collections.
pub struct Ingestor {
    config: Arc<Config>,
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    ocr: Arc<dyn OcrEngine>,
    hooks: Option<HookExecutor>,
    progress: Arc<dyn IngestProgressReporter>,
}

impl Ingestor {
    /// Build an ingestor with the production extractor, OCR engine, and
    /// the hooks named in `config`.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        let ocr = OcrMyPdf::new(OcrSettings::from(&config.ocr));
        let hooks = HookExecutor::from_config(&config.hooks);
        Self {
            config,
            store,
            embedder,
            extractor: Arc::new(PdfExtractor::new()),
            ocr: Arc::new(ocr),
            hooks,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_hooks(mut self, hooks: Option<HookExecutor>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Ingest several collections concurrently. Repeated names run once,
    /// so files within each collection are still handled one at a time.
    pub async fn ingest_many(
        &self,
        names: &[String],
        cancel: &AtomicBool,
    ) -> Vec<(String, Result<IngestSummary, IngestError>)> {
        let mut unique: Vec<&String> = Vec::with_capacity(names.len());
        for name in names {
            if unique.contains(&name) {
                tracing::warn!(collection = %name, "collection listed twice; ingesting once");
            } else {
                unique.push(name);
            }
        }
        let runs = unique.into_iter().map(|name| async move {
            let result = self.ingest(name, cancel).await;
            (name.clone(), result)
        });
        join_all(runs).await
    }

    /// Ingest one collection.
    pub async fn ingest(
        &self,
        name: &str,
        cancel: &AtomicBool,
    ) -> Result<IngestSummary, IngestError> {
        let collection = self.preflight(name).await?;
        let collection_config = self
            .config
            .collection(name)
            .ok_or_else(|| IngestError::UnknownCollection(name.to_string()))?
            .clone();

        self.progress.report(IngestProgressEvent::Discovering {
            collection: name.to_string(),
        });
        let discovery = self.config.discovery.clone();
        let discover_config = collection_config.clone();
        let mut files = tokio::task::spawn_blocking(move || discover(&discover_config, &discovery))
            .await
            .map_err(anyhow::Error::from)??;
        tracing::info!(collection = name, files = files.len(), "discovery complete");

        let mut tags = collection_config.tags.clone();
        if let Some(hooks) = &self.hooks {
            let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
            let output = hooks.run_pre_ingest(name, &paths).await;
            if !output.skip.is_empty() {
                let before = files.len();
                files.retain(|f| !output.skip.iter().any(|s| Path::new(s) == f.path));
                tracing::info!(
                    collection = name,
                    removed = before - files.len(),
                    "pre-ingest hook skipped files"
                );
            }
            for tag in output.metadata_tags() {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }

        let mut summary = IngestSummary::new(name);
        let total = files.len() as u64;

        for (i, file) in files.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(collection = name, remaining = files.len() - i, "run cancelled");
                summary.cancelled = true;
                break;
            }
            self.progress.report(IngestProgressEvent::Ingesting {
                collection: name.to_string(),
                n: i as u64 + 1,
                total,
            });

            let outcome = match self.process_file(&collection, file, &tags).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(path = %file.path.display(), "ingest failed: {:#}", e);
                    FileOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
            };
            tracing::debug!(path = %file.path.display(), ?outcome, "file done");
            summary.record(&outcome);
        }

        self.progress.report(IngestProgressEvent::Finished {
            collection: name.to_string(),
            processed: summary.processed,
            skipped: summary.skipped,
            duplicates: summary.duplicates,
            failed: summary.failed,
        });

        if let Some(hooks) = &self.hooks {
            hooks.run_post_ingest(name, &summary).await;
        }

        tracing::info!(
            collection = name,
            scanned = summary.scanned,
            processed = summary.processed,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "ingest complete"
        );
        Ok(summary)
    }

    /// Validate the run before touching any file.
    async fn preflight(&self, name: &str) -> Result<Collection, IngestError> {
        if self.config.collection(name).is_none() {
            return Err(IngestError::UnknownCollection(name.to_string()));
        }

        let configured = self.config.embed_dim();
        if !self.config.embedding.is_enabled() || configured == 0 {
            return Err(IngestError::EmbeddingDisabled);
        }
        if self.embedder.dims() != configured {
            return Err(IngestError::EmbedderDimension {
                model: self.embedder.model_name().to_string(),
                expected: configured,
                actual: self.embedder.dims(),
            });
        }

        // A failed check must leave the stored collection untouched.
        if let Some(existing) = self.store.get_collection(name).await? {
            if existing.embed_dim != configured {
                return Err(IngestError::DimensionMismatch {
                    collection: name.to_string(),
                    stored: existing.embed_dim,
                    configured,
                });
            }
        }

        let spec = CollectionSpec {
            name: name.to_string(),
            embed_model: self.embedder.model_name().to_string(),
            embed_dim: configured,
            chunk_size: self.config.chunking.chunk_size,
            overlap: self.config.chunking.overlap,
        };
        let collection = self.store.ensure_collection(&spec).await?;
        if collection.embed_dim != configured {
            return Err(IngestError::DimensionMismatch {
                collection: name.to_string(),
                stored: collection.embed_dim,
                configured,
            });
        }
        Ok(collection)
    }

    async fn process_file(
        &self,
        collection: &Collection,
        file: &DiscoveredFile,
        tags: &[String],
    ) -> anyhow::Result<FileOutcome> {
        let path_key = file.path_key();

        if self
            .store
            .find_document_by_identity(collection.id, &path_key, &file.sha256, file.mtime)
            .await?
            .is_some()
        {
            return Ok(FileOutcome::Unchanged);
        }

        let mut doc = DocumentUpsert {
            collection_id: collection.id,
            path: path_key.clone(),
            source_hash: file.sha256.clone(),
            mtime: file.mtime,
            size: file.size as i64,
            tags: tags.to_vec(),
            status: DocumentStatus::Duplicate,
            ocr_applied: false,
            processed_path: None,
            quality: QualityReport::empty(),
        };

        if self
            .store
            .find_duplicate_by_hash(collection.id, &file.sha256, &path_key)
            .await?
        {
            self.store.commit_document(&doc, &[]).await?;
            tracing::info!(path = %file.path.display(), "duplicate content, stored without chunks");
            return Ok(FileOutcome::Duplicate);
        }

        let mut pages = self.extract(&file.path).await?;
        let mut report = assess(&pages);

        if report.needs_ocr(&self.config.quality) {
            tracing::info!(
                path = %file.path.display(),
                extracted_chars = report.extracted_chars,
                empty_page_ratio = report.empty_page_ratio,
                "low text quality, running OCR"
            );
            let dest = self.ocr.run(&file.path, &collection.name, &file.root).await?;
            pages = self.extract(&dest).await?;
            report = assess(&pages);
            doc.ocr_applied = true;
            doc.processed_path = Some(dest.to_string_lossy().to_string());
        }

        let params = self.config.chunking.params();
        let mut chunks = Vec::new();
        for page in &pages {
            for chunk in chunk_text(&page.text, page.page, &params) {
                let embedding = self.embedder.embed_one(&chunk.content).await?;
                if embedding.len() != collection.embed_dim {
                    return Err(VectorDimensionError {
                        expected: collection.embed_dim,
                        actual: embedding.len(),
                    }
                    .into());
                }
                chunks.push(NewChunk {
                    page: chunk.page,
                    chunk_index: chunks.len() as i64,
                    content: chunk.content,
                    content_hash: chunk.content_hash,
                    embedding,
                });
            }
        }

        doc.status = DocumentStatus::Ingested;
        doc.quality = report;
        self.store.commit_document(&doc, &chunks).await?;

        Ok(FileOutcome::Ingested {
            chunks: chunks.len(),
            ocr_applied: doc.ocr_applied,
        })
    }

    async fn extract(&self, path: &Path) -> anyhow::Result<Vec<PageText>> {
        let extractor = Arc::clone(&self.extractor);
        let path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extractor.extract(&path)).await??;
        Ok(pages)
    }
}
