//! Core data models used throughout Nexus.
//!
//! These types represent the collections, documents, chunks, and retrieval
//! results that flow through the ingestion and retrieval pipeline.
//! Timestamps are Unix seconds, matching the on-disk schema.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::quality::QualityReport;

/// Version assigned to a collection on first ingestion.
pub const DEFAULT_COLLECTION_VERSION: i64 = 1;

/// A named, versioned corpus sharing one embedding configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub embed_model: String,
    pub embed_dim: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    pub active: bool,
    pub created_at: i64,
}

/// Parameters for [`CorpusStore::ensure_collection`](crate::store::CorpusStore::ensure_collection).
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub embed_model: String,
    pub embed_dim: usize,
    pub chunk_size: usize,
    pub overlap: usize,
}

/// A candidate source file found by discovery. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// The configured root the file was found under.
    pub root: PathBuf,
    /// `path` relative to `root`.
    pub relative_path: PathBuf,
    /// Hex SHA-256 of the file content.
    pub sha256: String,
    pub mtime: i64,
    pub size: u64,
}

impl DiscoveredFile {
    /// Path as stored in the `documents.path` column.
    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// Stored status of a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Ingested,
    Duplicate,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Ingested => "ingested",
            DocumentStatus::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingested" => Ok(DocumentStatus::Ingested),
            "duplicate" => Ok(DocumentStatus::Duplicate),
            other => anyhow::bail!("unknown document status: '{}'", other),
        }
    }
}

/// Document row to insert or update, keyed by `(collection_id, path)`.
#[derive(Debug, Clone)]
pub struct DocumentUpsert {
    pub collection_id: i64,
    pub path: String,
    pub source_hash: String,
    pub mtime: i64,
    pub size: i64,
    pub tags: Vec<String>,
    pub status: DocumentStatus,
    pub ocr_applied: bool,
    pub processed_path: Option<String>,
    pub quality: QualityReport,
}

/// A persisted document row.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub collection_id: i64,
    pub path: String,
    pub source_hash: String,
    pub mtime: i64,
    pub size: i64,
    pub tags: Vec<String>,
    pub status: DocumentStatus,
    pub ocr_applied: bool,
    pub processed_path: Option<String>,
    pub extracted_chars: i64,
    pub empty_page_ratio: f64,
    pub quality: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Extracted text of one page. Pages are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self {
            page,
            text: text.into(),
        }
    }
}

/// A chunk ready to be written, with its embedding.
///
/// `chunk_index` is the running position across the whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub page: u32,
    pub chunk_index: i64,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A persisted chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub page: u32,
    pub chunk_index: i64,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: i64,
    pub document_id: i64,
    pub collection: String,
    pub path: String,
    pub page: u32,
    /// Cosine similarity (1 − cosine distance).
    pub score: f64,
    pub content: String,
}

/// Parameters of a similarity search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Collection names to search. Empty means no results.
    pub collections: Vec<String>,
    /// When non-empty, documents must carry at least one of these tags.
    pub tags: Vec<String>,
    pub top_k: usize,
    pub min_score: Option<f64>,
}

impl SearchRequest {
    pub fn new(collections: Vec<String>, top_k: usize) -> Self {
        Self {
            collections,
            tags: Vec::new(),
            top_k,
            min_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [DocumentStatus::Ingested, DocumentStatus::Duplicate] {
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("failed".parse::<DocumentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DocumentStatus::Duplicate).unwrap();
        assert_eq!(json, "\"duplicate\"");
    }
}
