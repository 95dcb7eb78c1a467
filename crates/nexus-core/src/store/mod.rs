//! Storage abstraction for the corpus.
//!
//! The [`CorpusStore`] trait defines every storage operation the ingestion
//! orchestrator and retrieval need, so backends are pluggable (SQLite in the
//! app crate, [`memory::InMemoryStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Collection, CollectionSpec, Document, DocumentUpsert, NewChunk, RetrievedChunk, SearchRequest,
    StoredChunk,
};

/// Abstract storage backend for collections, documents, and chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_collection`](CorpusStore::ensure_collection) | Create-or-touch a collection, returning the stored row |
/// | [`find_document_by_identity`](CorpusStore::find_document_by_identity) | Unchanged-file check |
/// | [`find_duplicate_by_hash`](CorpusStore::find_duplicate_by_hash) | Same content under another path |
/// | [`upsert_document`](CorpusStore::upsert_document) | Insert or update a document row |
/// | [`replace_chunks`](CorpusStore::replace_chunks) | Delete-then-insert a document's chunks |
/// | [`commit_document`](CorpusStore::commit_document) | Both of the above in one transaction |
/// | [`search_chunks`](CorpusStore::search_chunks) | Cosine similarity search |
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Insert the collection at the default version, or update the embedding
    /// model of the existing row when its `embed_dim` matches. Returns the
    /// stored row, whose `embed_dim` may differ from `spec.embed_dim` if the
    /// collection predates it; such a row is left unchanged.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<Collection>;

    /// Look up a collection by name at the default version.
    async fn get_collection(&self, name: &str) -> Result<Option<Collection>>;

    /// All collections, ordered by name.
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// ID of the document at `path` if its hash and mtime both match.
    async fn find_document_by_identity(
        &self,
        collection_id: i64,
        path: &str,
        source_hash: &str,
        mtime: i64,
    ) -> Result<Option<i64>>;

    /// Whether a document at a different path already has `source_hash`.
    async fn find_duplicate_by_hash(
        &self,
        collection_id: i64,
        source_hash: &str,
        exclude_path: &str,
    ) -> Result<bool>;

    /// Insert or update the document keyed by `(collection_id, path)`.
    async fn upsert_document(&self, doc: &DocumentUpsert) -> Result<i64>;

    /// Replace every chunk of a document.
    async fn replace_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()>;

    /// Upsert the document and replace its chunks atomically.
    ///
    /// Either both writes are visible afterwards or neither is.
    async fn commit_document(&self, doc: &DocumentUpsert, chunks: &[NewChunk]) -> Result<i64>;

    /// Documents of a collection, ordered by path.
    async fn list_documents(&self, collection_id: i64) -> Result<Vec<Document>>;

    /// Chunks of a document, ordered by `chunk_index`.
    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>>;

    /// Rank chunks of the requested active collections against `query_vec`.
    ///
    /// Only collections whose declared dimension equals `query_vec.len()`
    /// participate. An empty collection list returns no results without
    /// touching storage.
    async fn search_chunks(
        &self,
        query_vec: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<RetrievedChunk>>;
}
