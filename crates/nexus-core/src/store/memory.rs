//! In-memory [`CorpusStore`] implementation for tests and embedding hosts.
//!
//! All state lives behind one `std::sync::RwLock`, so `commit_document` is
//! atomic with respect to other callers. Vector search is brute-force cosine
//! similarity over every stored chunk.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Collection, CollectionSpec, Document, DocumentUpsert, NewChunk, RetrievedChunk, SearchRequest,
    StoredChunk, DEFAULT_COLLECTION_VERSION,
};
use crate::search::{rank_candidates, ChunkCandidate};

use super::CorpusStore;

#[derive(Default)]
struct State {
    collections: Vec<Collection>,
    documents: Vec<Document>,
    chunks: Vec<StoredChunk>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn upsert_document(&mut self, doc: &DocumentUpsert) -> i64 {
        let now = chrono::Utc::now().timestamp();
        let quality = doc.quality.to_json();
        if let Some(existing) = self
            .documents
            .iter_mut()
            .find(|d| d.collection_id == doc.collection_id && d.path == doc.path)
        {
            existing.source_hash = doc.source_hash.clone();
            existing.mtime = doc.mtime;
            existing.size = doc.size;
            existing.tags = doc.tags.clone();
            existing.status = doc.status;
            existing.ocr_applied = doc.ocr_applied;
            existing.processed_path = doc.processed_path.clone();
            existing.extracted_chars = doc.quality.extracted_chars as i64;
            existing.empty_page_ratio = doc.quality.empty_page_ratio;
            existing.quality = quality;
            existing.updated_at = now;
            return existing.id;
        }

        let id = self.next_id();
        self.documents.push(Document {
            id,
            collection_id: doc.collection_id,
            path: doc.path.clone(),
            source_hash: doc.source_hash.clone(),
            mtime: doc.mtime,
            size: doc.size,
            tags: doc.tags.clone(),
            status: doc.status,
            ocr_applied: doc.ocr_applied,
            processed_path: doc.processed_path.clone(),
            extracted_chars: doc.quality.extracted_chars as i64,
            empty_page_ratio: doc.quality.empty_page_ratio,
            quality,
            created_at: now,
            updated_at: now,
        });
        id
    }

    fn replace_chunks(&mut self, document_id: i64, chunks: &[NewChunk]) {
        self.chunks.retain(|c| c.document_id != document_id);
        for c in chunks {
            let id = self.next_id();
            self.chunks.push(StoredChunk {
                id,
                document_id,
                page: c.page,
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                content_hash: c.content_hash.clone(),
                embedding: c.embedding.clone(),
            });
        }
    }
}

/// In-memory store for tests and non-SQLite hosts.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deactivate a collection so it is excluded from search.
    pub fn set_active(&self, name: &str, active: bool) -> Result<()> {
        let mut state = self.write()?;
        for c in state.collections.iter_mut().filter(|c| c.name == name) {
            c.active = active;
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl CorpusStore for InMemoryStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<Collection> {
        let mut state = self.write()?;
        if let Some(existing) = state
            .collections
            .iter_mut()
            .find(|c| c.name == spec.name && c.version == DEFAULT_COLLECTION_VERSION)
        {
            if existing.embed_dim == spec.embed_dim {
                existing.embed_model = spec.embed_model.clone();
            }
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let collection = Collection {
            id,
            name: spec.name.clone(),
            version: DEFAULT_COLLECTION_VERSION,
            embed_model: spec.embed_model.clone(),
            embed_dim: spec.embed_dim,
            chunk_size: spec.chunk_size,
            overlap: spec.overlap,
            active: true,
            created_at: chrono::Utc::now().timestamp(),
        };
        state.collections.push(collection.clone());
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        let state = self.read()?;
        Ok(state
            .collections
            .iter()
            .find(|c| c.name == name && c.version == DEFAULT_COLLECTION_VERSION)
            .cloned())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let mut collections = self.read()?.collections.clone();
        collections.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.cmp(&b.version)));
        Ok(collections)
    }

    async fn find_document_by_identity(
        &self,
        collection_id: i64,
        path: &str,
        source_hash: &str,
        mtime: i64,
    ) -> Result<Option<i64>> {
        let state = self.read()?;
        Ok(state
            .documents
            .iter()
            .find(|d| {
                d.collection_id == collection_id
                    && d.path == path
                    && d.source_hash == source_hash
                    && d.mtime == mtime
            })
            .map(|d| d.id))
    }

    async fn find_duplicate_by_hash(
        &self,
        collection_id: i64,
        source_hash: &str,
        exclude_path: &str,
    ) -> Result<bool> {
        let state = self.read()?;
        Ok(state.documents.iter().any(|d| {
            d.collection_id == collection_id && d.source_hash == source_hash && d.path != exclude_path
        }))
    }

    async fn upsert_document(&self, doc: &DocumentUpsert) -> Result<i64> {
        Ok(self.write()?.upsert_document(doc))
    }

    async fn replace_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()> {
        self.write()?.replace_chunks(document_id, chunks);
        Ok(())
    }

    async fn commit_document(&self, doc: &DocumentUpsert, chunks: &[NewChunk]) -> Result<i64> {
        let mut state = self.write()?;
        let id = state.upsert_document(doc);
        state.replace_chunks(id, chunks);
        Ok(id)
    }

    async fn list_documents(&self, collection_id: i64) -> Result<Vec<Document>> {
        let state = self.read()?;
        let mut docs: Vec<Document> = state
            .documents
            .iter()
            .filter(|d| d.collection_id == collection_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(docs)
    }

    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>> {
        let state = self.read()?;
        let mut chunks: Vec<StoredChunk> = state
            .chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn search_chunks(
        &self,
        query_vec: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<RetrievedChunk>> {
        if request.collections.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.read()?;

        let candidates: Vec<ChunkCandidate> = state
            .collections
            .iter()
            .filter(|c| {
                c.active && c.embed_dim == query_vec.len() && request.collections.contains(&c.name)
            })
            .flat_map(|col| {
                state
                    .documents
                    .iter()
                    .filter(move |d| d.collection_id == col.id)
                    .map(move |d| (col, d))
            })
            .flat_map(|(col, doc)| {
                state
                    .chunks
                    .iter()
                    .filter(move |c| c.document_id == doc.id)
                    .map(move |c| ChunkCandidate {
                        chunk_id: c.id,
                        document_id: doc.id,
                        collection: col.name.clone(),
                        path: doc.path.clone(),
                        page: c.page,
                        content: c.content.clone(),
                        tags: doc.tags.clone(),
                        embedding: c.embedding.clone(),
                    })
            })
            .collect();

        Ok(rank_candidates(query_vec, candidates, request))
    }
}
