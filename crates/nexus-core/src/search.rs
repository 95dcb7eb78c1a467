//! Similarity ranking and query-side retrieval.
//!
//! Stores fetch candidate chunks for the requested collections and hand them
//! to [`rank_candidates`], which applies the shared filtering and ordering
//! rules so every backend ranks identically:
//!
//! 1. Drop candidates whose vector length differs from the query's.
//! 2. When the request names tags, keep only documents carrying one of them.
//! 3. Score = cosine similarity (1 − cosine distance).
//! 4. Drop scores below `min_score`, sort descending, keep `top_k`.
//!
//! [`retrieve`] is the query entry point: embed the query, then search.

use anyhow::Result;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{RetrievedChunk, SearchRequest};
use crate::store::CorpusStore;

/// A chunk loaded by a store, before scoring.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: i64,
    pub document_id: i64,
    pub collection: String,
    pub path: String,
    pub page: u32,
    pub content: String,
    pub tags: Vec<String>,
    pub embedding: Vec<f32>,
}

/// Score, filter, and order candidates for a request.
pub fn rank_candidates<I>(query_vec: &[f32], candidates: I, request: &SearchRequest) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = ChunkCandidate>,
{
    let mut results: Vec<RetrievedChunk> = candidates
        .into_iter()
        .filter(|c| c.embedding.len() == query_vec.len())
        .filter(|c| request.tags.is_empty() || c.tags.iter().any(|t| request.tags.contains(t)))
        .map(|c| {
            let score = cosine_similarity(query_vec, &c.embedding) as f64;
            RetrievedChunk {
                chunk_id: c.chunk_id,
                document_id: c.document_id,
                collection: c.collection,
                path: c.path,
                page: c.page,
                score,
                content: c.content,
            }
        })
        .filter(|r| request.min_score.map_or(true, |min| r.score >= min))
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(request.top_k);
    results
}

/// Embed `query` and search the store.
///
/// An empty collection list returns immediately, without calling the
/// embedder or the store.
pub async fn retrieve(
    store: &dyn CorpusStore,
    embedder: &dyn Embedder,
    query: &str,
    request: &SearchRequest,
) -> Result<Vec<RetrievedChunk>> {
    if request.collections.is_empty() {
        return Ok(Vec::new());
    }
    let query_vec = embedder.embed_one(query).await?;
    store.search_chunks(&query_vec, request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i64, embedding: Vec<f32>, tags: &[&str]) -> ChunkCandidate {
        ChunkCandidate {
            chunk_id: id,
            document_id: id * 10,
            collection: "library".to_string(),
            path: format!("/corpora/doc{}.pdf", id),
            page: 1,
            content: format!("chunk {}", id),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            embedding,
        }
    }

    #[test]
    fn test_ranks_by_descending_similarity() {
        let request = SearchRequest::new(vec!["library".into()], 10);
        let ranked = rank_candidates(
            &[1.0, 0.0],
            vec![
                candidate(1, vec![0.0, 1.0], &[]),
                candidate(2, vec![1.0, 0.0], &[]),
                candidate(3, vec![1.0, 1.0], &[]),
            ],
            &request,
        );
        let ids: Vec<i64> = ranked.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_drops_mismatched_dimensions() {
        let request = SearchRequest::new(vec!["library".into()], 10);
        let ranked = rank_candidates(
            &[1.0, 0.0],
            vec![candidate(1, vec![1.0, 0.0, 0.0], &[]), candidate(2, vec![1.0, 0.0], &[])],
            &request,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id, 2);
    }

    #[test]
    fn test_tag_filter_requires_overlap() {
        let mut request = SearchRequest::new(vec!["library".into()], 10);
        request.tags = vec!["legal".into()];
        let ranked = rank_candidates(
            &[1.0],
            vec![
                candidate(1, vec![1.0], &["legal", "2024"]),
                candidate(2, vec![1.0], &["finance"]),
                candidate(3, vec![1.0], &[]),
            ],
            &request,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id, 1);
    }

    #[test]
    fn test_min_score_and_top_k() {
        let mut request = SearchRequest::new(vec!["library".into()], 1);
        request.min_score = Some(0.5);
        let ranked = rank_candidates(
            &[1.0, 0.0],
            vec![
                candidate(1, vec![0.0, 1.0], &[]),
                candidate(2, vec![1.0, 0.2], &[]),
                candidate(3, vec![1.0, 0.0], &[]),
            ],
            &request,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id, 3);
    }
}
