//! SQLite store tests on a temporary database file.

use tempfile::TempDir;

use nexus::db::connect_path;
use nexus::migrate::migrate;
use nexus::sqlite_store::SqliteStore;
use nexus_core::models::{
    CollectionSpec, DocumentStatus, DocumentUpsert, NewChunk, PageText, SearchRequest,
};
use nexus_core::quality::{assess, QualityReport};
use nexus_core::store::CorpusStore;

async fn open() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let pool = connect_path(&tmp.path().join("data").join("nexus.sqlite"))
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    // Running twice must be harmless.
    migrate(&pool).await.unwrap();
    (tmp, SqliteStore::new(pool))
}

fn spec(name: &str, dim: usize) -> CollectionSpec {
    CollectionSpec {
        name: name.to_string(),
        embed_model: "test-model".to_string(),
        embed_dim: dim,
        chunk_size: 800,
        overlap: 80,
    }
}

fn doc(collection_id: i64, path: &str, hash: &str) -> DocumentUpsert {
    DocumentUpsert {
        collection_id,
        path: path.to_string(),
        source_hash: hash.to_string(),
        mtime: 1_700_000_000,
        size: 1234,
        tags: vec!["library".to_string()],
        status: DocumentStatus::Ingested,
        ocr_applied: false,
        processed_path: None,
        quality: QualityReport::empty(),
    }
}

fn chunk(index: i64, content: &str, embedding: Vec<f32>) -> NewChunk {
    NewChunk {
        page: 1,
        chunk_index: index,
        content: content.to_string(),
        content_hash: format!("hash-{}", index),
        embedding,
    }
}

#[tokio::test]
async fn test_ensure_collection_is_stable_and_keeps_dim() {
    let (_tmp, store) = open().await;

    let first = store.ensure_collection(&spec("library", 4)).await.unwrap();
    assert_eq!(first.version, 1);
    assert!(first.active);

    let mut again = spec("library", 8);
    again.embed_model = "newer-model".to_string();
    let second = store.ensure_collection(&again).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.embed_dim, 4);
    assert_eq!(second.embed_model, "test-model");

    let mut same_dim = spec("library", 4);
    same_dim.embed_model = "newer-model".to_string();
    let third = store.ensure_collection(&same_dim).await.unwrap();
    assert_eq!(third.id, first.id);
    assert_eq!(third.embed_model, "newer-model");

    let listed = store.list_collections().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(store.get_collection("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_document_round_trip_with_quality() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();

    let mut upsert = doc(c.id, "/corpora/a.pdf", "aaa");
    upsert.ocr_applied = true;
    upsert.processed_path = Some("/processed/library/a.pdf".to_string());
    upsert.quality = assess(&[PageText::new(1, "hello"), PageText::new(2, "  ")]);
    let id = store.upsert_document(&upsert).await.unwrap();

    let docs = store.list_documents(c.id).await.unwrap();
    assert_eq!(docs.len(), 1);
    let d = &docs[0];
    assert_eq!(d.id, id);
    assert_eq!(d.tags, vec!["library"]);
    assert_eq!(d.status, DocumentStatus::Ingested);
    assert!(d.ocr_applied);
    assert_eq!(d.processed_path.as_deref(), Some("/processed/library/a.pdf"));
    assert_eq!(d.extracted_chars, 7);
    assert!((d.empty_page_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(d.quality["pages"].as_array().unwrap().len(), 2);
    assert_eq!(d.quality["doc"]["extracted_chars"], 7);
}

#[tokio::test]
async fn test_upsert_keyed_by_path() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();

    let first = store.upsert_document(&doc(c.id, "/corpora/a.pdf", "v1")).await.unwrap();
    let second = store.upsert_document(&doc(c.id, "/corpora/a.pdf", "v2")).await.unwrap();
    assert_eq!(first, second);

    let docs = store.list_documents(c.id).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].source_hash, "v2");
}

#[tokio::test]
async fn test_identity_and_duplicate_lookups() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();
    let other = store.ensure_collection(&spec("papers", 3)).await.unwrap();
    let id = store.upsert_document(&doc(c.id, "/corpora/a.pdf", "abc")).await.unwrap();

    assert_eq!(
        store
            .find_document_by_identity(c.id, "/corpora/a.pdf", "abc", 1_700_000_000)
            .await
            .unwrap(),
        Some(id)
    );
    assert!(store
        .find_document_by_identity(c.id, "/corpora/a.pdf", "abc", 1)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_document_by_identity(c.id, "/corpora/a.pdf", "changed", 1_700_000_000)
        .await
        .unwrap()
        .is_none());

    assert!(store.find_duplicate_by_hash(c.id, "abc", "/corpora/b.pdf").await.unwrap());
    assert!(!store.find_duplicate_by_hash(c.id, "abc", "/corpora/a.pdf").await.unwrap());
    assert!(!store.find_duplicate_by_hash(other.id, "abc", "/corpora/b.pdf").await.unwrap());
}

#[tokio::test]
async fn test_commit_replaces_chunks() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();

    let chunks = vec![
        chunk(0, "zero", vec![1.0, 0.0, 0.0]),
        chunk(1, "one", vec![0.0, 1.0, 0.0]),
        chunk(2, "two", vec![0.0, 0.0, 1.0]),
    ];
    let id = store
        .commit_document(&doc(c.id, "/corpora/a.pdf", "v1"), &chunks)
        .await
        .unwrap();
    let stored = store.chunks_for_document(id).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].content, "one");
    assert_eq!(stored[2].embedding, vec![0.0, 0.0, 1.0]);

    let replaced = store
        .commit_document(
            &doc(c.id, "/corpora/a.pdf", "v2"),
            &[chunk(0, "fresh", vec![1.0, 1.0, 0.0])],
        )
        .await
        .unwrap();
    assert_eq!(replaced, id);
    let stored = store.chunks_for_document(id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "fresh");

    let counts = store.chunk_counts(c.id).await.unwrap();
    assert_eq!(counts, vec![(id, 1)]);
}

#[tokio::test]
async fn test_duplicate_chunk_index_rolls_back_document() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();

    let clashing = vec![
        chunk(0, "a", vec![1.0, 0.0, 0.0]),
        chunk(0, "b", vec![0.0, 1.0, 0.0]),
    ];
    let result = store
        .commit_document(&doc(c.id, "/corpora/a.pdf", "v1"), &clashing)
        .await;
    assert!(result.is_err());
    assert!(store.list_documents(c.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_ranks_and_filters() {
    let (_tmp, store) = open().await;
    let lib = store.ensure_collection(&spec("library", 3)).await.unwrap();
    let wide = store.ensure_collection(&spec("wide", 5)).await.unwrap();

    store
        .commit_document(
            &doc(lib.id, "/corpora/a.pdf", "a"),
            &[
                chunk(0, "close", vec![1.0, 0.1, 0.0]),
                chunk(1, "far", vec![0.0, 0.0, 1.0]),
            ],
        )
        .await
        .unwrap();
    store
        .commit_document(
            &doc(wide.id, "/corpora/w.pdf", "w"),
            &[chunk(0, "other dims", vec![1.0; 5])],
        )
        .await
        .unwrap();

    let request = SearchRequest::new(vec!["library".into(), "wide".into()], 10);
    let results = store.search_chunks(&[1.0, 0.0, 0.0], &request).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content, "close");
    assert_eq!(results[0].collection, "library");
    assert_eq!(results[0].page, 1);
    assert!(results[0].score > results[1].score);

    let mut limited = request.clone();
    limited.top_k = 1;
    assert_eq!(store.search_chunks(&[1.0, 0.0, 0.0], &limited).await.unwrap().len(), 1);

    let mut tagged = request.clone();
    tagged.tags = vec!["nope".into()];
    assert!(store.search_chunks(&[1.0, 0.0, 0.0], &tagged).await.unwrap().is_empty());

    let empty = SearchRequest::new(Vec::new(), 10);
    assert!(store.search_chunks(&[1.0, 0.0, 0.0], &empty).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inactive_collections_are_not_searched() {
    let (_tmp, store) = open().await;
    let c = store.ensure_collection(&spec("library", 3)).await.unwrap();
    store
        .commit_document(
            &doc(c.id, "/corpora/a.pdf", "a"),
            &[chunk(0, "text", vec![1.0, 0.0, 0.0])],
        )
        .await
        .unwrap();

    sqlx::query("UPDATE collections SET active = 0 WHERE id = ?")
        .bind(c.id)
        .execute(store.pool())
        .await
        .unwrap();

    let request = SearchRequest::new(vec!["library".into()], 10);
    assert!(store.search_chunks(&[1.0, 0.0, 0.0], &request).await.unwrap().is_empty());
}
