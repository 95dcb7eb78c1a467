//! SQLite-backed [`CorpusStore`] implementation.
//!
//! Collections, documents, and chunks live in the tables created by
//! [`migrate`](crate::migrate). Chunk embeddings are stored inline as
//! little-endian `f32` BLOBs and ranked in-process with
//! [`rank_candidates`], so SQLite needs no vector extension.
//!
//! Upserts use `INSERT ... ON CONFLICT ... DO UPDATE ... RETURNING id`
//! (SQLite ≥ 3.35).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use nexus_core::embedding::{blob_to_vec, vec_to_blob};
use nexus_core::models::{
    Collection, CollectionSpec, Document, DocumentStatus, DocumentUpsert, NewChunk,
    RetrievedChunk, SearchRequest, StoredChunk, DEFAULT_COLLECTION_VERSION,
};
use nexus_core::search::{rank_candidates, ChunkCandidate};
use nexus_core::store::CorpusStore;

const COLLECTION_COLUMNS: &str =
    "id, name, version, embed_model, embed_dim, chunk_size, overlap, active, created_at";

const DOCUMENT_COLUMNS: &str = "id, collection_id, path, source_hash, mtime, size, tags, status, \
     ocr_applied, processed_path, extracted_chars, empty_page_ratio, quality_json, created_at, updated_at";

/// SQLite implementation of the [`CorpusStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of chunks per document in a collection, keyed by document ID.
    pub async fn chunk_counts(&self, collection_id: i64) -> Result<Vec<(i64, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT d.id AS document_id, COUNT(c.id) AS n
            FROM documents d
            LEFT JOIN chunks c ON c.document_id = d.id
            WHERE d.collection_id = ?
            GROUP BY d.id
            "#,
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(i64, i64)> {
                Ok((row.try_get("document_id")?, row.try_get("n")?))
            })
            .collect()
    }
}

fn collection_from_row(row: &SqliteRow) -> Result<Collection> {
    Ok(Collection {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        version: row.try_get("version")?,
        embed_model: row.try_get("embed_model")?,
        embed_dim: row.try_get::<i64, _>("embed_dim")? as usize,
        chunk_size: row.try_get::<i64, _>("chunk_size")? as usize,
        overlap: row.try_get::<i64, _>("overlap")? as usize,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let tags_json: String = row.try_get("tags")?;
    let status: String = row.try_get("status")?;
    let quality_json: String = row.try_get("quality_json")?;

    Ok(Document {
        id: row.try_get("id")?,
        collection_id: row.try_get("collection_id")?,
        path: row.try_get("path")?,
        source_hash: row.try_get("source_hash")?,
        mtime: row.try_get("mtime")?,
        size: row.try_get("size")?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        status: status.parse::<DocumentStatus>()?,
        ocr_applied: row.try_get("ocr_applied")?,
        processed_path: row.try_get("processed_path")?,
        extracted_chars: row.try_get("extracted_chars")?,
        empty_page_ratio: row.try_get("empty_page_ratio")?,
        quality: serde_json::from_str(&quality_json).unwrap_or(serde_json::json!({})),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn upsert_document_on(conn: &mut SqliteConnection, doc: &DocumentUpsert) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let tags = serde_json::to_string(&doc.tags)?;
    let quality = doc.quality.to_json().to_string();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO documents (collection_id, path, source_hash, mtime, size, tags, status,
                               ocr_applied, processed_path, extracted_chars, empty_page_ratio,
                               quality_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(collection_id, path) DO UPDATE SET
            source_hash = excluded.source_hash,
            mtime = excluded.mtime,
            size = excluded.size,
            tags = excluded.tags,
            status = excluded.status,
            ocr_applied = excluded.ocr_applied,
            processed_path = excluded.processed_path,
            extracted_chars = excluded.extracted_chars,
            empty_page_ratio = excluded.empty_page_ratio,
            quality_json = excluded.quality_json,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(doc.collection_id)
    .bind(&doc.path)
    .bind(&doc.source_hash)
    .bind(doc.mtime)
    .bind(doc.size)
    .bind(&tags)
    .bind(doc.status.as_str())
    .bind(doc.ocr_applied)
    .bind(&doc.processed_path)
    .bind(doc.quality.extracted_chars as i64)
    .bind(doc.quality.empty_page_ratio)
    .bind(&quality)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("Failed to upsert document {}", doc.path))?;

    Ok(id)
}

async fn replace_chunks_on(
    conn: &mut SqliteConnection,
    document_id: i64,
    chunks: &[NewChunk],
) -> Result<()> {
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *conn)
        .await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (document_id, page, chunk_index, content, content_hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(document_id)
        .bind(chunk.page as i64)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(&chunk.content_hash)
        .bind(vec_to_blob(&chunk.embedding))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<Collection> {
        let now = chrono::Utc::now().timestamp();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO collections (name, version, embed_model, embed_dim, chunk_size, overlap,
                                     active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            ON CONFLICT(name, version) DO UPDATE SET embed_model = CASE
                WHEN collections.embed_dim = excluded.embed_dim THEN excluded.embed_model
                ELSE collections.embed_model
            END
            RETURNING {}
            "#,
            COLLECTION_COLUMNS
        ))
        .bind(&spec.name)
        .bind(DEFAULT_COLLECTION_VERSION)
        .bind(&spec.embed_model)
        .bind(spec.embed_dim as i64)
        .bind(spec.chunk_size as i64)
        .bind(spec.overlap as i64)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to ensure collection '{}'", spec.name))?;

        collection_from_row(&row)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM collections WHERE name = ? AND version = ?",
            COLLECTION_COLUMNS
        ))
        .bind(name)
        .bind(DEFAULT_COLLECTION_VERSION)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(collection_from_row).transpose()
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM collections ORDER BY name ASC, version ASC",
            COLLECTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(collection_from_row).collect()
    }

    async fn find_document_by_identity(
        &self,
        collection_id: i64,
        path: &str,
        source_hash: &str,
        mtime: i64,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE collection_id = ? AND path = ? AND source_hash = ? AND mtime = ?",
        )
        .bind(collection_id)
        .bind(path)
        .bind(source_hash)
        .bind(mtime)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id)
    }

    async fn find_duplicate_by_hash(
        &self,
        collection_id: i64,
        source_hash: &str,
        exclude_path: &str,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM documents WHERE collection_id = ? AND source_hash = ? AND path <> ?",
        )
        .bind(collection_id)
        .bind(source_hash)
        .bind(exclude_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn upsert_document(&self, doc: &DocumentUpsert) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        upsert_document_on(&mut *conn, doc).await
    }

    async fn replace_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        replace_chunks_on(&mut *tx, document_id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_document(&self, doc: &DocumentUpsert, chunks: &[NewChunk]) -> Result<i64> {
        // Dropping `tx` on an early return rolls back both writes.
        let mut tx = self.pool.begin().await?;
        let id = upsert_document_on(&mut *tx, doc).await?;
        replace_chunks_on(&mut *tx, id, chunks).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn list_documents(&self, collection_id: i64) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE collection_id = ? ORDER BY path ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }

    async fn chunks_for_document(&self, document_id: i64) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, page, chunk_index, content, content_hash, embedding
            FROM chunks
            WHERE document_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredChunk> {
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok(StoredChunk {
                    id: row.try_get("id")?,
                    document_id: row.try_get("document_id")?,
                    page: row.try_get::<i64, _>("page")? as u32,
                    chunk_index: row.try_get("chunk_index")?,
                    content: row.try_get("content")?,
                    content_hash: row.try_get("content_hash")?,
                    embedding: blob_to_vec(&blob),
                })
            })
            .collect()
    }

    async fn search_chunks(
        &self,
        query_vec: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<RetrievedChunk>> {
        if request.collections.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; request.collections.len()].join(", ");
        let sql = format!(
            r#"
            SELECT c.id AS chunk_id, c.document_id, col.name AS collection, d.path, c.page,
                   c.content, d.tags, c.embedding
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN collections col ON col.id = d.collection_id
            WHERE col.active = 1 AND col.embed_dim = ? AND col.name IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(query_vec.len() as i64);
        for name in &request.collections {
            query = query.bind(name);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let candidates = rows
            .iter()
            .map(|row| -> Result<ChunkCandidate> {
                let blob: Vec<u8> = row.try_get("embedding")?;
                let tags_json: String = row.try_get("tags")?;
                Ok(ChunkCandidate {
                    chunk_id: row.try_get("chunk_id")?,
                    document_id: row.try_get("document_id")?,
                    collection: row.try_get("collection")?,
                    path: row.try_get("path")?,
                    page: row.try_get::<i64, _>("page")? as u32,
                    content: row.try_get("content")?,
                    tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                    embedding: blob_to_vec(&blob),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_candidates(query_vec, candidates, request))
    }
}
