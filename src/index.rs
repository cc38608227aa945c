//! SQLite-backed vector index for chunk embeddings.
//!
//! Embeddings are stored as little-endian f32 BLOBs keyed by a stable
//! `{doc_id}_chunk_{index}` vector id, so re-upserting a document's
//! chunks overwrites rather than duplicates. Queries fetch the firm's
//! candidate rows and rank by cosine similarity in Rust.
//!
//! Vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] — encode a `Vec<f32>` as bytes for BLOB storage
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`

use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::{now_epoch, RetrievedChunk};

/// Rows written per transaction during bulk upsert.
const UPSERT_BATCH_SIZE: usize = 100;

/// One chunk's embedding plus the metadata stored beside it.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub doc_id: String,
    pub firm_id: String,
    pub chunk_index: i64,
    pub excerpt: String,
    pub embedding: Vec<f32>,
}

impl VectorRecord {
    pub fn vector_id(&self) -> String {
        format!("{}_chunk_{}", self.doc_id, self.chunk_index)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexStats {
    pub status: String,
    pub total_vectors: i64,
    pub dimension: usize,
}

pub struct VectorIndex {
    pool: SqlitePool,
    dims: usize,
    excerpt_chars: usize,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool, dims: usize, excerpt_chars: usize) -> Self {
        Self {
            pool,
            dims,
            excerpt_chars,
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Upsert a batch of chunk vectors, committing every
    /// [`UPSERT_BATCH_SIZE`] rows.
    ///
    /// Rejects vectors whose length disagrees with the configured
    /// dimensionality and all-zero vectors, which would match nothing
    /// and poison ranking.
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        for record in records {
            if record.embedding.len() != self.dims {
                return Err(Error::VectorIndex(format!(
                    "vector for {} has {} dims, index expects {}",
                    record.vector_id(),
                    record.embedding.len(),
                    self.dims
                )));
            }
            if record.embedding.iter().all(|v| *v == 0.0) {
                return Err(Error::VectorIndex(format!(
                    "refusing all-zero vector for {}",
                    record.vector_id()
                )));
            }
        }

        let now = now_epoch();
        let mut written = 0;

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;
            for record in batch {
                let excerpt = truncate_chars(&record.excerpt, self.excerpt_chars);
                sqlx::query(
                    r#"
                    INSERT INTO chunk_vectors
                        (vector_id, doc_id, firm_id, chunk_index, excerpt, embedding, dims, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(vector_id) DO UPDATE SET
                        excerpt = excluded.excerpt,
                        embedding = excluded.embedding,
                        dims = excluded.dims,
                        created_at = excluded.created_at
                    "#,
                )
                .bind(record.vector_id())
                .bind(&record.doc_id)
                .bind(&record.firm_id)
                .bind(record.chunk_index)
                .bind(excerpt)
                .bind(vec_to_blob(&record.embedding))
                .bind(self.dims as i64)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                written += 1;
            }
            tx.commit().await?;
        }

        Ok(written)
    }

    /// Rank a firm's vectors against the query, optionally scoped to one
    /// document. Returns the `top_k` best matches, best first.
    pub async fn query(
        &self,
        firm_id: &str,
        doc_id: Option<&str>,
        query_vec: &[f32],
        top_k: i64,
    ) -> Result<Vec<RetrievedChunk>> {
        if query_vec.len() != self.dims {
            return Err(Error::VectorIndex(format!(
                "query vector has {} dims, index expects {}",
                query_vec.len(),
                self.dims
            )));
        }

        let rows: Vec<(String, String, i64, String, Vec<u8>)> = match doc_id {
            Some(doc) => {
                sqlx::query_as(
                    "SELECT vector_id, doc_id, chunk_index, excerpt, embedding
                     FROM chunk_vectors WHERE firm_id = ? AND doc_id = ?",
                )
                .bind(firm_id)
                .bind(doc)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT vector_id, doc_id, chunk_index, excerpt, embedding
                     FROM chunk_vectors WHERE firm_id = ?",
                )
                .bind(firm_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|(vector_id, doc_id, chunk_index, excerpt, blob)| {
                let embedding = blob_to_vec(&blob);
                RetrievedChunk {
                    vector_id,
                    doc_id,
                    chunk_index,
                    excerpt,
                    score: cosine_similarity(query_vec, &embedding),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k.max(0) as usize);
        Ok(scored)
    }

    /// Remove every vector belonging to a document. Returns the number
    /// of rows deleted.
    pub async fn delete_by_document(&self, doc_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunk_vectors WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Report index status and size. Never raises: an unreachable or
    /// unmigrated store yields a `degraded` status instead.
    pub async fn stats(&self) -> IndexStats {
        match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
        {
            Ok(total) => IndexStats {
                status: "active".to_string(),
                total_vectors: total,
                dimension: self.dims,
            },
            Err(e) => {
                tracing::warn!("vector index stats unavailable: {}", e);
                IndexStats {
                    status: "degraded".to_string(),
                    total_vectors: 0,
                    dimension: self.dims,
                }
            }
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn vector_id_is_stable() {
        let record = VectorRecord {
            doc_id: "doc-9".to_string(),
            firm_id: "firm-1".to_string(),
            chunk_index: 3,
            excerpt: String::new(),
            embedding: vec![1.0],
        };
        assert_eq!(record.vector_id(), "doc-9_chunk_3");
    }

    #[test]
    fn excerpt_truncation_char_safe() {
        let text = "ü".repeat(8);
        assert_eq!(truncate_chars(&text, 3).chars().count(), 3);
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
