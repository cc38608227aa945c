//! Persistence layer: documents, chunks, analysis artifacts, chat
//! history, usage metering, and audit trail.
//!
//! Usage and audit writes are best-effort. A metering or audit failure
//! is logged and swallowed so it never fails the user-facing operation
//! it rides along with.

use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    now_epoch, ChatMessage, Chunk, ClauseRecord, Document, DocumentStatus, FactsRecord,
    SummaryRecord,
};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- documents ----

    pub async fn create_document(
        &self,
        firm_id: &str,
        uploaded_by: Option<&str>,
        filename: &str,
        file_path: &str,
        content_hash: &str,
    ) -> Result<Document> {
        let id = Uuid::new_v4().to_string();
        let now = now_epoch();
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, firm_id, uploaded_by, filename, file_path, content_hash,
                 status, processing_generation, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(firm_id)
        .bind(uploaded_by)
        .bind(filename)
        .bind(file_path)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_document(&id).await
    }

    pub async fn get_document(&self, id: &str) -> Result<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    pub async fn list_documents(&self, firm_id: &str) -> Result<Vec<Document>> {
        Ok(sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE firm_id = ? ORDER BY created_at DESC",
        )
        .bind(firm_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Claim a document for processing: bump the generation token and
    /// flip the status to `processing`. Returns the claimed generation;
    /// any run holding an older generation must abort without writing.
    pub async fn begin_processing(&self, doc_id: &str) -> Result<i64> {
        let now = now_epoch();
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET processing_generation = processing_generation + 1,
                status = 'processing',
                status_detail = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(doc_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        }

        let generation: i64 =
            sqlx::query_scalar("SELECT processing_generation FROM documents WHERE id = ?")
                .bind(doc_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(generation)
    }

    /// Whether `generation` is still the document's current claim.
    pub async fn generation_current(&self, doc_id: &str, generation: i64) -> Result<bool> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT processing_generation FROM documents WHERE id = ?")
                .bind(doc_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(current == Some(generation))
    }

    pub async fn set_status(
        &self,
        doc_id: &str,
        status: DocumentStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET status = ?, status_detail = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(detail)
        .bind(now_epoch())
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist the extracted text so later phases and regeneration can
    /// re-chunk without re-reading the PDF.
    pub async fn set_extracted_text(&self, doc_id: &str, text: &str) -> Result<()> {
        sqlx::query("UPDATE documents SET extracted_text = ?, updated_at = ? WHERE id = ?")
            .bind(text)
            .bind(now_epoch())
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_document_counts(
        &self,
        doc_id: &str,
        page_count: Option<i64>,
        word_count: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET page_count = ?, word_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(page_count)
        .bind(word_count)
        .bind(now_epoch())
        .bind(doc_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a document and everything derived from it, vectors
    /// included.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["chunks", "summaries", "clauses", "facts"] {
            sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", table))
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM chunk_vectors WHERE doc_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- chunks ----

    /// Replace a document's chunks with a fresh set, indices starting
    /// at 0 in text order.
    pub async fn replace_chunks(&self, doc_id: &str, texts: &[String]) -> Result<Vec<Chunk>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        let mut chunks = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let chunk = Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: doc_id.to_string(),
                chunk_index: i as i64,
                text: text.clone(),
                word_count: crate::chunk::word_count(text) as i64,
                embedded: 0,
            };
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, word_count, embedded)
                VALUES (?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.word_count)
            .execute(&mut *tx)
            .await?;
            chunks.push(chunk);
        }
        tx.commit().await?;
        Ok(chunks)
    }

    pub async fn chunks_for_document(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        Ok(sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_chunk_embedded(&self, chunk_id: &str) -> Result<()> {
        sqlx::query("UPDATE chunks SET embedded = 1 WHERE id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- analysis artifacts ----

    pub async fn insert_summary(
        &self,
        doc_id: &str,
        content: &str,
        tokens_used: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO summaries (id, document_id, content, tokens_used, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(doc_id)
        .bind(content)
        .bind(tokens_used)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_summary(&self, doc_id: &str) -> Result<Option<SummaryRecord>> {
        Ok(sqlx::query_as::<_, SummaryRecord>(
            "SELECT * FROM summaries WHERE document_id = ? ORDER BY created_at DESC, id LIMIT 1",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Replace a document's clause set. Clauses regenerate as a unit,
    /// so stale rows from a prior run never mix with fresh ones.
    pub async fn replace_clauses(
        &self,
        doc_id: &str,
        clauses: &[crate::analysis::ExtractedClause],
    ) -> Result<usize> {
        let now = now_epoch();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM clauses WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        for clause in clauses {
            sqlx::query(
                r#"
                INSERT INTO clauses
                    (id, document_id, clause_type, text, risk_level, explanation, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(doc_id)
            .bind(&clause.clause_type)
            .bind(&clause.text)
            .bind(if clause.risk_level.is_empty() {
                "unknown"
            } else {
                clause.risk_level.as_str()
            })
            .bind(&clause.explanation)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(clauses.len())
    }

    pub async fn list_clauses(&self, doc_id: &str) -> Result<Vec<ClauseRecord>> {
        Ok(sqlx::query_as::<_, ClauseRecord>(
            "SELECT * FROM clauses WHERE document_id = ? ORDER BY created_at, id",
        )
        .bind(doc_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert_facts(&self, doc_id: &str, facts: &serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO facts (id, document_id, facts_json, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(doc_id)
        .bind(facts.to_string())
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn latest_facts(&self, doc_id: &str) -> Result<Option<FactsRecord>> {
        Ok(sqlx::query_as::<_, FactsRecord>(
            "SELECT * FROM facts WHERE document_id = ? ORDER BY created_at DESC, id LIMIT 1",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // ---- chat ----

    #[allow(clippy::too_many_arguments)]
    pub async fn append_chat_message(
        &self,
        session_id: &str,
        firm_id: &str,
        document_id: Option<&str>,
        message_type: &str,
        content: &str,
        tokens_used: i64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO chat_messages
                (id, session_id, firm_id, document_id, message_type, content, tokens_used, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(firm_id)
        .bind(document_id)
        .bind(message_type)
        .bind(content)
        .bind(tokens_used)
        .bind(now_epoch())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Most recent `limit` messages for a session, oldest first. The
    /// firm filter keeps a guessed session id from leaking another
    /// tenant's conversation into the prompt.
    pub async fn recent_history(
        &self,
        session_id: &str,
        firm_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(
            r#"
            SELECT * FROM chat_messages
            WHERE session_id = ? AND firm_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(firm_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        messages.reverse();
        Ok(messages)
    }

    // ---- usage & audit (best effort) ----

    pub async fn bump_usage(&self, firm_id: &str, metric: &str, delta: i64) {
        let period = crate::models::current_period();
        let result = sqlx::query(
            r#"
            INSERT INTO usage_metrics (firm_id, period, metric, value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(firm_id, period, metric) DO UPDATE SET
                value = value + excluded.value
            "#,
        )
        .bind(firm_id)
        .bind(&period)
        .bind(metric)
        .bind(delta)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(firm_id, metric, error = %e, "usage metering write failed");
        }
    }

    pub async fn usage_for_period(&self, firm_id: &str, period: &str) -> Result<Vec<(String, i64)>> {
        Ok(sqlx::query_as(
            "SELECT metric, value FROM usage_metrics WHERE firm_id = ? AND period = ? ORDER BY metric",
        )
        .bind(firm_id)
        .bind(period)
        .fetch_all(&self.pool)
        .await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn log_audit(
        &self,
        firm_id: &str,
        user_id: Option<&str>,
        action: &str,
        resource_type: &str,
        resource_id: Option<&str>,
        detail: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, firm_id, user_id, action, resource_type, resource_id, detail, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(firm_id)
        .bind(user_id)
        .bind(action)
        .bind(resource_type)
        .bind(resource_id)
        .bind(detail)
        .bind(now_epoch())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(firm_id, action, error = %e, "audit log write failed");
        }
    }
}
