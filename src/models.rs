//! Core data types shared across the pipeline, store, and CLI.

use serde::{Deserialize, Serialize};

/// Document lifecycle status.
///
/// `CompletedDegraded` marks documents whose analysis finished but whose
/// chunks could not be embedded, so they are invisible to retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    CompletedDegraded,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::CompletedDegraded => "completed_degraded",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "completed_degraded" => Some(DocumentStatus::CompletedDegraded),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::CompletedDegraded | DocumentStatus::Failed
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Document {
    pub id: String,
    pub firm_id: String,
    pub uploaded_by: Option<String>,
    pub filename: String,
    pub file_path: String,
    pub content_hash: String,
    pub extracted_text: Option<String>,
    pub status: String,
    pub status_detail: Option<String>,
    pub processing_generation: i64,
    pub page_count: Option<i64>,
    pub word_count: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    pub fn status(&self) -> Option<DocumentStatus> {
        DocumentStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub word_count: i64,
    pub embedded: i64,
}

/// A chunk returned from vector search, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub vector_id: String,
    pub doc_id: String,
    pub chunk_index: i64,
    pub excerpt: String,
    pub score: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub firm_id: String,
    pub document_id: Option<String>,
    pub message_type: String,
    pub content: String,
    pub tokens_used: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SummaryRecord {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub tokens_used: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClauseRecord {
    pub id: String,
    pub document_id: String,
    pub clause_type: String,
    pub text: String,
    pub risk_level: String,
    pub explanation: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FactsRecord {
    pub id: String,
    pub document_id: String,
    pub facts_json: String,
    pub created_at: i64,
}

/// Outcome of one processing run, reported by the pipeline to the CLI.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub document_id: String,
    pub status: String,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub summary_generated: bool,
    pub clauses_extracted: usize,
    pub facts_extracted: bool,
    pub tokens_used: i64,
    pub elapsed_ms: u128,
    /// Set when the vector index rejected the run's writes; the
    /// document completes degraded and `regenerate` can recover it.
    pub index_error: Option<String>,
}

/// A chat turn's result: the answer plus provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub session_id: String,
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub tokens_used: i64,
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current month bucket for usage metering, e.g. "2026-08".
pub fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}
