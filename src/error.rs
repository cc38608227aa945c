//! Typed errors for the ingestion and retrieval pipeline.
//!
//! Library code returns [`Error`]; the CLI binary wraps everything in
//! `anyhow`. The variants mirror the pipeline's propagation policy:
//! extraction failures are terminal for a document, per-artifact failures
//! are logged and skipped, and stale-generation aborts leave the document
//! record untouched.

use thiserror::Error;

/// How much of a malformed provider response is kept for diagnostics.
const RAW_SNIPPET_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum Error {
    /// Text extraction failed outright (unreadable/corrupt file).
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Extraction succeeded but yielded no text (e.g. scanned pages).
    #[error("no text extracted from document")]
    ExtractionEmpty,

    /// The completion provider rejected or failed the request.
    #[error("completion provider error: {0}")]
    CompletionProvider(String),

    /// The provider answered, but not with parseable JSON.
    #[error("invalid JSON from provider: {reason}")]
    CompletionParse { reason: String, raw: String },

    /// The configured provider has no embedding capability.
    #[error("embeddings unavailable for provider '{0}'")]
    EmbeddingUnavailable(String),

    /// Vector index operation failed.
    #[error("vector index error: {0}")]
    VectorIndex(String),

    /// Configuration contract violated (missing key, bad value).
    #[error("configuration error: {0}")]
    Config(String),

    /// A newer processing run owns this document; this run must abort.
    #[error("stale processing generation for document {0}")]
    StaleGeneration(String),

    /// Document lookup came up empty.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The processing queue is at capacity.
    #[error("job queue is full, try again later")]
    QueueFull,

    /// A queued job exceeded its wall-clock budget.
    #[error("job timed out after {0}s")]
    JobTimeout(u64),

    /// The worker executing a job went away before reporting a result.
    #[error("worker dropped the job before completion")]
    JobLost,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a parse error, truncating the raw response for diagnostics.
    pub fn completion_parse(reason: impl Into<String>, raw: &str) -> Self {
        let snippet: String = raw.chars().take(RAW_SNIPPET_LEN).collect();
        Error::CompletionParse {
            reason: reason.into(),
            raw: snippet,
        }
    }

    /// Whether this error aborts the whole processing job (as opposed to
    /// a single artifact or chunk).
    pub fn is_fatal_for_document(&self) -> bool {
        matches!(
            self,
            Error::Extraction(_) | Error::ExtractionEmpty | Error::StaleGeneration(_)
        )
    }
}

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_truncates_raw() {
        let raw = "x".repeat(500);
        let err = Error::completion_parse("unexpected token", &raw);
        match err {
            Error::CompletionParse { raw, .. } => assert_eq!(raw.len(), 200),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn fatality_classification() {
        assert!(Error::ExtractionEmpty.is_fatal_for_document());
        assert!(Error::Extraction("bad xref".into()).is_fatal_for_document());
        assert!(!Error::CompletionProvider("503".into()).is_fatal_for_document());
        assert!(!Error::EmbeddingUnavailable("perplexity".into()).is_fatal_for_document());
    }
}
