//! Document processing pipeline.
//!
//! Drives a document from upload through extraction, chunking, AI
//! analysis, and embedding. Each run claims the document by bumping its
//! processing generation; a run that discovers a newer claim aborts
//! without touching the record, so the later run's writes win.
//!
//! Failure policy, per phase:
//! - extraction failure → document `failed`, nothing written
//! - a single analysis failure → logged and skipped, run continues
//! - a single chunk embedding failure → chunk skipped, run continues
//! - vector index failure → run continues, surfaced in the report
//! - zero chunks embedded → `completed_degraded` (analysis artifacts
//!   exist, retrieval does not see the document)
//! - any other error → document `failed` with the error as detail,
//!   never left in `processing`

use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::analysis;
use crate::chunk::{chunk_text, word_count};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract;
use crate::index::{VectorIndex, VectorRecord};
use crate::models::{Document, DocumentStatus, ProcessReport};
use crate::provider::LanguageModel;
use crate::store::Store;

/// Register an uploaded file: copy it into the upload directory, hash
/// it, and create the `pending` document record.
pub async fn register_upload(
    store: &Store,
    config: &Config,
    firm_id: &str,
    uploaded_by: Option<&str>,
    source_path: &Path,
) -> Result<Document> {
    let bytes = std::fs::read(source_path)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let filename = source_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.pdf".to_string());

    std::fs::create_dir_all(&config.storage.upload_dir)?;
    let stored_path = config
        .storage
        .upload_dir
        .join(format!("{}_{}", &content_hash[..12], filename));
    std::fs::write(&stored_path, &bytes)?;

    let document = store
        .create_document(
            firm_id,
            uploaded_by,
            &filename,
            &stored_path.to_string_lossy(),
            &content_hash,
        )
        .await?;

    store.bump_usage(firm_id, "docs_uploaded", 1).await;
    store
        .log_audit(
            firm_id,
            uploaded_by,
            "document.uploaded",
            "document",
            Some(&document.id),
            Some(&filename),
        )
        .await;

    Ok(document)
}

/// Run the full pipeline for a document. Returns a report of what each
/// phase produced.
///
/// Any error after the run claims the document flips its status to
/// `failed`, except a stale-generation abort, which belongs to the
/// newer run.
pub async fn process_document(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    config: &Config,
    doc_id: &str,
) -> Result<ProcessReport> {
    let document = store.get_document(doc_id).await?;
    let generation = store.begin_processing(doc_id).await?;
    info!(doc_id, generation, "processing started");

    match run_processing(store, index, model, config, &document, generation).await {
        Ok(report) => Ok(report),
        Err(e @ Error::StaleGeneration(_)) => Err(e),
        Err(e) => fail_document(store, doc_id, generation, e).await,
    }
}

async fn run_processing(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    config: &Config,
    document: &Document,
    generation: i64,
) -> Result<ProcessReport> {
    let started = Instant::now();
    let doc_id = document.id.as_str();
    let mut report = ProcessReport {
        document_id: doc_id.to_string(),
        ..Default::default()
    };

    // Extraction. Terminal on failure.
    let bytes = std::fs::read(&document.file_path).map_err(|e| Error::Extraction(e.to_string()))?;
    let text = extract::extract_pdf_text(&bytes)?;
    let pages = extract::page_count(&bytes);

    // Persist the text while still `processing` so partial progress is
    // visible and regeneration can re-chunk without the PDF.
    ensure_current(store, doc_id, generation).await?;
    store.set_extracted_text(doc_id, &text).await?;

    // Chunking.
    let texts = chunk_text(&text, config.chunking.chunk_size, config.chunking.overlap);
    if texts.is_empty() {
        return Err(Error::ExtractionEmpty);
    }
    let chunks = store.replace_chunks(doc_id, &texts).await?;
    store
        .set_document_counts(doc_id, pages, word_count(&text) as i64)
        .await?;
    report.chunks_total = chunks.len();

    // AI analysis. Individual failures are logged and skipped.
    ensure_current(store, doc_id, generation).await?;
    match analysis::generate_summary(model, &config.ai, &text).await {
        Ok(analyzed) => {
            let content = serde_json::to_string(&serde_json::json!({
                "document_type": analyzed.value.document_type,
                "summary": analyzed.value.summary,
                "key_parties": analyzed.value.key_parties,
                "critical_dates": analyzed.value.critical_dates,
                "key_obligations": analyzed.value.key_obligations,
                "risk_level": analyzed.value.risk_level,
            }))?;
            store
                .insert_summary(doc_id, &content, analyzed.tokens_used)
                .await?;
            report.summary_generated = true;
            report.tokens_used += analyzed.tokens_used;
        }
        Err(e) => warn!(doc_id, error = %e, "summary generation failed, skipping"),
    }

    ensure_current(store, doc_id, generation).await?;
    match analysis::extract_clauses(model, &config.ai, &text).await {
        Ok(analyzed) => {
            report.clauses_extracted = store.replace_clauses(doc_id, &analyzed.value).await?;
            report.tokens_used += analyzed.tokens_used;
        }
        Err(e) => warn!(doc_id, error = %e, "clause extraction failed, skipping"),
    }

    ensure_current(store, doc_id, generation).await?;
    match analysis::extract_facts(model, &config.ai, &text).await {
        Ok(analyzed) => {
            store.insert_facts(doc_id, &analyzed.value).await?;
            report.facts_extracted = true;
            report.tokens_used += analyzed.tokens_used;
        }
        Err(e) => warn!(doc_id, error = %e, "fact extraction failed, skipping"),
    }

    // Embedding and indexing.
    ensure_current(store, doc_id, generation).await?;
    let outcome = embed_and_index(store, index, model, document, &chunks).await?;
    report.chunks_embedded = outcome.written;
    report.index_error = outcome.index_error;

    // Terminal status.
    ensure_current(store, doc_id, generation).await?;
    let status = finish_run(store, doc_id, &mut report).await?;
    report.elapsed_ms = started.elapsed().as_millis();

    if report.tokens_used > 0 {
        store
            .bump_usage(&document.firm_id, "ai_tokens", report.tokens_used)
            .await;
    }
    store
        .log_audit(
            &document.firm_id,
            document.uploaded_by.as_deref(),
            "document.processed",
            "document",
            Some(doc_id),
            Some(status.as_str()),
        )
        .await;

    info!(
        doc_id,
        status = status.as_str(),
        chunks = report.chunks_total,
        embedded = report.chunks_embedded,
        "processing finished"
    );
    Ok(report)
}

/// Re-embed a document from its persisted extracted text: re-chunk,
/// replace the chunk rows, and swap the vectors. Extraction and
/// analysis are not re-run. Idempotent; running it twice yields the
/// same chunk set and vector ids.
pub async fn regenerate_embeddings(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    config: &Config,
    doc_id: &str,
) -> Result<ProcessReport> {
    let document = store.get_document(doc_id).await?;
    let Some(text) = document.extracted_text.clone() else {
        return Err(Error::Extraction(format!(
            "document {} has no extracted text; re-upload required",
            doc_id
        )));
    };

    let generation = store.begin_processing(doc_id).await?;
    info!(doc_id, generation, "embedding regeneration started");

    match run_regeneration(store, index, model, config, &document, &text, generation).await {
        Ok(report) => Ok(report),
        Err(e @ Error::StaleGeneration(_)) => Err(e),
        Err(e) => fail_document(store, doc_id, generation, e).await,
    }
}

async fn run_regeneration(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    config: &Config,
    document: &Document,
    text: &str,
    generation: i64,
) -> Result<ProcessReport> {
    let started = Instant::now();
    let doc_id = document.id.as_str();
    let mut report = ProcessReport {
        document_id: doc_id.to_string(),
        ..Default::default()
    };

    ensure_current(store, doc_id, generation).await?;
    let texts = chunk_text(text, config.chunking.chunk_size, config.chunking.overlap);
    if texts.is_empty() {
        return Err(Error::ExtractionEmpty);
    }
    let chunks = store.replace_chunks(doc_id, &texts).await?;
    report.chunks_total = chunks.len();

    ensure_current(store, doc_id, generation).await?;
    let outcome = embed_and_index(store, index, model, document, &chunks).await?;
    report.chunks_embedded = outcome.written;
    report.index_error = outcome.index_error;

    ensure_current(store, doc_id, generation).await?;
    finish_run(store, doc_id, &mut report).await?;
    report.elapsed_ms = started.elapsed().as_millis();
    Ok(report)
}

/// Write the terminal status for a run that got past extraction.
async fn finish_run(
    store: &Store,
    doc_id: &str,
    report: &mut ProcessReport,
) -> Result<DocumentStatus> {
    let status = if report.chunks_embedded > 0 {
        DocumentStatus::Completed
    } else {
        DocumentStatus::CompletedDegraded
    };
    let detail = (status == DocumentStatus::CompletedDegraded).then(|| {
        report
            .index_error
            .as_deref()
            .unwrap_or("no chunks embedded; document is invisible to retrieval")
    });
    store.set_status(doc_id, status, detail).await?;
    report.status = status.as_str().to_string();
    Ok(status)
}

struct EmbedOutcome {
    written: usize,
    index_error: Option<String>,
}

/// Embed chunks one by one, then atomically swap the document's vectors
/// for the fresh set. A per-chunk failure skips that chunk; a backend
/// with no embedding endpoint stops the loop after the first attempt.
/// Index failures leave the document unindexed but do not fail the run;
/// the error is carried into the report so operators can regenerate.
async fn embed_and_index(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    document: &Document,
    chunks: &[crate::models::Chunk],
) -> Result<EmbedOutcome> {
    let mut records = Vec::with_capacity(chunks.len());
    let mut embedded_chunk_ids = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        match model.embed(&chunk.text).await {
            Ok(embedding) => {
                records.push(VectorRecord {
                    doc_id: document.id.clone(),
                    firm_id: document.firm_id.clone(),
                    chunk_index: chunk.chunk_index,
                    excerpt: chunk.text.clone(),
                    embedding,
                });
                embedded_chunk_ids.push(chunk.id.clone());
            }
            Err(Error::EmbeddingUnavailable(provider)) => {
                warn!(
                    doc_id = %document.id,
                    provider,
                    "provider has no embedding endpoint, skipping all chunks"
                );
                break;
            }
            Err(e) => {
                warn!(
                    doc_id = %document.id,
                    chunk_index = chunk.chunk_index,
                    error = %e,
                    "chunk embedding failed, skipping"
                );
            }
        }
    }

    // Old vectors go first so a shrunken chunk set leaves no strays.
    if let Err(e) = index.delete_by_document(&document.id).await {
        warn!(doc_id = %document.id, error = %e, "vector delete failed, document left unindexed");
        return Ok(EmbedOutcome {
            written: 0,
            index_error: Some(e.to_string()),
        });
    }
    if records.is_empty() {
        return Ok(EmbedOutcome {
            written: 0,
            index_error: None,
        });
    }
    let written = match index.upsert(&records).await {
        Ok(n) => n,
        Err(e) => {
            warn!(doc_id = %document.id, error = %e, "vector upsert failed, document left unindexed");
            return Ok(EmbedOutcome {
                written: 0,
                index_error: Some(e.to_string()),
            });
        }
    };
    for chunk_id in &embedded_chunk_ids {
        store.mark_chunk_embedded(chunk_id).await?;
    }
    Ok(EmbedOutcome {
        written,
        index_error: None,
    })
}

async fn ensure_current(store: &Store, doc_id: &str, generation: i64) -> Result<()> {
    if !store.generation_current(doc_id, generation).await? {
        warn!(doc_id, generation, "newer processing run detected, aborting");
        return Err(Error::StaleGeneration(doc_id.to_string()));
    }
    Ok(())
}

/// Mark the document failed, unless a newer run owns it.
async fn fail_document(
    store: &Store,
    doc_id: &str,
    generation: i64,
    error: Error,
) -> Result<ProcessReport> {
    if store.generation_current(doc_id, generation).await? {
        store
            .set_status(doc_id, DocumentStatus::Failed, Some(&error.to_string()))
            .await?;
    }
    Err(error)
}
