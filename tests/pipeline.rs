//! End-to-end pipeline tests over a temporary database and synthesized
//! PDFs, with the language model mocked.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use lexdock::config::{
    AiConfig, ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, StorageConfig,
    WorkerConfig,
};
use lexdock::context::AppContext;
use lexdock::db;
use lexdock::error::Error;
use lexdock::index::VectorIndex;
use lexdock::migrate::run_migrations;
use lexdock::models::current_period;
use lexdock::pipeline::{process_document, regenerate_embeddings, register_upload};
use lexdock::store::Store;
use lexdock::testing::{MockModel, MOCK_DIMS};
use lexdock::worker::{Job, WorkerPool};

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("lexdock.sqlite"),
            max_connections: 5,
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
        },
        chunking: ChunkingConfig {
            chunk_size: 40,
            overlap: 8,
        },
        ai: AiConfig::default(),
        embedding: EmbeddingConfig {
            model: "mock".to_string(),
            dims: MOCK_DIMS,
            input_char_limit: 8000,
        },
        retrieval: RetrievalConfig::default(),
        worker: WorkerConfig {
            workers: 2,
            queue_depth: 8,
            job_timeout_secs: 60,
        },
    }
}

async fn setup(root: &Path) -> (Config, Store, VectorIndex) {
    let config = test_config(root);
    let pool = db::connect(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    let store = Store::new(pool.clone());
    let index = VectorIndex::new(pool, MOCK_DIMS, config.retrieval.excerpt_chars);
    (config, store, index)
}

/// Build a one-page PDF containing `text` (Helvetica, no embedded font).
fn pdf_with_text(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn contract_text() -> String {
    let mut words = vec![
        "This services agreement between Acme Corp and Beta LLC covers payment terms".to_string(),
    ];
    for i in 0..80 {
        words.push(format!("clause{}", i));
    }
    words.join(" ")
}

#[tokio::test]
async fn full_pipeline_completes_document() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();

    let document = register_upload(&store, &config, "firm-a", Some("alice"), &pdf_path)
        .await
        .unwrap();
    assert_eq!(document.status, "pending");

    let report = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(report.status, "completed");
    assert!(report.chunks_total >= 2, "expected overlapping windows");
    assert_eq!(report.chunks_embedded, report.chunks_total);
    assert!(report.summary_generated);
    assert_eq!(report.clauses_extracted, 1);
    assert!(report.facts_extracted);
    assert!(report.tokens_used > 0);

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "completed");
    assert!(refreshed.word_count.unwrap() > 0);
    assert!(refreshed
        .extracted_text
        .as_deref()
        .unwrap()
        .contains("services agreement"));

    let summary = store.latest_summary(&document.id).await.unwrap().unwrap();
    assert!(summary.content.contains("services agreement"));
    let clauses = store.list_clauses(&document.id).await.unwrap();
    assert_eq!(clauses.len(), 1);
    assert_eq!(clauses[0].clause_type, "liability");
    assert!(store.latest_facts(&document.id).await.unwrap().is_some());

    let stats = index.stats().await;
    assert_eq!(stats.total_vectors as usize, report.chunks_embedded);

    let usage = store
        .usage_for_period("firm-a", &current_period())
        .await
        .unwrap();
    let metric = |name: &str| usage.iter().find(|(m, _)| m == name).map(|(_, v)| *v);
    assert_eq!(metric("docs_uploaded"), Some(1));
    assert!(metric("ai_tokens").unwrap() > 0);
}

#[tokio::test]
async fn unreadable_pdf_fails_document_without_artifacts() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let bad_path = tmp.path().join("bad.pdf");
    std::fs::write(&bad_path, b"not a pdf at all").unwrap();

    let document = register_upload(&store, &config, "firm-a", None, &bad_path)
        .await
        .unwrap();
    let err = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Extraction(_)));

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "failed");
    assert!(refreshed.status_detail.is_some());
    assert!(store.chunks_for_document(&document.id).await.unwrap().is_empty());
    assert!(store.latest_summary(&document.id).await.unwrap().is_none());
    assert_eq!(model.completion_calls(), 0);
}

#[tokio::test]
async fn textless_pdf_fails_document_without_artifacts() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    // Parseable PDF, but the page carries no text at all.
    let blank_path = tmp.path().join("scanned.pdf");
    std::fs::write(&blank_path, pdf_with_text("")).unwrap();

    let document = register_upload(&store, &config, "firm-a", None, &blank_path)
        .await
        .unwrap();
    let err = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExtractionEmpty));

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "failed");
    assert!(store.chunks_for_document(&document.id).await.unwrap().is_empty());
    assert!(store.latest_summary(&document.id).await.unwrap().is_none());
}

#[tokio::test]
async fn index_rejection_degrades_instead_of_stranding_in_processing() {
    let tmp = TempDir::new().unwrap();
    let (config, store, _index) = setup(tmp.path()).await;
    let model = MockModel::new();

    // Index configured for a different dimensionality than the model
    // produces; every upsert is rejected.
    let mismatched = VectorIndex::new(
        store.pool().clone(),
        MOCK_DIMS + 1,
        config.retrieval.excerpt_chars,
    );

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();

    let report = process_document(&store, &mismatched, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(report.status, "completed_degraded");
    assert_eq!(report.chunks_embedded, 0);
    assert!(report.index_error.is_some());
    assert!(report.summary_generated);

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "completed_degraded");
}

#[tokio::test]
async fn unexpected_store_failure_marks_document_failed() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();

    // Break the summaries table so the summary write blows up mid-run.
    sqlx::query("DROP TABLE summaries")
        .execute(store.pool())
        .await
        .unwrap();

    let err = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "failed");
    assert!(refreshed.status_detail.is_some());
}

#[tokio::test]
async fn embedding_outage_degrades_but_keeps_analysis() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();
    model.fail_embeddings(true);

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();

    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();
    let report = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(report.status, "completed_degraded");
    assert_eq!(report.chunks_embedded, 0);
    assert!(report.summary_generated);

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "completed_degraded");
    assert!(refreshed.status_detail.unwrap().contains("invisible to retrieval"));
    assert_eq!(index.stats().await.total_vectors, 0);
}

#[tokio::test]
async fn analysis_failure_is_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();
    // First completion (summary) returns unparseable JSON; the rest fall
    // back to canned responses.
    model.push_response("I refuse to answer in JSON.");

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();

    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();
    let report = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(report.status, "completed");
    assert!(!report.summary_generated);
    assert_eq!(report.clauses_extracted, 1);
    assert!(report.facts_extracted);
    assert!(store.latest_summary(&document.id).await.unwrap().is_none());
}

#[tokio::test]
async fn regeneration_replaces_vectors_without_reanalysis() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();

    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();
    let first = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();
    let completions_after_process = model.completion_calls();

    let second = regenerate_embeddings(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(second.status, "completed");
    assert_eq!(second.chunks_total, first.chunks_total);
    assert_eq!(second.chunks_embedded, first.chunks_embedded);
    // No new analysis calls, only embeddings.
    assert_eq!(model.completion_calls(), completions_after_process);
    assert_eq!(
        index.stats().await.total_vectors as usize,
        first.chunks_embedded
    );

    let refreshed = store.get_document(&document.id).await.unwrap();
    assert!(refreshed.processing_generation >= 2);
}

#[tokio::test]
async fn regenerating_twice_keeps_chunk_and_vector_counts_stable() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();
    let first = process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    let once = regenerate_embeddings(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();
    let twice = regenerate_embeddings(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();

    assert_eq!(once.chunks_total, first.chunks_total);
    assert_eq!(twice.chunks_total, first.chunks_total);
    let chunks = store.chunks_for_document(&document.id).await.unwrap();
    assert_eq!(chunks.len(), first.chunks_total);
    // Vector ids are keyed by chunk index, so repeated runs overwrite
    // rather than accumulate.
    assert_eq!(
        index.stats().await.total_vectors as usize,
        first.chunks_total
    );
}

#[tokio::test]
async fn stale_generation_loses_to_newer_claim() {
    let tmp = TempDir::new().unwrap();
    let (config, store, _index) = setup(tmp.path()).await;

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();

    let old = store.begin_processing(&document.id).await.unwrap();
    let new = store.begin_processing(&document.id).await.unwrap();
    assert_eq!(new, old + 1);
    assert!(!store.generation_current(&document.id, old).await.unwrap());
    assert!(store.generation_current(&document.id, new).await.unwrap());
}

#[tokio::test]
async fn delete_purges_document_and_derived_rows() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();
    process_document(&store, &index, &model, &config, &document.id)
        .await
        .unwrap();
    assert!(index.stats().await.total_vectors > 0);

    store.delete_document(&document.id).await.unwrap();

    assert!(matches!(
        store.get_document(&document.id).await.unwrap_err(),
        Error::DocumentNotFound(_)
    ));
    assert!(store.chunks_for_document(&document.id).await.unwrap().is_empty());
    assert_eq!(index.stats().await.total_vectors, 0);
}

#[tokio::test]
async fn worker_pool_processes_submitted_jobs() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let pool_db = db::connect(&config).await.unwrap();
    run_migrations(&pool_db).await.unwrap();
    let store = Store::new(pool_db.clone());
    let index = VectorIndex::new(pool_db.clone(), MOCK_DIMS, config.retrieval.excerpt_chars);

    let pdf_path = tmp.path().join("contract.pdf");
    std::fs::write(&pdf_path, pdf_with_text(&contract_text())).unwrap();
    let document = register_upload(&store, &config, "firm-a", None, &pdf_path)
        .await
        .unwrap();

    let ctx = Arc::new(AppContext {
        config,
        pool: pool_db,
        store: store.clone(),
        index,
        model: Box::new(MockModel::new()),
    });
    let workers = WorkerPool::start(Arc::clone(&ctx));

    let handle = workers
        .submit(Job::Process {
            doc_id: document.id.clone(),
        })
        .unwrap();
    let report = handle.wait().await.unwrap();
    workers.shutdown().await;

    assert_eq!(report.status, "completed");
    let refreshed = store.get_document(&document.id).await.unwrap();
    assert_eq!(refreshed.status, "completed");
}
