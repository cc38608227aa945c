//! Vector index and chat retrieval tests with mocked embeddings.

use std::path::Path;
use tempfile::TempDir;

use lexdock::chat::answer_question;
use lexdock::config::{
    AiConfig, ChunkingConfig, Config, DbConfig, EmbeddingConfig, RetrievalConfig, StorageConfig,
    WorkerConfig,
};
use lexdock::db;
use lexdock::error::Error;
use lexdock::index::{VectorIndex, VectorRecord};
use lexdock::migrate::run_migrations;
use lexdock::store::Store;
use lexdock::testing::{mock_embedding, MockModel, MOCK_DIMS};

fn test_config(root: &Path) -> Config {
    Config {
        db: DbConfig {
            path: root.join("lexdock.sqlite"),
            max_connections: 5,
        },
        storage: StorageConfig {
            upload_dir: root.join("uploads"),
        },
        chunking: ChunkingConfig::default(),
        ai: AiConfig::default(),
        embedding: EmbeddingConfig {
            model: "mock".to_string(),
            dims: MOCK_DIMS,
            input_char_limit: 8000,
        },
        retrieval: RetrievalConfig {
            top_k: 3,
            history_turns: 6,
            excerpt_chars: 1000,
        },
        worker: WorkerConfig::default(),
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

fn record(doc: &str, firm: &str, idx: i64, text: &str) -> VectorRecord {
    VectorRecord {
        doc_id: doc.to_string(),
        firm_id: firm.to_string(),
        chunk_index: idx,
        excerpt: text.to_string(),
        embedding: mock_embedding(text),
    }
}

#[tokio::test]
async fn query_ranks_matching_text_first() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    index
        .upsert(&[
            record("doc-1", "firm-a", 0, "termination requires ninety days written notice"),
            record("doc-1", "firm-a", 1, "payment is due within thirty days of invoice"),
            record("doc-1", "firm-a", 2, "governing law is the state of delaware"),
        ])
        .await
        .unwrap();

    let query = mock_embedding("termination requires ninety days written notice");
    let results = index.query("firm-a", None, &query, 3).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].chunk_index, 0);
    assert!((results[0].score - 1.0).abs() < 1e-5);
    assert!(results[0].score > results[2].score);
}

#[tokio::test]
async fn queries_never_cross_firm_boundaries() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    index
        .upsert(&[
            record("doc-a", "firm-a", 0, "confidentiality obligations survive termination"),
            record("doc-b", "firm-b", 0, "confidentiality obligations survive termination"),
        ])
        .await
        .unwrap();

    let query = mock_embedding("confidentiality obligations");
    let results = index.query("firm-a", None, &query, 10).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].doc_id, "doc-a");
}

#[tokio::test]
async fn doc_scope_restricts_results() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    index
        .upsert(&[
            record("doc-a", "firm-a", 0, "indemnification for third party claims"),
            record("doc-b", "firm-a", 0, "indemnification for third party claims"),
        ])
        .await
        .unwrap();

    let query = mock_embedding("indemnification");
    let results = index
        .query("firm-a", Some("doc-b"), &query, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].doc_id, "doc-b");
}

#[tokio::test]
async fn upsert_overwrites_by_vector_id() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    index
        .upsert(&[record("doc-1", "firm-a", 0, "old text about liability")])
        .await
        .unwrap();
    index
        .upsert(&[record("doc-1", "firm-a", 0, "new text about indemnity")])
        .await
        .unwrap();

    assert_eq!(index.stats().await.total_vectors, 1);
    let query = mock_embedding("new text about indemnity");
    let results = index.query("firm-a", None, &query, 1).await.unwrap();
    assert!(results[0].excerpt.contains("new text"));
}

#[tokio::test]
async fn index_rejects_bad_vectors() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    let mut wrong_dims = record("doc-1", "firm-a", 0, "text");
    wrong_dims.embedding = vec![1.0; MOCK_DIMS + 1];
    assert!(matches!(
        index.upsert(&[wrong_dims]).await.unwrap_err(),
        Error::VectorIndex(_)
    ));

    let mut zeroed = record("doc-1", "firm-a", 0, "text");
    zeroed.embedding = vec![0.0; MOCK_DIMS];
    assert!(matches!(
        index.upsert(&[zeroed]).await.unwrap_err(),
        Error::VectorIndex(_)
    ));

    let query_short = vec![1.0; 3];
    assert!(matches!(
        index.query("firm-a", None, &query_short, 5).await.unwrap_err(),
        Error::VectorIndex(_)
    ));
}

#[tokio::test]
async fn top_k_caps_result_count() {
    let tmp = TempDir::new().unwrap();
    let (_config, _store, index) = setup(tmp.path()).await;

    let records: Vec<VectorRecord> = (0..10)
        .map(|i| record("doc-1", "firm-a", i, &format!("clause number {} of the contract", i)))
        .collect();
    index.upsert(&records).await.unwrap();

    let query = mock_embedding("clause number");
    let results = index.query("firm-a", None, &query, 4).await.unwrap();
    assert_eq!(results.len(), 4);
}

#[tokio::test]
async fn empty_index_yields_refusal_without_provider_call() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    let answer = answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        None,
        None,
        "What is the notice period?",
    )
    .await
    .unwrap();

    assert!(answer.answer.contains("I don't have enough information"));
    assert!(answer.sources.is_empty());
    assert_eq!(answer.tokens_used, 0);
    assert_eq!(model.completion_calls(), 0);

    // Both sides of the exchange are still persisted.
    let history = store
        .recent_history(&answer.session_id, "firm-a", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message_type, "user");
    assert_eq!(history[1].message_type, "assistant");
}

#[tokio::test]
async fn chat_answers_from_retrieved_context() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    index
        .upsert(&[
            record("doc-1", "firm-a", 0, "the notice period for termination is ninety days"),
            record("doc-1", "firm-a", 1, "payment terms are net thirty"),
        ])
        .await
        .unwrap();

    let answer = answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        Some("doc-1"),
        None,
        "What is the notice period for termination?",
    )
    .await
    .unwrap();

    assert_eq!(model.completion_calls(), 1);
    assert!(!answer.sources.is_empty());
    assert_eq!(answer.sources[0].chunk_index, 0);
    assert!(answer.tokens_used > 0);

    // Follow-up in the same session carries history.
    let followup = answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        Some("doc-1"),
        Some(&answer.session_id),
        "And the payment terms?",
    )
    .await
    .unwrap();

    assert_eq!(followup.session_id, answer.session_id);
    let history = store
        .recent_history(&answer.session_id, "firm-a", 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn unreachable_index_yields_refusal_not_error() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    sqlx::query("DROP TABLE chunk_vectors")
        .execute(store.pool())
        .await
        .unwrap();

    let answer = answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        None,
        None,
        "What is the notice period?",
    )
    .await
    .unwrap();

    assert!(answer.answer.contains("I don't have enough information"));
    assert!(answer.sources.is_empty());
    assert_eq!(model.completion_calls(), 0);
}

#[tokio::test]
async fn embedding_outage_yields_refusal_not_error() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();
    model.fail_embeddings(true);

    index
        .upsert(&[record("doc-1", "firm-a", 0, "notice period is ninety days")])
        .await
        .unwrap();

    let answer = answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        None,
        None,
        "What is the notice period?",
    )
    .await
    .unwrap();

    assert!(answer.answer.contains("I don't have enough information"));
    assert!(answer.sources.is_empty());
    assert_eq!(answer.tokens_used, 0);
    assert_eq!(model.completion_calls(), 0);
}

#[tokio::test]
async fn history_never_crosses_firm_boundaries() {
    let tmp = TempDir::new().unwrap();
    let (_config, store, _index) = setup(tmp.path()).await;

    store
        .append_chat_message("session-1", "firm-a", None, "user", "our question", 0)
        .await
        .unwrap();
    store
        .append_chat_message("session-1", "firm-b", None, "user", "their question", 0)
        .await
        .unwrap();

    let history = store.recent_history("session-1", "firm-a", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "our question");
}

#[tokio::test]
async fn chat_usage_is_metered() {
    let tmp = TempDir::new().unwrap();
    let (config, store, index) = setup(tmp.path()).await;
    let model = MockModel::new();

    index
        .upsert(&[record("doc-1", "firm-a", 0, "liability cap equals fees paid")])
        .await
        .unwrap();

    answer_question(
        &store,
        &index,
        &model,
        &config,
        "firm-a",
        None,
        None,
        "Is there a liability cap?",
    )
    .await
    .unwrap();

    let usage = store
        .usage_for_period("firm-a", &lexdock::models::current_period())
        .await
        .unwrap();
    let metric = |name: &str| usage.iter().find(|(m, _)| m == name).map(|(_, v)| *v);
    assert_eq!(metric("chats"), Some(1));
    assert!(metric("ai_tokens").unwrap() > 0);
}
