//! # Lexdock CLI (`lexd`)
//!
//! Operator interface for the document intelligence backend.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexd init` | Create the SQLite database and run schema migrations |
//! | `lexd process <file> --firm <id>` | Register a PDF and run the full pipeline |
//! | `lexd regenerate <doc-id>` | Re-embed an already-processed document |
//! | `lexd chat "<question>" --firm <id>` | Ask a question over indexed documents |
//! | `lexd show <doc-id>` | Print a document's status, summary, clauses, and facts |
//! | `lexd delete <doc-id>` | Remove a document and everything derived from it |
//! | `lexd stats --firm <id>` | Document, index, and usage statistics |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lexdock::chat::answer_question;
use lexdock::config::load_config;
use lexdock::context::AppContext;
use lexdock::migrate::run_migrations;
use lexdock::models::current_period;
use lexdock::pipeline::register_upload;
use lexdock::worker::{Job, WorkerPool};
use lexdock::{db, store::Store};

/// Lexdock — legal document ingestion, analysis, and retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. API keys are read from the environment (`OPENAI_API_KEY`,
/// `OPENROUTER_API_KEY`, `PERPLEXITY_API_KEY`).
#[derive(Parser)]
#[command(
    name = "lexd",
    about = "Lexdock — legal document ingestion, analysis, and retrieval-augmented chat",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lexdock.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, summaries, clauses, facts, chunk_vectors,
    /// chat_messages, usage_metrics, audit_logs). Idempotent.
    Init,

    /// Register a PDF and run the full processing pipeline.
    ///
    /// Copies the file into the upload directory, then extracts text,
    /// chunks it, generates the AI analysis artifacts, and embeds the
    /// chunks into the vector index.
    Process {
        /// Path to the PDF file.
        file: PathBuf,

        /// Tenant the document belongs to.
        #[arg(long)]
        firm: String,

        /// Acting user recorded in the audit trail.
        #[arg(long)]
        user: Option<String>,
    },

    /// Re-embed an already-processed document's chunks.
    ///
    /// Skips extraction and analysis; useful after changing the
    /// embedding model.
    Regenerate {
        /// Document UUID.
        doc_id: String,
    },

    /// Ask a question over a firm's indexed documents.
    Chat {
        /// The question to answer.
        question: String,

        /// Tenant whose documents are searched.
        #[arg(long)]
        firm: String,

        /// Restrict retrieval to one document.
        #[arg(long)]
        doc: Option<String>,

        /// Continue an existing chat session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Print a document's status and analysis artifacts.
    Show {
        /// Document UUID.
        doc_id: String,
    },

    /// Remove a document and everything derived from it.
    Delete {
        /// Document UUID.
        doc_id: String,
    },

    /// Document, index, and usage statistics for a firm.
    Stats {
        /// Tenant to report on.
        #[arg(long)]
        firm: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized at {}", config.db.path.display());
        }

        Commands::Process { file, firm, user } => {
            let ctx = Arc::new(AppContext::connect(config).await?);
            let document =
                register_upload(&ctx.store, &ctx.config, &firm, user.as_deref(), &file).await?;
            println!("registered document: {}", document.id);

            let pool = WorkerPool::start(Arc::clone(&ctx));
            let handle = pool.submit(Job::Process {
                doc_id: document.id.clone(),
            })?;
            let report = handle.wait().await.context("processing failed")?;
            pool.shutdown().await;

            println!("status: {}", report.status);
            println!("chunks: {}", report.chunks_total);
            println!("chunks embedded: {}", report.chunks_embedded);
            println!("summary generated: {}", report.summary_generated);
            println!("clauses extracted: {}", report.clauses_extracted);
            println!("facts extracted: {}", report.facts_extracted);
            println!("tokens used: {}", report.tokens_used);
            println!("elapsed: {}ms", report.elapsed_ms);
            if let Some(err) = &report.index_error {
                println!("index error: {}", err);
            }
        }

        Commands::Regenerate { doc_id } => {
            let ctx = Arc::new(AppContext::connect(config).await?);
            let pool = WorkerPool::start(Arc::clone(&ctx));
            let handle = pool.submit(Job::Regenerate {
                doc_id: doc_id.clone(),
            })?;
            let report = handle.wait().await.context("regeneration failed")?;
            pool.shutdown().await;

            println!("status: {}", report.status);
            println!("chunks embedded: {}/{}", report.chunks_embedded, report.chunks_total);
            if let Some(err) = &report.index_error {
                println!("index error: {}", err);
            }
        }

        Commands::Chat {
            question,
            firm,
            doc,
            session,
        } => {
            let ctx = AppContext::connect(config).await?;
            let answer = answer_question(
                &ctx.store,
                &ctx.index,
                ctx.model.as_ref(),
                &ctx.config,
                &firm,
                doc.as_deref(),
                session.as_deref(),
                &question,
            )
            .await?;

            println!("session: {}", answer.session_id);
            println!();
            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!();
                println!("sources:");
                for source in &answer.sources {
                    println!(
                        "  {} chunk {} (score {:.3})",
                        source.doc_id, source.chunk_index, source.score
                    );
                }
            }
        }

        Commands::Show { doc_id } => {
            let pool = db::connect(&config).await?;
            let store = Store::new(pool);
            let document = store.get_document(&doc_id).await?;

            println!("id: {}", document.id);
            println!("firm: {}", document.firm_id);
            println!("filename: {}", document.filename);
            println!("status: {}", document.status);
            if let Some(detail) = &document.status_detail {
                println!("status detail: {}", detail);
            }
            if let Some(pages) = document.page_count {
                println!("pages: {}", pages);
            }
            if let Some(words) = document.word_count {
                println!("words: {}", words);
            }

            if let Some(summary) = store.latest_summary(&doc_id).await? {
                println!();
                println!("summary ({} tokens):", summary.tokens_used);
                println!("{}", summary.content);
            }

            let clauses = store.list_clauses(&doc_id).await?;
            if !clauses.is_empty() {
                println!();
                println!("clauses:");
                for clause in &clauses {
                    println!("  [{}] {}: {}", clause.risk_level, clause.clause_type, clause.text);
                }
            }

            if let Some(facts) = store.latest_facts(&doc_id).await? {
                println!();
                println!("facts:");
                println!("{}", facts.facts_json);
            }
        }

        Commands::Delete { doc_id } => {
            let pool = db::connect(&config).await?;
            let store = Store::new(pool);
            let document = store.get_document(&doc_id).await?;
            store.delete_document(&doc_id).await?;
            store
                .log_audit(
                    &document.firm_id,
                    None,
                    "document.deleted",
                    "document",
                    Some(&doc_id),
                    Some(&document.filename),
                )
                .await;
            println!("deleted document: {}", doc_id);
        }

        Commands::Stats { firm } => {
            let pool = db::connect(&config).await?;
            let store = Store::new(pool.clone());
            let index = lexdock::index::VectorIndex::new(
                pool,
                config.embedding.dims,
                config.retrieval.excerpt_chars,
            );
            let documents = store.list_documents(&firm).await?;
            let index_stats = index.stats().await;
            let period = current_period();
            let usage = store.usage_for_period(&firm, &period).await?;

            println!("documents: {}", documents.len());
            for document in &documents {
                println!("  {} {} ({})", document.id, document.filename, document.status);
            }
            println!();
            println!(
                "index: {} vectors, {} dims ({})",
                index_stats.total_vectors, index_stats.dimension, index_stats.status
            );
            println!();
            println!("usage for {}:", period);
            if usage.is_empty() {
                println!("  (none)");
            }
            for (metric, value) in &usage {
                println!("  {}: {}", metric, value);
            }
        }
    }

    Ok(())
}
