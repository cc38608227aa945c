//! # Lexdock
//!
//! A multi-tenant legal document intelligence backend: PDF ingestion,
//! AI analysis, embedding, vector retrieval, and retrieval-augmented
//! chat, driven by the `lexd` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────────┐   ┌───────────┐
//! │ Uploads │──▶│     Pipeline      │──▶│  SQLite    │
//! │  (PDF)  │   │ Extract→Chunk→AI │   │ rows+vecs │
//! └─────────┘   └──────────────────┘   └─────┬─────┘
//!                                            │
//!                              ┌─────────────┤
//!                              ▼             ▼
//!                        ┌──────────┐  ┌──────────┐
//!                        │   Chat   │  │   CLI    │
//!                        │  (RAG)   │  │ (lexd)   │
//!                        └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lexd init                                  # create database
//! lexd process contract.pdf --firm acme      # ingest and analyze
//! lexd chat "What is the notice period?" --firm acme
//! lexd show <doc-id>                         # summary, clauses, facts
//! lexd stats --firm acme
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Overlapping word-window chunking |
//! | [`provider`] | Language model backends (completions + embeddings) |
//! | [`analysis`] | Summary, clause, and fact extraction |
//! | [`index`] | SQLite-backed vector index |
//! | [`store`] | Documents, artifacts, chat, usage, audit |
//! | [`pipeline`] | Document processing state machine |
//! | [`chat`] | Retrieval-augmented question answering |
//! | [`worker`] | Bounded job queue and worker pool |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analysis;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod extract;
pub mod index;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod testing;
pub mod worker;
