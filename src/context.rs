//! Shared application context wiring the store, vector index, and
//! language model together for the CLI and worker pool.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::index::VectorIndex;
use crate::provider::{create_model, LanguageModel};
use crate::store::Store;

pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub store: Store,
    pub index: VectorIndex,
    pub model: Box<dyn LanguageModel>,
}

impl AppContext {
    /// Connect to the database and build the configured backend.
    /// Assumes `lexd init` has already created the schema.
    pub async fn connect(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let store = Store::new(pool.clone());
        let index = VectorIndex::new(
            pool.clone(),
            config.embedding.dims,
            config.retrieval.excerpt_chars,
        );
        let model = create_model(&config)?;
        Ok(Self {
            config,
            pool,
            store,
            index,
            model,
        })
    }

    pub async fn shutdown(self) {
        self.pool.close().await;
    }
}
