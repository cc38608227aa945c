//! SQLite connection pool shared by the document store and the vector
//! index.
//!
//! WAL mode keeps worker-pool writes from blocking concurrent CLI
//! reads; pool size comes from `[db] max_connections`.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::config::Config;
use crate::error::Result;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    if let Some(parent) = config.db.path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db.path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await?)
}
