use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window length in words.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared between consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    /// Completion provider: `openai`, `openrouter`, or `perplexity`.
    #[serde(default = "default_ai_provider")]
    pub provider: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Characters of document text sent to analysis prompts.
    #[serde(default = "default_analysis_text_limit")]
    pub analysis_text_limit: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_ai_provider(),
            model: default_ai_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            analysis_text_limit: default_analysis_text_limit(),
        }
    }
}

fn default_ai_provider() -> String {
    "openai".to_string()
}
fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    500
}
fn default_temperature() -> f32 {
    0.3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_analysis_text_limit() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Characters of input sent per embedding request.
    #[serde(default = "default_input_char_limit")]
    pub input_char_limit: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            input_char_limit: default_input_char_limit(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_input_char_limit() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Prior chat messages carried into each answer.
    #[serde(default = "default_history_turns")]
    pub history_turns: i64,
    /// Characters of chunk text stored alongside each vector.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_turns: default_history_turns(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_top_k() -> i64 {
    5
}
fn default_history_turns() -> i64 {
    6
}
fn default_excerpt_chars() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}

fn default_workers() -> usize {
    2
}
fn default_queue_depth() -> usize {
    64
}
fn default_job_timeout_secs() -> u64 {
    1800
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.history_turns < 0 {
        anyhow::bail!("retrieval.history_turns must be >= 0");
    }

    // Validate embedding
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.input_char_limit == 0 {
        anyhow::bail!("embedding.input_char_limit must be > 0");
    }

    // Validate worker
    if config.worker.workers == 0 {
        anyhow::bail!("worker.workers must be >= 1");
    }
    if config.worker.queue_depth == 0 {
        anyhow::bail!("worker.queue_depth must be >= 1");
    }

    match config.ai.provider.as_str() {
        "openai" | "openrouter" | "perplexity" => {}
        other => anyhow::bail!(
            "Unknown AI provider: '{}'. Must be openai, openrouter, or perplexity.",
            other
        ),
    }

    Ok(config)
}
