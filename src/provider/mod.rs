//! Language model provider abstraction.
//!
//! A [`LanguageModel`] supplies chat completions and, where the backend
//! offers one, text embeddings. Three backends are implemented:
//! - **openai** — chat completions and embeddings.
//! - **openrouter** — chat completions via the gateway; embeddings
//!   proxied to OpenAI embedding models.
//! - **perplexity** — chat completions; no embedding endpoint.
//!
//! # Retry Strategy
//!
//! All HTTP backends share one retry loop:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod openai;
mod openrouter;
mod perplexity;

pub use openai::OpenAiModel;
pub use openrouter::OpenRouterModel;
pub use perplexity::PerplexityModel;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the backend for a JSON object response where supported.
    pub json_mode: bool,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tokens_used: i64,
}

/// A chat completion + embedding backend.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider identifier, e.g. `"openai"`.
    fn name(&self) -> &str;

    /// Run a chat completion.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Embed a single text. Backends without an embedding endpoint
    /// return [`Error::EmbeddingUnavailable`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimensionality, if embeddings are supported.
    fn embedding_dims(&self) -> Option<usize>;
}

/// Instantiate the configured backend.
///
/// API keys come from the environment: `OPENAI_API_KEY`,
/// `OPENROUTER_API_KEY`, or `PERPLEXITY_API_KEY`.
pub fn create_model(config: &Config) -> Result<Box<dyn LanguageModel>> {
    match config.ai.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiModel::new(config)?)),
        "openrouter" => Ok(Box::new(OpenRouterModel::new(config)?)),
        "perplexity" => Ok(Box::new(PerplexityModel::new(config)?)),
        other => Err(Error::Config(format!("unknown AI provider: {}", other))),
    }
}

pub(crate) fn require_api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| Error::Config(format!("{} environment variable not set", var)))
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST a JSON body with the shared retry/backoff policy.
///
/// `provider` only labels error messages.
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
    max_retries: u32,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let resp = client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error, retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(Error::CompletionProvider(format!(
                        "{} API error {}: {}",
                        provider, status, body_text
                    )));
                    continue;
                }

                // Client error (not 429), don't retry
                let body_text = response.text().await.unwrap_or_default();
                return Err(Error::CompletionProvider(format!(
                    "{} API error {}: {}",
                    provider, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        Error::CompletionProvider(format!("{} request failed after retries", provider))
    }))
}

/// Bounded prefix of `text` for provider input limits, cut on a char
/// boundary.
pub(crate) fn input_prefix(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Serialize chat messages into the OpenAI-style wire shape all three
/// backends accept.
pub(crate) fn messages_to_json(messages: &[Message]) -> serde_json::Value {
    serde_json::Value::Array(
        messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.as_str(),
                    "content": m.content,
                })
            })
            .collect(),
    )
}

/// Pull `choices[0].message.content` and `usage.total_tokens` out of an
/// OpenAI-style chat completion response.
pub(crate) fn parse_chat_response(provider: &str, json: &serde_json::Value) -> Result<Completion> {
    let content = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            Error::CompletionProvider(format!("{}: response missing choices[0].message.content", provider))
        })?;

    let tokens_used = json
        .get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_i64())
        .unwrap_or(0);

    Ok(Completion {
        content: content.to_string(),
        tokens_used,
    })
}
