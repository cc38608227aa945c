//! Perplexity backend. Chat completions only; no embeddings endpoint.
//! Perplexity also rejects OpenAI's `response_format`, so JSON is asked
//! for in the prompt and recovered by the analysis-layer fence stripper.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};

use super::{
    build_client, messages_to_json, parse_chat_response, post_json_with_retry, require_api_key,
    Completion, CompletionRequest, LanguageModel,
};

const CHAT_URL: &str = "https://api.perplexity.ai/chat/completions";

pub struct PerplexityModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl PerplexityModel {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client(config.ai.timeout_secs)?,
            api_key: require_api_key("PERPLEXITY_API_KEY")?,
            model: config.ai.model.clone(),
            max_retries: config.ai.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for PerplexityModel {
    fn name(&self) -> &str {
        "perplexity"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut messages = request.messages;
        if request.json_mode {
            if let Some(last) = messages.last_mut() {
                last.content.push_str(
                    "\n\nIMPORTANT: Return your response as valid JSON only, \
                     with no additional text or markdown.",
                );
            }
        }
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages_to_json(&messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let json = post_json_with_retry(
            &self.client,
            self.name(),
            CHAT_URL,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;

        parse_chat_response(self.name(), &json)
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::EmbeddingUnavailable("perplexity".to_string()))
    }

    fn embedding_dims(&self) -> Option<usize> {
        None
    }
}
