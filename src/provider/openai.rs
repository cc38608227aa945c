//! OpenAI backend: chat completions plus embeddings.

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{Error, Result};

use super::{
    build_client, input_prefix, messages_to_json, parse_chat_response, post_json_with_retry,
    require_api_key, Completion, CompletionRequest, LanguageModel,
};

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    embedding_model: String,
    dims: usize,
    input_char_limit: usize,
    max_retries: u32,
}

impl OpenAiModel {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client(config.ai.timeout_secs)?,
            api_key: require_api_key("OPENAI_API_KEY")?,
            model: config.ai.model.clone(),
            embedding_model: config.embedding.model.clone(),
            dims: config.embedding.dims,
            input_char_limit: config.embedding.input_char_limit,
            max_retries: config.ai.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages_to_json(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }

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

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": input_prefix(text, self.input_char_limit),
        });

        let json = post_json_with_retry(
            &self.client,
            self.name(),
            EMBEDDINGS_URL,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;

        let embedding = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|e| e.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::CompletionProvider("openai: response missing data[0].embedding".to_string())
            })?;

        Ok(embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }

    fn embedding_dims(&self) -> Option<usize> {
        Some(self.dims)
    }
}
