//! Document analysis: summary, clause extraction, and fact extraction.
//!
//! Each analysis sends the leading slice of the document text to the
//! completion backend with a JSON-shaped prompt, then recovers the JSON
//! from the response. Providers sometimes wrap JSON in markdown fences
//! even when asked not to, so parsing strips ```json blocks first.

use serde::Deserialize;

use crate::config::AiConfig;
use crate::error::{Error, Result};
use crate::provider::{CompletionRequest, LanguageModel, Message};

const SUMMARY_PROMPT: &str = r#"You are a legal document analyst. Provide a concise summary of the following legal document.

Focus on:
- Main purpose and type of document
- Key parties involved
- Critical dates and deadlines
- Important obligations or rights
- Risk factors or notable clauses

Document text:
{text}

Provide the summary in the following JSON format:
{
  "document_type": "type of document",
  "summary": "2-3 sentence overview",
  "key_parties": ["party1", "party2"],
  "critical_dates": ["date1", "date2"],
  "key_obligations": ["obligation1", "obligation2"],
  "risk_level": "low/medium/high"
}"#;

const CLAUSES_PROMPT: &str = r#"You are a legal document analyst. Extract and categorize important clauses from this legal document.

Focus on identifying:
- Liability clauses
- Indemnification clauses
- Termination clauses
- Payment/Financial clauses
- Confidentiality clauses
- Dispute resolution clauses
- Force majeure clauses
- Any unusual or high-risk clauses

Document text:
{text}

Provide the response in JSON format:
{
  "clauses": [
    {
      "type": "clause type",
      "text": "actual clause text",
      "page_ref": "page number if mentioned",
      "risk_level": "low/medium/high",
      "explanation": "brief explanation of significance"
    }
  ]
}"#;

const FACTS_PROMPT: &str = r#"Extract key factual information from this legal document.

Document text:
{text}

Provide facts in JSON format:
{
  "parties": [
    {
      "name": "party name",
      "role": "role in document",
      "contact": "contact info if available"
    }
  ],
  "dates": [
    {
      "date": "date value",
      "description": "what this date represents"
    }
  ],
  "amounts": [
    {
      "amount": "monetary amount",
      "description": "what this amount is for"
    }
  ],
  "key_terms": [
    {
      "term": "term name",
      "definition": "definition or explanation"
    }
  ]
}"#;

const SUMMARY_MAX_TOKENS: u32 = 500;
const CLAUSES_MAX_TOKENS: u32 = 1500;
const FACTS_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSummary {
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_parties: Vec<String>,
    #[serde(default)]
    pub critical_dates: Vec<String>,
    #[serde(default)]
    pub key_obligations: Vec<String>,
    #[serde(default)]
    pub risk_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedClause {
    #[serde(rename = "type", default)]
    pub clause_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClausesEnvelope {
    #[serde(default)]
    clauses: Vec<ExtractedClause>,
}

/// An analysis result plus the tokens the provider billed for it.
#[derive(Debug, Clone)]
pub struct Analyzed<T> {
    pub value: T,
    pub tokens_used: i64,
}

/// Strip markdown code fences wrapping a JSON payload.
///
/// Handles both ```json and bare ``` fences; anything else passes
/// through untouched.
pub fn strip_code_fences(content: &str) -> &str {
    if let Some(rest) = content.split("```json").nth(1) {
        return rest.split("```").next().unwrap_or("").trim();
    }
    if content.contains("```") {
        if let Some(inner) = content.split("```").nth(1) {
            return inner.trim();
        }
    }
    content.trim()
}

fn parse_json_payload<T: serde::de::DeserializeOwned>(content: &str) -> Result<T> {
    let cleaned = strip_code_fences(content);
    serde_json::from_str(cleaned).map_err(|e| Error::completion_parse(e.to_string(), content))
}

fn truncated(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn analysis_request(prompt_template: &str, text: &str, config: &AiConfig, max_tokens: u32) -> CompletionRequest {
    let prompt = prompt_template.replace("{text}", truncated(text, config.analysis_text_limit));
    CompletionRequest {
        messages: vec![Message::user(prompt)],
        max_tokens,
        temperature: config.temperature,
        json_mode: true,
    }
}

pub async fn generate_summary(
    model: &dyn LanguageModel,
    config: &AiConfig,
    text: &str,
) -> Result<Analyzed<DocumentSummary>> {
    let completion = model
        .complete(analysis_request(SUMMARY_PROMPT, text, config, SUMMARY_MAX_TOKENS))
        .await?;
    let value = parse_json_payload(&completion.content)?;
    Ok(Analyzed {
        value,
        tokens_used: completion.tokens_used,
    })
}

pub async fn extract_clauses(
    model: &dyn LanguageModel,
    config: &AiConfig,
    text: &str,
) -> Result<Analyzed<Vec<ExtractedClause>>> {
    let completion = model
        .complete(analysis_request(CLAUSES_PROMPT, text, config, CLAUSES_MAX_TOKENS))
        .await?;
    let envelope: ClausesEnvelope = parse_json_payload(&completion.content)?;
    Ok(Analyzed {
        value: envelope.clauses,
        tokens_used: completion.tokens_used,
    })
}

/// Extract key facts; the result is kept as free-form JSON since fact
/// shapes vary by document type.
pub async fn extract_facts(
    model: &dyn LanguageModel,
    config: &AiConfig,
    text: &str,
) -> Result<Analyzed<serde_json::Value>> {
    let completion = model
        .complete(analysis_request(FACTS_PROMPT, text, config, FACTS_MAX_TOKENS))
        .await?;
    let value = parse_json_payload(&completion.content)?;
    Ok(Analyzed {
        value,
        tokens_used: completion.tokens_used,
    })
}
