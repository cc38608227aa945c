//! Retrieval-augmented chat over indexed documents.
//!
//! Embeds the question, pulls the firm's best-matching chunks, and asks
//! the completion backend to answer from that context alone. Retrieval
//! is best-effort: an empty index, an unreachable index, or a backend
//! without embeddings all degrade to the canonical refusal with no
//! provider call, never an error to the caller.

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::models::ChatAnswer;
use crate::provider::{CompletionRequest, LanguageModel, Message, Role};
use crate::store::Store;

const SYSTEM_PROMPT: &str = r#"You are a helpful legal AI assistant. Answer questions based ONLY on the provided document context.

Rules:
1. If the answer is not in the context, say "I don't have enough information in this document to answer that question."
2. Always cite specific parts of the document when answering
3. Be precise and concise
4. Never make up information"#;

const INSUFFICIENT_INFO_ANSWER: &str =
    "I don't have enough information in this document to answer that question.";

/// Answer a question against a firm's indexed documents.
///
/// `doc_id` scopes retrieval to one document; `session_id` of `None`
/// starts a fresh session. Both sides of the exchange are persisted to
/// chat history.
pub async fn answer_question(
    store: &Store,
    index: &VectorIndex,
    model: &dyn LanguageModel,
    config: &Config,
    firm_id: &str,
    doc_id: Option<&str>,
    session_id: Option<&str>,
    question: &str,
) -> Result<ChatAnswer> {
    let session_id = session_id
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let sources = match model.embed(question).await {
        Ok(query_vec) => {
            match index
                .query(firm_id, doc_id, &query_vec, config.retrieval.top_k)
                .await
            {
                Ok(sources) => sources,
                Err(e) => {
                    warn!(firm_id, error = %e, "vector query failed, answering without context");
                    Vec::new()
                }
            }
        }
        Err(e) => {
            warn!(firm_id, error = %e, "question embedding failed, answering without context");
            Vec::new()
        }
    };

    let history = store
        .recent_history(&session_id, firm_id, config.retrieval.history_turns)
        .await?;

    store
        .append_chat_message(&session_id, firm_id, doc_id, "user", question, 0)
        .await?;

    // Nothing retrieved: answer the canonical refusal without a
    // completion call.
    if sources.is_empty() {
        info!(firm_id, session_id, "retrieval returned no chunks");
        store
            .append_chat_message(
                &session_id,
                firm_id,
                doc_id,
                "assistant",
                INSUFFICIENT_INFO_ANSWER,
                0,
            )
            .await?;
        store.bump_usage(firm_id, "chats", 1).await;
        return Ok(ChatAnswer {
            session_id,
            answer: INSUFFICIENT_INFO_ANSWER.to_string(),
            sources,
            tokens_used: 0,
        });
    }

    let context = sources
        .iter()
        .map(|s| s.excerpt.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut messages = vec![Message::system(SYSTEM_PROMPT)];
    for msg in &history {
        let role = match msg.message_type.as_str() {
            "assistant" => Role::Assistant,
            _ => Role::User,
        };
        messages.push(Message {
            role,
            content: msg.content.clone(),
        });
    }
    messages.push(Message::user(format!(
        "Context from document:\n{}\n\nQuestion: {}",
        context, question
    )));

    let completion = model
        .complete(CompletionRequest {
            messages,
            max_tokens: config.ai.max_tokens,
            temperature: config.ai.temperature,
            json_mode: false,
        })
        .await?;

    store
        .append_chat_message(
            &session_id,
            firm_id,
            doc_id,
            "assistant",
            &completion.content,
            completion.tokens_used,
        )
        .await?;
    store.bump_usage(firm_id, "chats", 1).await;
    if completion.tokens_used > 0 {
        store
            .bump_usage(firm_id, "ai_tokens", completion.tokens_used)
            .await;
    }

    Ok(ChatAnswer {
        session_id,
        answer: completion.content,
        sources,
        tokens_used: completion.tokens_used,
    })
}
