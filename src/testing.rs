//! Test double for the language model backend.
//!
//! [`MockModel`] answers completions from a scripted queue (falling back
//! to shape-appropriate canned JSON) and produces deterministic
//! bag-of-words embeddings, so similarity ranking behaves sensibly in
//! tests: identical text embeds identically and shared vocabulary raises
//! the score.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::provider::{Completion, CompletionRequest, LanguageModel};

pub const MOCK_DIMS: usize = 64;
const MOCK_TOKENS_PER_CALL: i64 = 42;

#[derive(Default)]
pub struct MockModel {
    responses: Mutex<VecDeque<String>>,
    completions: AtomicUsize,
    embeddings: AtomicUsize,
    fail_completions: AtomicBool,
    fail_embeddings: AtomicBool,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a scripted completion; scripted responses are consumed in
    /// order before any canned fallback.
    pub fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().unwrap().push_back(content.into());
    }

    pub fn fail_completions(&self, fail: bool) {
        self.fail_completions.store(fail, Ordering::SeqCst);
    }

    pub fn fail_embeddings(&self, fail: bool) {
        self.fail_embeddings.store(fail, Ordering::SeqCst);
    }

    pub fn completion_calls(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub fn embedding_calls(&self) -> usize {
        self.embeddings.load(Ordering::SeqCst)
    }

    fn canned_for(request: &CompletionRequest) -> String {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if prompt.contains("Extract and categorize important clauses") {
            r#"{"clauses": [{"type": "liability", "text": "Liability is capped at fees paid.", "risk_level": "medium", "explanation": "Limits recovery."}]}"#
                .to_string()
        } else if prompt.contains("Extract key factual information") {
            r#"{"parties": [{"name": "Acme Corp", "role": "vendor", "contact": ""}], "dates": [], "amounts": [], "key_terms": []}"#
                .to_string()
        } else if prompt.contains("Provide a concise summary") {
            r#"{"document_type": "services agreement", "summary": "A services agreement between two parties.", "key_parties": ["Acme Corp"], "critical_dates": [], "key_obligations": ["payment"], "risk_level": "low"}"#
                .to_string()
        } else {
            "Based on the provided context, the agreement covers the services described."
                .to_string()
        }
    }
}

/// Deterministic bag-of-words embedding.
pub fn mock_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; MOCK_DIMS];
    for word in text.split_whitespace() {
        let mut hash: u64 = 1469598103934665603;
        for b in word.to_lowercase().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(1099511628211);
        }
        v[(hash % MOCK_DIMS as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    } else {
        // Keep empty-text embeddings non-zero so the index accepts them.
        v[0] = 1.0;
    }
    v
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        if self.fail_completions.load(Ordering::SeqCst) {
            return Err(Error::CompletionProvider("mock completion failure".to_string()));
        }
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Self::canned_for(&request));
        Ok(Completion {
            content,
            tokens_used: MOCK_TOKENS_PER_CALL,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embeddings.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings.load(Ordering::SeqCst) {
            return Err(Error::EmbeddingUnavailable("mock".to_string()));
        }
        Ok(mock_embedding(text))
    }

    fn embedding_dims(&self) -> Option<usize> {
        Some(MOCK_DIMS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn mock_embedding_is_deterministic_and_normalized() {
        let a = mock_embedding("termination clause notice period");
        let b = mock_embedding("termination clause notice period");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let q = mock_embedding("termination notice period");
        let related = mock_embedding("the termination notice period is thirty days");
        let unrelated = mock_embedding("governing law venue jurisdiction arbitration");
        assert!(cosine_similarity(&q, &related) > cosine_similarity(&q, &unrelated));
    }
}
