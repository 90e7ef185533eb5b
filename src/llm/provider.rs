//! The `LlmProvider` adapter contract: a small async trait plus a
//! deterministic mock for tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors a provider adapter can surface; the gateway classifies these into
/// retryable-vs-not when deciding whether to advance the fallback chain.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("rate limited")]
    RateLimited,
    #[error("timed out")]
    Timeout,
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("authentication failed: {0}")]
    AuthError(String),
    #[error("schema validation failed: {0}")]
    SchemaError(String),
    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether this failure should advance to the next provider in the
    /// fallback chain, vs. being treated as immediately terminal.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Token usage reported alongside a completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    /// Present when the caller wants validated structured output back.
    pub response_schema: Option<Value>,
    pub deadline: Option<Duration>,
}

/// A provider's response to a [`CompletionRequest`].
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Raw text, or the structured value serialized to JSON text if a
    /// schema was requested.
    pub text: String,
    /// Parsed structured value, present only in structured-output mode.
    pub structured: Option<Value>,
    pub usage: Usage,
}

/// A single named LLM backend. Implementations wrap a concrete vendor SDK;
/// [`MockProvider`] is the deterministic test double.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable identifier used in `providers_order` and cost records.
    fn id(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// Deterministic test double recording every call it receives.
pub struct MockProvider {
    id: String,
    /// Scripted responses returned in order; the last is repeated once
    /// exhausted.
    scripted: Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    #[must_use]
    pub fn new(id: impl Into<String>, scripted: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            id: id.into(),
            scripted: Mutex::new(scripted),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience constructor always returning the same plain-text success.
    #[must_use]
    pub fn always_succeeds(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(
            id,
            vec![Ok(CompletionResponse {
                text: text.into(),
                structured: None,
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 10,
                },
            })],
        )
    }

    /// Requests this mock has received so far, in order.
    pub async fn recorded_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().await.push(request.clone());
        let mut scripted = self.scripted.lock().await;
        if scripted.len() > 1 {
            scripted.remove(0)
        } else {
            scripted
                .first()
                .cloned()
                .unwrap_or(Err(ProviderError::Unavailable("no script".into())))
        }
    }
}
