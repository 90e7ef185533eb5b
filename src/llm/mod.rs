//! LLM Gateway: ordered-provider calls with fallback,
//! structured output, and cost accounting.

mod gateway;
mod provider;

pub use gateway::LlmGateway;
pub use provider::{CompletionRequest, CompletionResponse, LlmProvider, MockProvider, ProviderError, Usage};
