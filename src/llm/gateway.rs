//! The LLM Gateway itself: ordered-provider dispatch with fallback, budget
//! gating, and cost recording.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::cost_ledger::{CostLedger, CostRecord};
use crate::error::RagError;

use super::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Result of a successful gateway call.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub structured: Option<serde_json::Value>,
    pub cost_usd: f64,
    pub model_used: String,
    pub provider_used: String,
}

/// Ordered-provider LLM gateway. Safe for concurrent calls: the only shared
/// mutable state is the [`CostLedger`], which serializes its own updates.
pub struct LlmGateway {
    providers: Vec<Arc<dyn LlmProvider>>,
    ledger: Arc<CostLedger>,
}

impl LlmGateway {
    /// Construct a gateway with providers in fallback order: primary,
    /// fallback, emergency, ...
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>, ledger: Arc<CostLedger>) -> Self {
        Self { providers, ledger }
    }

    /// Dispatch a completion request, trying providers in order (or the
    /// explicitly requested model's provider first, if named) until one
    /// succeeds or all are exhausted.
    #[instrument(level = "trace", skip_all, fields(requested_model = requested_model.unwrap_or("<none>")))]
    pub async fn call(
        &self,
        prompt: &str,
        requested_model: Option<&str>,
        temperature: f32,
        response_schema: Option<serde_json::Value>,
    ) -> Result<GatewayResponse, RagError> {
        let order = self.resolution_order(requested_model);
        if order.is_empty() {
            return Err(RagError::AllProvidersFailed(
                "no providers configured".into(),
            ));
        }

        let estimated_tokens = crate::chunking::estimate_tokens(prompt) as u64;

        let mut last_error = String::new();
        for provider in order {
            let request = CompletionRequest {
                prompt: prompt.to_string(),
                model: requested_model.unwrap_or(provider.id()).to_string(),
                temperature,
                response_schema: response_schema.clone(),
                deadline: None,
            };

            let pending_cost = self
                .ledger
                .estimate(&request.model, estimated_tokens, estimated_tokens)
                .unwrap_or(0.0);
            if !self.ledger.within_budget(chrono::Utc::now(), pending_cost).await {
                return Err(RagError::BudgetExceeded);
            }

            let mut result = self.dispatch_one(provider.as_ref(), &request).await;
            if let Err(RagError::SchemaViolation(_)) = &result {
                warn!(provider = provider.id(), "schema violation, retrying same provider once");
                result = self.dispatch_one(provider.as_ref(), &request).await;
            }

            match result {
                Ok(response) => return Ok(response),
                Err(RagError::Cancelled) => return Err(RagError::Cancelled),
                Err(RagError::SchemaViolation(msg)) => return Err(RagError::SchemaViolation(msg)),
                Err(e) => {
                    last_error = e.to_string();
                    continue;
                }
            }
        }

        Err(RagError::AllProvidersFailed(last_error))
    }

    #[instrument(level = "trace", skip_all, fields(provider = provider.id(), model = %request.model))]
    async fn dispatch_one(
        &self,
        provider: &dyn LlmProvider,
        request: &CompletionRequest,
    ) -> Result<GatewayResponse, RagError> {
        match provider.complete(request).await {
            Ok(response) => {
                let cost_usd = self.record_success(provider.id(), request, &response).await?;
                Ok(GatewayResponse {
                    text: response.text,
                    structured: response.structured,
                    cost_usd,
                    model_used: request.model.clone(),
                    provider_used: provider.id().to_string(),
                })
            }
            Err(err) => {
                if matches!(err, crate::llm::ProviderError::Cancelled) {
                    return Err(RagError::Cancelled);
                }
                if matches!(err, crate::llm::ProviderError::SchemaError(_)) {
                    warn!(provider = provider.id(), "schema violation");
                    return Err(RagError::SchemaViolation(err.to_string()));
                }
                warn!(
                    provider = provider.id(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "provider call failed"
                );
                Err(RagError::Storage(err.to_string()))
            }
        }
    }

    async fn record_success(
        &self,
        provider_id: &str,
        request: &CompletionRequest,
        response: &CompletionResponse,
    ) -> Result<f64, RagError> {
        let cost_usd = self
            .ledger
            .estimate(
                &request.model,
                response.usage.input_tokens,
                response.usage.output_tokens,
            )
            .unwrap_or(0.0);
        self.ledger
            .record(CostRecord {
                provider: provider_id.to_string(),
                model: request.model.clone(),
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cost_usd,
                ts: chrono::Utc::now(),
            })
            .await;
        Ok(cost_usd)
    }

    fn resolution_order(&self, requested_model: Option<&str>) -> Vec<Arc<dyn LlmProvider>> {
        if let Some(model) = requested_model {
            if let Some(pos) = self.providers.iter().position(|p| p.id() == model) {
                let mut ordered = vec![self.providers[pos].clone()];
                ordered.extend(
                    self.providers
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != pos)
                        .map(|(_, p)| p.clone()),
                );
                return ordered;
            }
        }
        self.providers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{MockProvider, ProviderError};
    use std::collections::HashMap;

    fn ledger() -> Arc<CostLedger> {
        let mut prices = HashMap::new();
        prices.insert(
            "primary".to_string(),
            crate::cost_ledger::ModelPrice {
                input_usd_per_1m: 1.0,
                output_usd_per_1m: 1.0,
            },
        );
        prices.insert(
            "fallback".to_string(),
            crate::cost_ledger::ModelPrice {
                input_usd_per_1m: 1.0,
                output_usd_per_1m: 1.0,
            },
        );
        Arc::new(CostLedger::new(prices, 10.0, 0.0))
    }

    #[tokio::test]
    async fn falls_back_to_second_provider_on_retryable_failure() {
        let primary = Arc::new(MockProvider::new(
            "primary",
            vec![Err(ProviderError::RateLimited)],
        ));
        let fallback = Arc::new(MockProvider::always_succeeds("fallback", "ok"));
        let gateway = LlmGateway::new(vec![primary, fallback], ledger());

        let response = gateway.call("hello", None, 0.0, None).await.unwrap();
        assert_eq!(response.provider_used, "fallback");
        assert_eq!(response.model_used, "fallback");
    }

    #[tokio::test]
    async fn all_providers_exhausted_surfaces_error() {
        let primary = Arc::new(MockProvider::new(
            "primary",
            vec![Err(ProviderError::Unavailable("down".into()))],
        ));
        let gateway = LlmGateway::new(vec![primary], ledger());
        let err = gateway.call("hello", None, 0.0, None).await.unwrap_err();
        assert!(matches!(err, RagError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn budget_exceeded_short_circuits_before_dispatch() {
        let primary = Arc::new(MockProvider::always_succeeds("primary", "ok"));
        let mut prices = HashMap::new();
        prices.insert(
            "primary".to_string(),
            crate::cost_ledger::ModelPrice {
                input_usd_per_1m: 1.0,
                output_usd_per_1m: 1.0,
            },
        );
        let ledger = Arc::new(CostLedger::new(prices, 0.0, 0.0));
        let gateway = LlmGateway::new(vec![primary.clone()], ledger);

        let err = gateway.call("hello", None, 0.0, None).await.unwrap_err();
        assert!(matches!(err, RagError::BudgetExceeded));
        assert!(primary.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn schema_violation_retries_same_provider_then_succeeds() {
        let primary = Arc::new(MockProvider::new(
            "primary",
            vec![
                Err(ProviderError::SchemaError("missing required field".into())),
                Ok(crate::llm::CompletionResponse {
                    text: "ok".to_string(),
                    structured: None,
                    usage: Default::default(),
                }),
            ],
        ));
        let fallback = Arc::new(MockProvider::always_succeeds("fallback", "should not be used"));
        let gateway = LlmGateway::new(vec![primary.clone(), fallback], ledger());

        let response = gateway.call("hello", None, 0.0, None).await.unwrap();
        assert_eq!(response.provider_used, "primary");
        assert_eq!(primary.recorded_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn schema_violation_surviving_retry_aborts_without_fallback() {
        let primary = Arc::new(MockProvider::new(
            "primary",
            vec![Err(ProviderError::SchemaError("still invalid".into()))],
        ));
        let fallback = Arc::new(MockProvider::always_succeeds("fallback", "should not be used"));
        let gateway = LlmGateway::new(vec![primary.clone(), fallback.clone()], ledger());

        let err = gateway.call("hello", None, 0.0, None).await.unwrap_err();
        assert!(matches!(err, RagError::SchemaViolation(_)));
        assert_eq!(primary.recorded_calls().await.len(), 2);
        assert!(fallback.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn cancellation_surfaces_immediately_without_fallback() {
        let primary = Arc::new(MockProvider::new(
            "primary",
            vec![Err(ProviderError::Cancelled)],
        ));
        let fallback = Arc::new(MockProvider::always_succeeds("fallback", "ok"));
        let gateway = LlmGateway::new(vec![primary, fallback.clone()], ledger());

        let err = gateway.call("hello", None, 0.0, None).await.unwrap_err();
        assert!(matches!(err, RagError::Cancelled));
        assert!(fallback.recorded_calls().await.is_empty());
    }
}
