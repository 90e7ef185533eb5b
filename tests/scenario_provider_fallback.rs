//! Scenario: the primary provider is rate-limited; the gateway falls
//! through to the next provider in `providers_order` and records cost only
//! against the one that actually answered.

use std::sync::Arc;

use ragsmith_core::cost_ledger::{CostLedger, ModelPrice};
use ragsmith_core::llm::{CompletionResponse, LlmGateway, MockProvider, ProviderError, Usage};

#[tokio::test]
async fn rate_limited_primary_falls_back_to_secondary() {
    let mut prices = std::collections::HashMap::new();
    prices.insert(
        "provider-a".to_string(),
        ModelPrice {
            input_usd_per_1m: 1.0,
            output_usd_per_1m: 2.0,
        },
    );
    prices.insert(
        "provider-b".to_string(),
        ModelPrice {
            input_usd_per_1m: 1.0,
            output_usd_per_1m: 2.0,
        },
    );
    let ledger = Arc::new(CostLedger::new(prices, 100.0, 0.0));

    let provider_a = MockProvider::new("provider-a", vec![Err(ProviderError::RateLimited)]);
    let provider_b = MockProvider::new(
        "provider-b",
        vec![Ok(CompletionResponse {
            text: "final answer".to_string(),
            structured: None,
            usage: Usage {
                input_tokens: 40,
                output_tokens: 10,
            },
        })],
    );

    let gateway = LlmGateway::new(
        vec![Arc::new(provider_a), Arc::new(provider_b)],
        ledger.clone(),
    );

    let response = gateway
        .call("summarize this document", None, 0.2, None)
        .await
        .expect("fallback to provider-b succeeds");

    assert_eq!(response.provider_used, "provider-b");
    assert_eq!(response.model_used, "provider-b");

    let stats = ledger.stats().await;
    assert_eq!(stats.call_count, 1);
    assert!(stats.per_provider_usd.contains_key("provider-b"));
    assert!(!stats.per_provider_usd.contains_key("provider-a"));
}
