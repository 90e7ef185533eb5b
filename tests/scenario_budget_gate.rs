//! Scenario: the daily budget is nearly exhausted. A call that would push
//! spend over the limit is refused before any provider is dispatched, and
//! the ledger is left unchanged.

use std::sync::Arc;

use ragsmith_core::cost_ledger::{CostLedger, CostRecord, ModelPrice};
use ragsmith_core::error::RagError;
use ragsmith_core::llm::{CompletionResponse, LlmGateway, MockProvider, Usage};

#[tokio::test]
async fn near_exhausted_budget_refuses_before_dispatch() {
    let mut prices = std::collections::HashMap::new();
    prices.insert(
        "mock-model".to_string(),
        ModelPrice {
            input_usd_per_1m: 1.0,
            output_usd_per_1m: 2.0,
        },
    );
    let ledger = Arc::new(CostLedger::new(prices, 0.01, 0.0));
    ledger
        .record(CostRecord {
            provider: "mock".to_string(),
            model: "mock-model".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.009,
            ts: chrono::Utc::now(),
        })
        .await;

    let provider = MockProvider::new(
        "mock-model",
        vec![Ok(CompletionResponse {
            text: "should never be reached".to_string(),
            structured: None,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
        })],
    );
    let gateway = LlmGateway::new(vec![Arc::new(provider)], ledger.clone());

    // A realistically-sized enrichment prompt (full document text, not a
    // short query) so the pre-dispatch token estimate yields a non-trivial
    // cost estimate, matching the scenario's "pending call estimated at
    // $0.003" framing.
    let document_prompt = "budget review narrative ".repeat(800);
    let result = gateway.call(&document_prompt, None, 0.2, None).await;
    assert!(matches!(result, Err(RagError::BudgetExceeded)));

    let stats = ledger.stats().await;
    assert!((stats.total_usd - 0.009).abs() < 1e-9);
    assert_eq!(stats.call_count, 0);
}
