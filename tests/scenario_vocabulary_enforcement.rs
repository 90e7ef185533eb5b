//! Scenario: a document mentions a topic that isn't in the controlled
//! vocabulary yet. The accepted term stays inside the vocabulary; the novel
//! one is demoted to a suggestion instead of being admitted outright.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use ragsmith_core::document::{DocType, Document};
use ragsmith_core::enrichment::EnrichmentService;
use ragsmith_core::llm::{LlmGateway, MockProvider};
use ragsmith_core::vocabulary::{VocabKind, VocabularyStore};

fn gateway_returning(structured: serde_json::Value) -> Arc<LlmGateway> {
    let mut prices = std::collections::HashMap::new();
    prices.insert(
        "mock-model".to_string(),
        ragsmith_core::cost_ledger::ModelPrice {
            input_usd_per_1m: 1.0,
            output_usd_per_1m: 2.0,
        },
    );
    let ledger = Arc::new(ragsmith_core::cost_ledger::CostLedger::new(prices, 100.0, 0.0));
    let provider = MockProvider::always_succeeds("mock", structured.to_string());
    Arc::new(LlmGateway::new(vec![Arc::new(provider)], ledger))
}

#[tokio::test]
async fn unknown_topic_is_demoted_to_suggestion() {
    let mut vocabulary = VocabularyStore::empty();
    vocabulary.insert(VocabKind::Topic, "technology/ai");
    vocabulary.insert(VocabKind::Topic, "technology/machine-learning");
    let vocabulary = Arc::new(vocabulary);

    let gateway = gateway_returning(json!({
        "title": "Neural network eval notes",
        "summary": "Evaluated several neural network architectures for the project.",
        "entities": {},
        "topics": ["technology/ai", "technology/neural-networks"],
        "projects": [],
        "places": [],
        "reflection": null,
    }));

    let service = EnrichmentService::new(gateway, vocabulary, 4_000);
    let doc = Document::new(
        "notes.md",
        DocType::Markdown,
        "We evaluated several neural networks.",
        None,
        None,
        Utc::now(),
    );

    let report = service.enrich(&doc).await.expect("enrichment succeeds");
    let metadata = report.metadata.expect("metadata present");

    assert!(metadata.topics.contains(&"technology/ai".to_string()));
    assert!(!metadata.topics.contains(&"technology/neural-networks".to_string()));
    assert!(metadata.suggested_topics.contains(&"technology/neural-networks".to_string()));
}
