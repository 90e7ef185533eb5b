//! End-to-end demo: ingest a handful of markdown documents with mock
//! providers, then run a hybrid query and print the results.
//!
//! ```bash
//! cargo run --example ingest_and_query
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use ragsmith_core::chunking::{Chunker, ChunkerConfig};
use ragsmith_core::config::RagConfig;
use ragsmith_core::cost_ledger::{CostLedger, ModelPrice};
use ragsmith_core::document::{DocType, Document};
use ragsmith_core::embedder::MockEmbedder;
use ragsmith_core::enrichment::EnrichmentService;
use ragsmith_core::index::{Bm25Index, MemoryVectorStore, SearchCache};
use ragsmith_core::llm::{LlmGateway, MockProvider};
use ragsmith_core::quality_gate::QualityGate;
use ragsmith_core::rag_answerer::RagAnswerer;
use ragsmith_core::reranker::MockReranker;
use ragsmith_core::retrieval::HybridRetriever;
use ragsmith_core::vocabulary::VocabularyStore;
use ragsmith_core::{Context as IngestionContext, IngestionPipeline};
use std::time::Duration;
use std::time::Instant;

const SAMPLE_DOCS: &[(&str, &str)] = &[
    (
        "daycare-tour-notes.md",
        "# Daycare tour notes\n\n\
         We toured Sunbeam Daycare this morning. The director mentioned an \
         opening in the toddler room starting next month. Enrollment paperwork \
         is due by the 15th.\n",
    ),
    (
        "home-renovation-plan.md",
        "# Home renovation plan\n\n\
         Contractor quoted the kitchen remodel at $24,000. Permits for the \
         electrical work need to be filed with the city before demolition \
         starts.\n",
    ),
    (
        "quarterly-planning.md",
        "# Annual planning notes\n\n\
         Finance wants the budget draft by end of quarter. Strategy review is \
         scheduled for next week; bring the updated infrastructure cost \
         estimates.\n",
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = RagConfig::builder()
        .providers_order(vec!["mock-model".to_string()])
        .daily_budget_usd(5.0)
        .fusion_weights(0.5, 0.5)
        .mmr_lambda(0.5)
        .cache(128, 60)
        .quality_gate(false, 0.0)
        .confidence_threshold(0.0)
        .chunker_tokens(200, 400)
        .build()?;
    let model = config.providers_order[0].clone();

    let mut prices = HashMap::new();
    prices.insert(
        model.clone(),
        ModelPrice {
            input_usd_per_1m: 1.0,
            output_usd_per_1m: 2.0,
        },
    );
    let ledger = CostLedger::new(prices, config.daily_budget_usd, config.budget_safety_margin_usd)
        .with_snapshot("demo_cost_ledger_snapshot.json")
        .await?;
    let ledger = Arc::new(ledger);

    let extraction_json = json!({
        "title": "",
        "summary": "",
        "entities": {},
        "topics": ["personal/family"],
        "projects": [],
        "places": [],
        "reflection": null,
    })
    .to_string();
    let provider = MockProvider::always_succeeds(model.clone(), extraction_json);
    let gateway = Arc::new(LlmGateway::new(vec![Arc::new(provider)], ledger.clone()));

    let vocabulary = Arc::new(
        VocabularyStore::load_from_dir("vocab", None)
            .await
            .unwrap_or_else(|_| VocabularyStore::empty()),
    );

    let enrichment = Arc::new(EnrichmentService::new(
        gateway.clone(),
        vocabulary,
        config.enrichment_prompt_window_chars,
    ));
    let quality_gate = Arc::new(QualityGate::new(
        config.quality_gate_threshold,
        config.quality_gate_enabled,
    ));
    let chunker = Arc::new(Chunker::new(ChunkerConfig {
        target_tokens: config.chunker_target_tokens,
        max_tokens: config.chunker_max_tokens,
    }));
    let embedder = Arc::new(MockEmbedder::new(32));
    let vector_store: Arc<dyn ragsmith_core::index::VectorStore> =
        Arc::new(MemoryVectorStore::new(embedder));
    let bm25 = Arc::new(Bm25Index::new());
    let cache = Arc::new(SearchCache::new(
        config.cache_size,
        Duration::from_secs(config.cache_ttl_seconds),
    ));

    let pipeline = IngestionPipeline::new(
        enrichment,
        quality_gate,
        chunker,
        vector_store.clone(),
        bm25.clone(),
        cache.clone(),
        config.max_in_flight_ingestions,
    );

    for (filename, text) in SAMPLE_DOCS {
        let doc = Document::new(*filename, DocType::Markdown, *text, None, None, Utc::now());
        let ctx = IngestionContext {
            doc_id: doc.short_id.clone(),
            started_at: Instant::now(),
            enable_gating: false,
            enable_export: false,
        };
        let outcome = pipeline.ingest(doc, ctx).await?;
        println!("ingested {filename}: {outcome:?}");
    }

    let (w_bm25, w_dense) = config.normalized_fusion_weights();
    let reranker = Arc::new(MockReranker);
    let retriever = Arc::new(HybridRetriever::new(
        bm25,
        vector_store,
        reranker,
        cache,
        w_bm25,
        w_dense,
        config.mmr_lambda,
    ));

    let answerer = RagAnswerer::new(retriever, gateway, config.confidence_threshold);
    let answer = answerer
        .answer("When is daycare enrollment due?", None, Some(3), None, &[])
        .await?;

    println!("\nanswer: {}", answer.answer);
    println!("confidence: {:.2}", answer.confidence);
    for source in &answer.sources {
        println!("  source {} ({:.2}): {}", source.chunk_id, source.relevance_score, source.text);
    }

    ledger.flush_snapshot().await?;

    Ok(())
}
