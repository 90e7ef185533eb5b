//! Scenario: five near-duplicate paragraphs plus one structurally different
//! hit all match the same query. MMR diversity should keep near-duplicates
//! from crowding out the top-k entirely.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ragsmith_core::embedder::MockEmbedder;
use ragsmith_core::index::{Bm25Index, FlatMetadata, MemoryVectorStore, SearchCache};
use ragsmith_core::reranker::MockReranker;
use ragsmith_core::retrieval::HybridRetriever;

#[tokio::test]
async fn near_duplicates_do_not_crowd_out_the_top_k() {
    let embedder = Arc::new(MockEmbedder::new(16));
    let vector_store = Arc::new(MemoryVectorStore::new(embedder));
    let bm25 = Arc::new(Bm25Index::new());
    let cache = Arc::new(SearchCache::new(32, Duration::from_secs(60)));

    let near_duplicates = [
        "daycare enrollment forms are due by the fifteenth of the month",
        "daycare enrollment forms must be submitted by the fifteenth",
        "enrollment forms for daycare are due the fifteenth of this month",
        "the fifteenth is the deadline for daycare enrollment forms",
        "daycare enrollment paperwork deadline is the fifteenth",
    ];
    for (idx, text) in near_duplicates.iter().enumerate() {
        let chunk_id = format!("dup{idx}");
        bm25.add(&chunk_id, text).await;
        vector_store
            .upsert(&chunk_id, text, FlatMetadata::new())
            .await
            .expect("upsert succeeds");
    }

    let distinct_text = "daycare tuition increased this year due to new staffing requirements";
    bm25.add("distinct", distinct_text).await;
    vector_store
        .upsert("distinct", distinct_text, FlatMetadata::new())
        .await
        .expect("upsert succeeds");

    let retriever = HybridRetriever::new(
        bm25,
        vector_store as Arc<dyn ragsmith_core::index::VectorStore>,
        Arc::new(MockReranker),
        cache,
        0.5,
        0.5,
        0.7,
    );

    let hits = retriever
        .search("daycare enrollment", 3, None)
        .await
        .expect("search succeeds");

    assert_eq!(hits.len(), 3);
    let dup_ids: HashSet<String> = (0..near_duplicates.len()).map(|idx| format!("dup{idx}")).collect();
    let dup_hits_in_top3 = hits.iter().filter(|h| dup_ids.contains(&h.chunk_id)).count();
    assert!(dup_hits_in_top3 <= 2, "expected MMR to limit near-duplicates in the top 3, got {dup_hits_in_top3}");
}
