//! The ingestion pipeline: orchestrates triage, enrichment, the quality
//! gate, chunking, storage, and BM25 indexing in fixed order.
//!
//! Unlike a pluggable guardrail chain, each stage here has a distinct typed
//! output (a duplicate lookup, an enrichment report, a gate score, a chunk
//! list) so the orchestrator is a concrete sequence of stage calls rather
//! than a loop over a single `dyn Stage` trait — there is no shared
//! `InputT -> OutputT` shape to erase to. Stage independence is preserved by
//! routing every inter-stage value through [`Context`] instead of letting
//! one stage reach into another's internals.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Semaphore};
use tracing::{info, instrument, warn};

use crate::chunking::Chunker;
use crate::document::Document;
use crate::enrichment::EnrichmentService;
use crate::error::RagError;
use crate::index::{Bm25Index, SearchCache, VectorStore, flatten_metadata};
use crate::quality_gate::{CorpusStats, GateOutcome, QualityGate, SignalScore};

/// Per-ingestion context threaded through every stage.
#[derive(Debug, Clone)]
pub struct Context {
    pub doc_id: String,
    pub started_at: Instant,
    pub enable_gating: bool,
    pub enable_export: bool,
}

/// The converted, non-error result of running the pipeline over one document
///.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Stored {
        doc_id: String,
        chunk_count: usize,
    },
    Duplicate {
        existing_id: String,
    },
    Gated {
        signal: SignalScore,
    },
    Failed {
        reason: String,
    },
}

struct StoredDoc {
    short_id: String,
    topics: Vec<String>,
}

/// Orchestrates one document's journey from raw bytes to searchable chunks.
pub struct IngestionPipeline {
    enrichment: Arc<EnrichmentService>,
    quality_gate: Arc<QualityGate>,
    chunker: Arc<Chunker>,
    vector_store: Arc<dyn VectorStore>,
    bm25: Arc<Bm25Index>,
    cache: Arc<SearchCache>,
    documents: Mutex<std::collections::HashMap<String, StoredDoc>>,
    seen_topics: Mutex<HashSet<String>>,
    in_flight: Semaphore,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        enrichment: Arc<EnrichmentService>,
        quality_gate: Arc<QualityGate>,
        chunker: Arc<Chunker>,
        vector_store: Arc<dyn VectorStore>,
        bm25: Arc<Bm25Index>,
        cache: Arc<SearchCache>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            enrichment,
            quality_gate,
            chunker,
            vector_store,
            bm25,
            cache,
            documents: Mutex::new(std::collections::HashMap::new()),
            seen_topics: Mutex::new(HashSet::new()),
            in_flight: Semaphore::new(max_in_flight.max(1)),
        }
    }

    /// Run the full ingestion pipeline for `doc`.
    ///
    /// # Errors
    ///
    /// Returns `Err` only for [`RagError::Busy`] (in-flight limit reached),
    /// [`RagError::Cancelled`], or [`RagError::BudgetExceeded`] — every other
    /// failure class is converted into [`PipelineOutcome::Failed`].
    #[instrument(level = "trace", skip_all, fields(doc_id = %doc.short_id))]
    pub async fn ingest(&self, doc: Document, ctx: Context) -> Result<PipelineOutcome, RagError> {
        let _permit = self.in_flight.try_acquire().map_err(|_| RagError::Busy)?;

        // Triage: content-hash short-circuit.
        if let Some(existing) = self.documents.lock().await.get(&doc.content_hash) {
            info!(doc_id = %doc.short_id, existing = %existing.short_id, "duplicate content, skipping");
            return Ok(PipelineOutcome::Duplicate {
                existing_id: existing.short_id.clone(),
            });
        }

        let report = match self.enrichment.enrich(&doc).await {
            Ok(report) => report,
            Err(RagError::Cancelled) => return Err(RagError::Cancelled),
            Err(RagError::BudgetExceeded) => return Err(RagError::BudgetExceeded),
            Err(e) => {
                warn!(doc_id = %doc.short_id, error = %e, "enrichment failed, aborting document");
                return Ok(PipelineOutcome::Failed { reason: e.to_string() });
            }
        };
        let metadata = match report.metadata {
            Some(m) => m,
            None => {
                return Ok(PipelineOutcome::Failed {
                    reason: "enrichment produced no metadata".to_string(),
                });
            }
        };

        let corpus_stats = self.corpus_stats_for(&metadata.topics).await;
        let (signal, outcome) = self.quality_gate.evaluate(&metadata, &corpus_stats);
        if ctx.enable_gating && outcome == GateOutcome::Gated {
            // Gating is authorized to short-circuit with a non-error stop; we
            // still persist a minimal record so later duplicates resolve.
            self.documents.lock().await.insert(
                doc.content_hash.clone(),
                StoredDoc {
                    short_id: doc.short_id.clone(),
                    topics: metadata.topics.clone(),
                },
            );
            return Ok(PipelineOutcome::Gated { signal });
        }

        let chunks = match self.chunker.chunk(&doc) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(doc_id = %doc.short_id, error = %e, "chunking failed, aborting document");
                return Ok(PipelineOutcome::Failed { reason: e.to_string() });
            }
        };

        // Storage: either every chunk lands in both the vector store and the
        // BM25 index, or none does.
        let mut upserted: Vec<String> = Vec::with_capacity(chunks.len());
        let metadata_json = serde_json::to_value(&metadata).unwrap_or(serde_json::json!({}));
        let flat_metadata = flatten_metadata(&metadata_json);
        let storage_result = async {
            for chunk in &chunks {
                let mut meta = flat_metadata.clone();
                meta.insert("source_doc_id".to_string(), doc.short_id.clone());
                self.vector_store.upsert(&chunk.chunk_id, &chunk.text, meta).await?;
                upserted.push(chunk.chunk_id.clone());
            }
            Ok::<(), RagError>(())
        }
        .await;

        if let Err(e) = storage_result {
            for chunk_id in &upserted {
                let _ = self.vector_store.delete(chunk_id).await;
            }
            warn!(doc_id = %doc.short_id, error = %e, "storage failed, rolled back partial chunks");
            return Ok(PipelineOutcome::Failed { reason: e.to_string() });
        }

        for chunk in &chunks {
            self.bm25.add(&chunk.chunk_id, &chunk.text).await;
        }

        self.cache.invalidate_all().await;

        self.documents.lock().await.insert(
            doc.content_hash.clone(),
            StoredDoc {
                short_id: doc.short_id.clone(),
                topics: metadata.topics.clone(),
            },
        );
        let mut seen = self.seen_topics.lock().await;
        seen.extend(metadata.topics.iter().cloned());

        Ok(PipelineOutcome::Stored {
            doc_id: doc.short_id,
            chunk_count: chunks.len(),
        })
    }

    async fn corpus_stats_for(&self, topics: &[String]) -> CorpusStats {
        if topics.is_empty() {
            return CorpusStats::default();
        }
        let seen = self.seen_topics.lock().await;
        let overlap = topics.iter().filter(|t| seen.contains(*t)).count();
        CorpusStats {
            topic_overlap_ratio: overlap as f64 / topics.len() as f64,
            age_days: 0.0,
        }
    }
}
