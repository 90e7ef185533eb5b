//! `ragsmith-core`: ingestion pipeline, controlled-vocabulary enrichment,
//! hybrid BM25+dense retrieval, and confidence-gated RAG chat over a corpus
//! of heterogeneous documents (email, markdown, chat exports, and more).
//!
//! The crate is organized bottom-up: document identity and configuration
//! ([`document`], [`config`]), the controlled vocabulary and cost ledger
//! ([`vocabulary`], [`cost_ledger`]), the LLM Gateway ([`llm`]), structure-
//! aware chunking ([`chunking`]), the embedder/reranker adapters
//! ([`embedder`], [`reranker`]), the BM25/vector/cache indexes ([`index`]),
//! hybrid retrieval ([`retrieval`]), enrichment ([`enrichment`]), the
//! quality gate ([`quality_gate`]), and finally the two top-level
//! orchestrators: the ingestion [`pipeline`] and the [`rag_answerer`].

pub mod chunking;
pub mod config;
pub mod cost_ledger;
pub mod document;
pub mod embedder;
pub mod enrichment;
pub mod error;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod quality_gate;
pub mod rag_answerer;
pub mod reranker;
pub mod retrieval;
pub mod telemetry;
pub mod vocabulary;

pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Document, DocType};
pub use error::RagError;
pub use pipeline::{Context as IngestionContext, IngestionPipeline, PipelineOutcome};
pub use rag_answerer::{Answer, RagAnswerer};
