//! Indexing layer: BM25, the vector store adapter, and the search cache.

mod bm25;
mod cache;
mod sqlite_store;
mod vector;

pub use bm25::Bm25Index;
pub use cache::{CacheKey, SearchCache, SearchMode};
pub use sqlite_store::SqliteVectorStore;
pub use vector::{
    FlatMetadata, MemoryVectorStore, VectorStore, distance_to_similarity, flatten_metadata,
    parse_flat_metadata,
};
