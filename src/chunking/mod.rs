//! Structure-aware chunking.

mod chunker;
mod types;

pub use chunker::{Chunker, ChunkerConfig};
pub use types::{Chunk, ChunkType, estimate_tokens};
