//! MovieMate Search
//!
//! Provides:
//! - The vector index contract with in-memory and Pinecone implementations
//! - Vector retrieval with metadata filtering
//! - Chunk embedding and indexing

pub mod index;
pub mod indexer;
pub mod retrieval;

pub use index::{create_index, DistanceMetric, InMemoryIndex, PineconeIndex, VectorIndex};
pub use indexer::{load_chunks_jsonl, ChunkIndexer};
pub use retrieval::{Retriever, VectorRetriever};
