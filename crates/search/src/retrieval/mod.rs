//! Retrieval over the vector index
//!
//! A retriever turns a `QueryRequest` into at most `k` scored chunks,
//! sorted by descending score.

mod vector;

pub use vector::VectorRetriever;

use moviemate_common::errors::Result;
use moviemate_common::types::{QueryRequest, ScoredChunk};

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve chunks matching the query
    async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<ScoredChunk>>;
}
