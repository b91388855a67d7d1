//! Vector index contract
//!
//! Two implementations:
//! - `InMemoryIndex` (exact search, used offline and in tests)
//! - `PineconeIndex` (REST client for a hosted Pinecone index)

mod memory;
mod pinecone;

pub use memory::InMemoryIndex;
pub use pinecone::PineconeIndex;

use async_trait::async_trait;
use moviemate_common::config::IndexConfig;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::types::{Chunk, Metadata, MetadataFilters, ScoredChunk};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Similarity measure; every variant scores higher for closer vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    DotProduct,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::DotProduct => "dotproduct",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Similarity of two vectors of equal length
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::DotProduct => dot(a, b),
            DistanceMetric::Cosine => {
                let norms = dot(a, a).sqrt() * dot(b, b).sqrt();
                if norms == 0.0 {
                    0.0
                } else {
                    dot(a, b) / norms
                }
            }
            DistanceMetric::Euclidean => {
                let distance = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dotproduct" | "dot_product" | "dot" => Ok(DistanceMetric::DotProduct),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(AppError::config(format!("Unknown distance metric: {}", other))),
        }
    }
}

/// One stored vector with the chunk it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

impl VectorRecord {
    /// Build a record from an embedded chunk
    pub fn from_chunk(chunk: &Chunk) -> Result<Self> {
        let vector = chunk
            .embedding()
            .ok_or_else(|| AppError::config(format!("chunk {} has no embedding", chunk.id)))?;

        Ok(Self {
            id: chunk.id.clone(),
            vector: vector.to_vec(),
            text: chunk.text.clone(),
            metadata: chunk.metadata.clone(),
        })
    }
}

/// Similarity search parameters
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filters: MetadataFilters,
}

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

impl From<IndexMatch> for ScoredChunk {
    fn from(m: IndexMatch) -> Self {
        let mut chunk = Chunk::new(m.id, m.text);
        chunk.metadata = m.metadata;
        ScoredChunk { chunk, score: m.score }
    }
}

/// Vector store
///
/// `search` returns at most `top_k` matches sorted by descending score.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace records by id, returning how many were written
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Nearest-neighbour search restricted to records matching the filters
    async fn search(&self, query: &VectorQuery) -> Result<Vec<IndexMatch>>;

    /// Dimensionality of stored vectors
    fn dimension(&self) -> usize;

    /// Configured distance metric
    fn metric(&self) -> DistanceMetric;
}

/// Create a vector index based on configuration
pub fn create_index(config: &IndexConfig, dimension: usize) -> Result<Arc<dyn VectorIndex>> {
    let metric: DistanceMetric = config.metric.parse()?;

    match config.provider.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(dimension, metric))),
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config, dimension, metric)?)),
        other => Err(AppError::config(format!("Unknown index provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_scores_prefer_closer_vectors() {
        let query = [1.0, 0.0];
        let near = [0.9, 0.1];
        let far = [0.0, 1.0];
        for metric in [DistanceMetric::Cosine, DistanceMetric::DotProduct, DistanceMetric::Euclidean] {
            assert!(metric.score(&query, &near) > metric.score(&query, &far), "{}", metric);
        }
    }

    #[test]
    fn test_euclidean_identity_scores_one() {
        let v = [0.3, -0.2, 0.7];
        assert!((DistanceMetric::Euclidean.score(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("dotproduct".parse::<DistanceMetric>().unwrap(), DistanceMetric::DotProduct);
        assert_eq!("Cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let config = IndexConfig {
            provider: "faiss".to_string(),
            ..IndexConfig::default()
        };
        assert!(create_index(&config, 8).is_err());
    }

    #[test]
    fn test_record_requires_embedding() {
        let chunk = Chunk::new("c1", "text");
        assert!(VectorRecord::from_chunk(&chunk).is_err());
    }
}
