//! Vector similarity retrieval
//!
//! Embeds the query text when no embedding is supplied, then searches the index.

use super::Retriever;
use crate::index::{VectorIndex, VectorQuery};
use moviemate_common::embeddings::Embedder;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::metrics;
use moviemate_common::types::{MetadataFilters, QueryRequest, ScoredChunk, DEFAULT_TOP_K};
use std::sync::Arc;
use std::time::Instant;

/// Retriever backed by a vector index
///
/// Holds the default `k` and the active filters. Filters persist until
/// replaced with `set_filters`; callers must not change them while a
/// `retrieve` built from them is in flight.
pub struct VectorRetriever {
    index: Arc<dyn VectorIndex>,
    embedder: Option<Arc<dyn Embedder>>,
    similarity_top_k: usize,
    filters: MetadataFilters,
}

impl VectorRetriever {
    /// Create a new vector retriever
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            index,
            embedder,
            similarity_top_k: DEFAULT_TOP_K,
            filters: MetadataFilters::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(AppError::config("similarity_top_k must be at least 1"));
        }
        self.similarity_top_k = top_k;
        Ok(self)
    }

    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Replace the active filters wholesale
    pub fn set_filters(&mut self, filters: MetadataFilters) {
        self.filters = filters;
    }

    pub fn filters(&self) -> &MetadataFilters {
        &self.filters
    }

    pub fn similarity_top_k(&self) -> usize {
        self.similarity_top_k
    }

    /// Build a request carrying this retriever's `k` and active filters
    pub fn request(&self, query: impl Into<String>) -> QueryRequest {
        QueryRequest::new(query)
            .with_top_k(self.similarity_top_k)
            .with_filters(self.filters.clone())
    }

    async fn resolve_embedding(&self, request: &QueryRequest) -> Result<Vec<f32>> {
        if let Some(embedding) = &request.embedding {
            return Ok(embedding.clone());
        }

        let embedder = self.embedder.as_ref().ok_or_else(|| {
            AppError::config("No embedding provider configured and no query embedding supplied")
        })?;

        embedder.embed(&request.query).await.map_err(|e| match e {
            AppError::Retrieval { .. } => e,
            other => AppError::retrieval(format!("Query embedding failed: {}", other)),
        })
    }
}

#[async_trait::async_trait]
impl Retriever for VectorRetriever {
    #[tracing::instrument(skip(self, request), fields(top_k = request.top_k, filtered = !request.filters.is_empty()))]
    async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<ScoredChunk>> {
        if request.top_k == 0 {
            return Err(AppError::Validation {
                message: "top_k must be at least 1".to_string(),
                field: Some("top_k".to_string()),
            });
        }
        request.filters.validate()?;

        let start = Instant::now();
        let vector = self.resolve_embedding(request).await?;

        let query = VectorQuery {
            vector,
            top_k: request.top_k,
            filters: request.filters.clone(),
        };

        let matches = self.index.search(&query).await.map_err(|e| match e {
            AppError::Retrieval { .. } => e,
            other => AppError::retrieval(format!("Vector search failed: {}", other)),
        })?;

        let chunks: Vec<ScoredChunk> = matches
            .into_iter()
            .take(request.top_k)
            .map(ScoredChunk::from)
            .collect();

        metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            !request.filters.is_empty(),
            chunks.len(),
        );
        tracing::debug!(results = chunks.len(), "Vector retrieval complete");

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DistanceMetric, InMemoryIndex, VectorRecord};
    use moviemate_common::embeddings::HashEmbedder;
    use moviemate_common::errors::ErrorCode;
    use moviemate_common::types::Chunk;

    async fn index_with(embedder: &dyn Embedder, chunks: Vec<Chunk>) -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new(embedder.dimension(), DistanceMetric::DotProduct));
        let mut records = Vec::new();
        for mut chunk in chunks {
            let vector = embedder.embed(&chunk.embedding_text()).await.unwrap();
            chunk.set_embedding(vector, embedder.dimension()).unwrap();
            records.push(VectorRecord::from_chunk(&chunk).unwrap());
        }
        index.upsert(records).await.unwrap();
        index
    }

    fn movies() -> Vec<Chunk> {
        vec![
            Chunk::new("matrix", "A hacker discovers reality is a simulation run by machines.")
                .with_metadata("genres", vec!["sci-fi", "action"]),
            Chunk::new("titanic", "A romance blooms aboard a doomed ocean liner.")
                .with_metadata("genres", vec!["romance", "drama"]),
            Chunk::new("inception", "A thief steals secrets by entering dreams.")
                .with_metadata("genres", vec!["sci-fi"]),
        ]
    }

    #[tokio::test]
    async fn test_embeds_query_and_respects_k() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let index = index_with(embedder.as_ref(), movies()).await;
        let retriever = VectorRetriever::new(index, Some(embedder)).with_top_k(2).unwrap();

        let results = retriever.retrieve(&retriever.request("ocean liner romance")).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "titanic");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_set_filters_replaces_previous() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
        let index = index_with(embedder.as_ref(), movies()).await;
        let mut retriever = VectorRetriever::new(index, Some(embedder));

        retriever.set_filters(MetadataFilters::new().with("genres", ["romance"]));
        let results = retriever.retrieve(&retriever.request("dreams")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "titanic");

        retriever.set_filters(MetadataFilters::new().with("genres", ["sci-fi"]));
        let ids: Vec<_> = retriever
            .retrieve(&retriever.request("dreams"))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.chunk.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"titanic".to_string()));
    }

    #[tokio::test]
    async fn test_own_embedding_is_top_result() {
        let embedder = HashEmbedder::new(64);
        let chunks = movies();
        let target = chunks[2].embedding_text();
        let index = index_with(&embedder, chunks).await;
        let retriever = VectorRetriever::new(index, None);

        let vector = embedder.embed(&target).await.unwrap();
        let request = QueryRequest::new("ignored").with_top_k(3).with_embedding(vector);
        let results = retriever.retrieve(&request).await.unwrap();
        assert_eq!(results[0].chunk.id, "inception");
    }

    #[tokio::test]
    async fn test_missing_embedder_is_configuration_error() {
        let embedder = HashEmbedder::new(16);
        let index = index_with(&embedder, movies()).await;
        let retriever = VectorRetriever::new(index, None);

        let err = retriever.retrieve(&QueryRequest::new("anything")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[tokio::test]
    async fn test_zero_k_rejected() {
        let index = Arc::new(InMemoryIndex::new(4, DistanceMetric::Cosine));
        assert!(VectorRetriever::new(index.clone(), None).with_top_k(0).is_err());

        let retriever = VectorRetriever::new(index, None);
        let request = QueryRequest::new("x").with_top_k(0).with_embedding(vec![0.0; 4]);
        assert!(retriever.retrieve(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_filter_without_values_is_configuration_error() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(32));
        let index = index_with(embedder.as_ref(), movies()).await;
        let retriever = VectorRetriever::new(index, Some(embedder))
            .with_filters(MetadataFilters::new().with("genres", Vec::<&str>::new()));

        let err = retriever.retrieve(&retriever.request("dreams")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }
}
