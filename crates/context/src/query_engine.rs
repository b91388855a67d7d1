//! Query engine: retrieve, then synthesize

use crate::response::Response;
use crate::synthesizer::TreeSummarizer;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::types::{MetadataFilters, QueryRequest};
use moviemate_search::{Retriever, VectorRetriever};
use std::sync::Arc;
use tracing::instrument;

/// Stateless retrieval + synthesis pipeline with fixed `k` and filters
pub struct QueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: TreeSummarizer,
    top_k: usize,
    filters: MetadataFilters,
}

impl QueryEngine {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        synthesizer: TreeSummarizer,
        top_k: usize,
        filters: MetadataFilters,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(AppError::config("query engine top_k must be at least 1"));
        }
        Ok(Self {
            retriever,
            synthesizer,
            top_k,
            filters,
        })
    }

    /// Take `k` and the active filters from a vector retriever
    pub fn from_vector_retriever(retriever: VectorRetriever, synthesizer: TreeSummarizer) -> Self {
        let top_k = retriever.similarity_top_k();
        let filters = retriever.filters().clone();
        Self {
            retriever: Arc::new(retriever),
            synthesizer,
            top_k,
            filters,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn filters(&self) -> &MetadataFilters {
        &self.filters
    }

    pub fn streaming(&self) -> bool {
        self.synthesizer.streaming()
    }

    /// Answer a standalone question
    #[instrument(skip(self), fields(top_k = self.top_k))]
    pub async fn answer(&self, query: &str) -> Result<Response> {
        let request = QueryRequest::new(query)
            .with_top_k(self.top_k)
            .with_filters(self.filters.clone());

        let chunks = self.retriever.retrieve(&request).await?;
        tracing::debug!(retrieved = chunks.len(), "Synthesizing answer");

        self.synthesizer.synthesize(query, chunks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use moviemate_common::config::SynthesisConfig;
    use moviemate_common::types::{Chunk, ScoredChunk};
    use moviemate_common::{LanguageModel, TextStream};
    use std::sync::Mutex;

    struct RecordingRetriever {
        requests: Mutex<Vec<QueryRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(&self, request: &QueryRequest) -> Result<Vec<ScoredChunk>> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(AppError::retrieval("index unavailable"));
            }
            Ok(vec![ScoredChunk {
                chunk: Chunk::new("heat", "Pacino chases De Niro across Los Angeles."),
                score: 0.9,
            }])
        }
    }

    struct FixedModel;

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("Pacino"));
            Ok("Michael Mann directed Heat.".to_string())
        }

        async fn stream(&self, prompt: &str) -> Result<TextStream> {
            Ok(moviemate_common::llm::once_stream(self.complete(prompt).await?))
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn engine(retriever: Arc<RecordingRetriever>, filters: MetadataFilters) -> QueryEngine {
        let synthesizer = TreeSummarizer::new(Arc::new(FixedModel), &SynthesisConfig::default());
        QueryEngine::new(retriever, synthesizer, 3, filters).unwrap()
    }

    #[tokio::test]
    async fn test_answer_passes_fixed_k_and_filters() {
        let retriever = Arc::new(RecordingRetriever {
            requests: Mutex::new(Vec::new()),
            fail: false,
        });
        let filters = MetadataFilters::new().with("genres", ["crime"]);
        let engine = engine(retriever.clone(), filters.clone());

        let response = engine.answer("Who directed Heat?").await.unwrap();
        assert_eq!(response.source_chunks.len(), 1);
        assert_eq!(response.into_text().await.unwrap(), "Michael Mann directed Heat.");

        let requests = retriever.requests.lock().unwrap();
        assert_eq!(requests[0].top_k, 3);
        assert_eq!(requests[0].filters, filters);
        assert_eq!(requests[0].query, "Who directed Heat?");
    }

    #[tokio::test]
    async fn test_retrieval_error_propagates() {
        let retriever = Arc::new(RecordingRetriever {
            requests: Mutex::new(Vec::new()),
            fail: true,
        });
        let err = engine(retriever, MetadataFilters::new())
            .answer("anything")
            .await
            .unwrap_err();
        assert_eq!(err.code(), moviemate_common::errors::ErrorCode::RetrievalError);
    }

    #[test]
    fn test_zero_k_rejected() {
        let retriever = Arc::new(RecordingRetriever {
            requests: Mutex::new(Vec::new()),
            fail: false,
        });
        let synthesizer = TreeSummarizer::new(Arc::new(FixedModel), &SynthesisConfig::default());
        assert!(QueryEngine::new(retriever, synthesizer, 0, MetadataFilters::new()).is_err());
    }
}
