//! In-process collaborators for handler tests

use crate::AppState;
use async_trait::async_trait;
use futures::StreamExt;
use moviemate_common::{
    config::AppConfig,
    embeddings::HashEmbedder,
    errors::{AppError, Result},
    types::Chunk,
    Embedder, LanguageModel, TextStream,
};
use moviemate_search::{ChunkIndexer, DistanceMetric, InMemoryIndex, VectorIndex};
use std::sync::Arc;

pub const DIMENSION: usize = 64;

/// Answers every synthesis prompt with the same two-part sentence
pub struct CannedModel;

#[async_trait]
impl LanguageModel for CannedModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if prompt.contains("<Standalone question>") {
            return Ok("Who directed Inception?".to_string());
        }
        Ok("Inception was directed by Christopher Nolan.".to_string())
    }

    async fn stream(&self, _prompt: &str) -> Result<TextStream> {
        let parts = vec![
            Ok::<_, AppError>("Inception was directed ".to_string()),
            Ok("by Christopher Nolan.".to_string()),
        ];
        Ok(futures::stream::iter(parts).boxed())
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

pub async fn test_state(max_sessions: usize) -> AppState {
    let mut config = AppConfig::default();
    config.server.max_sessions = max_sessions;
    config.embedding.provider = "hash".to_string();
    config.embedding.dimension = DIMENSION;

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DIMENSION));
    let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(DIMENSION, DistanceMetric::DotProduct));

    let chunks = vec![
        Chunk::new("inception-0", "A thief plants an idea through shared dreaming.")
            .with_metadata("title", "Inception")
            .with_metadata("genres", vec!["sci-fi"]),
        Chunk::new("titanic-0", "A romance aboard a doomed ocean liner.")
            .with_metadata("title", "Titanic")
            .with_metadata("genres", vec!["romance"]),
    ];
    ChunkIndexer::new(embedder.clone(), index.clone())
        .index_chunks(chunks)
        .await
        .unwrap();

    AppState::new(config, embedder, Arc::new(CannedModel), index)
}
