//! Chunk indexing
//!
//! Embeds chunks that lack a vector, then upserts them into the index.

use crate::index::{VectorIndex, VectorRecord};
use moviemate_common::embeddings::Embedder;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::metrics;
use moviemate_common::types::{Chunk, MetadataValue};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Default number of texts sent per embedding call
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 50;

/// Embeds and stores chunks
pub struct ChunkIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl ChunkIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed every chunk that has no embedding yet. Returns how many were embedded.
    #[instrument(skip(self, chunks), fields(total = chunks.len(), model = self.embedder.model_name()))]
    pub async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<usize> {
        let pending: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding().is_none())
            .map(|(i, _)| i)
            .collect();

        let dimension = self.embedder.dimension();
        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].embedding_text()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(AppError::retrieval(format!(
                    "Embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (&i, vector) in batch.iter().zip(vectors) {
                chunks[i].set_embedding(vector, dimension)?;
            }
        }

        info!(embedded = pending.len(), "Chunks embedded");
        Ok(pending.len())
    }

    /// Upsert embedded chunks. Fails before writing anything if one lacks an embedding.
    #[instrument(skip(self, chunks), fields(total = chunks.len()))]
    pub async fn add_to_index(&self, chunks: &[Chunk]) -> Result<usize> {
        if let Some(missing) = chunks.iter().find(|c| c.embedding().is_none()) {
            return Err(AppError::config(format!(
                "Embedding not set for chunk {}",
                missing.id
            )));
        }

        let records = chunks
            .iter()
            .map(VectorRecord::from_chunk)
            .collect::<Result<Vec<_>>>()?;

        let written = self.index.upsert(records).await?;
        metrics::record_indexed(written);
        info!(written, "Chunks indexed");

        Ok(written)
    }

    /// Embed then upsert
    pub async fn index_chunks(&self, mut chunks: Vec<Chunk>) -> Result<usize> {
        self.embed_chunks(&mut chunks).await?;
        self.add_to_index(&chunks).await
    }
}

/// Cast members kept per chunk; billing order is preserved
pub const MAX_CAST: usize = 15;

/// Parse chunks from JSON lines, one `Chunk` object per non-blank line
pub fn parse_chunks_jsonl(contents: &str) -> Result<Vec<Chunk>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let mut chunk = serde_json::from_str::<Chunk>(line).map_err(|e| AppError::InvalidFormat {
                message: format!("line {}: {}", n + 1, e),
            })?;
            if let Some(MetadataValue::List(cast)) = chunk.metadata.get_mut("cast") {
                cast.truncate(MAX_CAST);
            }
            Ok(chunk)
        })
        .collect()
}

/// Read a JSON-lines chunk file
pub async fn load_chunks_jsonl(path: impl AsRef<Path>) -> Result<Vec<Chunk>> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_chunks_jsonl(&contents)
}
