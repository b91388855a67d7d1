//! MovieMate Ingestion
//!
//! Hand-off point for pre-chunked movie records:
//! 1. Reads chunks from a JSON-lines file
//! 2. Embeds the ones without an embedding
//! 3. Upserts them into the configured vector index

use clap::Parser;
use moviemate_common::{
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    errors::Result,
    types::Chunk,
    Embedder, VERSION,
};
use moviemate_search::{create_index, load_chunks_jsonl, ChunkIndexer, VectorIndex};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Embed movie chunks and upsert them into the vector index")]
struct Cli {
    /// JSON-lines file, one chunk per line
    path: PathBuf,

    /// Chunks per embedding request (defaults to embedding.batch_size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Embed but do not write to the index
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load();
    init_tracing(
        &config
            .as_ref()
            .map(|c| c.observability.clone())
            .unwrap_or_default(),
    );

    info!("Starting MovieMate Ingestion v{}", VERSION);

    let config = config.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;
    config.validate()?;

    if config.index.provider == "memory" && !cli.dry_run {
        warn!("Index provider is 'memory'; ingested chunks are lost when this process exits");
    }

    let embedder = create_embedder(&config.embedding)?;
    let index = create_index(&config.index, config.embedding.dimension)?;

    let chunks = load_chunks_jsonl(&cli.path).await?;
    info!(path = %cli.path.display(), chunks = chunks.len(), "Loaded chunks");

    let batch_size = cli.batch_size.unwrap_or(config.embedding.batch_size);
    let written = ingest(chunks, embedder, index, batch_size, cli.dry_run).await?;

    info!(written, dry_run = cli.dry_run, "Ingestion complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Embed and upsert. Returns the number of chunks written, or embedded on a dry run.
async fn ingest(
    mut chunks: Vec<Chunk>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
    dry_run: bool,
) -> Result<usize> {
    let indexer = ChunkIndexer::new(embedder, index).with_batch_size(batch_size);

    if dry_run {
        return indexer.embed_chunks(&mut chunks).await;
    }
    indexer.index_chunks(chunks).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use moviemate_common::embeddings::HashEmbedder;
    use moviemate_search::{DistanceMetric, InMemoryIndex};

    fn chunks() -> Vec<Chunk> {
        (0..5)
            .map(|i| Chunk::new(format!("heat-{}", i), format!("Heat plot part {}", i)).with_metadata("title", "Heat"))
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_writes_every_chunk() {
        let index = Arc::new(InMemoryIndex::new(32, DistanceMetric::Cosine));
        let written = ingest(chunks(), Arc::new(HashEmbedder::new(32)), index.clone(), 2, false)
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(index.len().await, 5);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_index_empty() {
        let index = Arc::new(InMemoryIndex::new(32, DistanceMetric::Cosine));
        let embedded = ingest(chunks(), Arc::new(HashEmbedder::new(32)), index.clone(), 2, true)
            .await
            .unwrap();

        assert_eq!(embedded, 5);
        assert!(index.is_empty().await);
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["ingest", "movies.jsonl", "--batch-size", "10", "--dry-run"]);
        assert_eq!(cli.path, PathBuf::from("movies.jsonl"));
        assert_eq!(cli.batch_size, Some(10));
        assert!(cli.dry_run);
    }
}
