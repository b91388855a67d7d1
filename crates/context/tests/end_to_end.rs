//! Index three movies, retrieve with a genre filter, answer through a chat engine.

use async_trait::async_trait;
use futures::StreamExt;
use moviemate_common::config::SynthesisConfig;
use moviemate_common::embeddings::{Embedder, HashEmbedder};
use moviemate_common::errors::{AppError, Result};
use moviemate_common::types::{ChatMode, Chunk, MetadataFilters};
use moviemate_common::{LanguageModel, TextStream};
use moviemate_context::{ChatEngine, QueryEngine, TreeSummarizer};
use moviemate_search::{ChunkIndexer, DistanceMetric, InMemoryIndex, Retriever, VectorRetriever};
use std::sync::{Arc, Mutex};

/// Answers with the titles it finds in the prompt context
struct TitleModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageModel for TitleModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("<Standalone question>") {
            return Ok("Which sci-fi movies are like Inception?".to_string());
        }
        let titles: Vec<&str> = ["The Matrix", "Titanic", "Inception"]
            .into_iter()
            .filter(|t| prompt.contains(&format!("title: {}", t)))
            .collect();
        Ok(format!("Found: {}", titles.join(", ")))
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let text = self.complete(prompt).await?;
        Ok(futures::stream::iter(vec![Ok::<_, AppError>(text)]).boxed())
    }

    fn model_name(&self) -> &str {
        "titles"
    }
}

fn movies() -> Vec<Chunk> {
    vec![
        Chunk::new(
            "matrix-0",
            "A hacker learns the world is a simulation and joins a rebellion against the machines.",
        )
        .with_metadata("title", "The Matrix")
        .with_metadata("genres", vec!["sci-fi"])
        .with_metadata("release_date", "1999-03-31"),
        Chunk::new(
            "titanic-0",
            "A young couple falls in love aboard an ocean liner on its doomed maiden voyage.",
        )
        .with_metadata("title", "Titanic")
        .with_metadata("genres", vec!["romance"])
        .with_metadata("release_date", "1997-12-19"),
        Chunk::new(
            "inception-0",
            "A thief who steals secrets through shared dreaming is asked to plant an idea instead.",
        )
        .with_metadata("title", "Inception")
        .with_metadata("genres", vec!["sci-fi"])
        .with_metadata("release_date", "2010-07-16"),
    ]
}

async fn indexed() -> (Arc<dyn Embedder>, Arc<InMemoryIndex>) {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(256));
    let index = Arc::new(InMemoryIndex::new(256, DistanceMetric::DotProduct));

    let written = ChunkIndexer::new(embedder.clone(), index.clone())
        .index_chunks(movies())
        .await
        .unwrap();
    assert_eq!(written, 3);

    (embedder, index)
}

#[tokio::test]
async fn filtered_retrieval_never_returns_other_genres() {
    let (embedder, index) = indexed().await;
    let retriever = VectorRetriever::new(index, Some(embedder))
        .with_top_k(2)
        .unwrap()
        .with_filters(MetadataFilters::new().with("genres", ["sci-fi"]));

    for query in [
        "ocean liner love story maiden voyage",
        "Titanic",
        "dreams and secrets",
        "machines simulation rebellion",
    ] {
        let results = retriever.retrieve(&retriever.request(query)).await.unwrap();
        let mut ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["inception-0", "matrix-0"], "query: {}", query);
    }
}

#[tokio::test]
async fn own_embedding_retrieves_itself_first() {
    let (embedder, index) = indexed().await;
    let retriever = VectorRetriever::new(index, None).with_top_k(3).unwrap();

    for chunk in movies() {
        let vector = embedder.embed(&chunk.embedding_text()).await.unwrap();
        let request = retriever.request("unused").with_embedding(vector);
        let results = retriever.retrieve(&request).await.unwrap();
        assert_eq!(results[0].chunk.id, chunk.id);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[tokio::test]
async fn chat_turns_answer_from_filtered_context() {
    let (embedder, index) = indexed().await;
    let llm = Arc::new(TitleModel {
        prompts: Mutex::new(Vec::new()),
    });

    let retriever = VectorRetriever::new(index, Some(embedder))
        .with_top_k(2)
        .unwrap()
        .with_filters(MetadataFilters::new().with("genres", ["sci-fi"]));
    let synthesizer = TreeSummarizer::new(
        llm.clone(),
        &SynthesisConfig {
            streaming: true,
            ..SynthesisConfig::default()
        },
    );
    let query_engine = Arc::new(QueryEngine::from_vector_retriever(retriever, synthesizer));
    let mut chat = ChatEngine::new(ChatMode::CondenseQuestion, llm.clone(), query_engine, 5).unwrap();

    let first = chat.respond("Tell me about Titanic").await.unwrap();
    let text = first.as_text().unwrap().to_string();
    assert!(text.contains("Inception") && text.contains("The Matrix"));
    assert!(!text.contains("Titanic"));

    let mut stream = chat.respond_stream("Anything similar?").await.unwrap();
    let mut streamed = String::new();
    while let Some(delta) = stream.next().await {
        streamed.push_str(&delta.unwrap());
    }
    drop(stream);

    assert!(streamed.starts_with("Found: "));
    assert_eq!(chat.history().len(), 4);
    assert_eq!(chat.history().turns()[2].content, "Anything similar?");

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts
        .iter()
        .any(|p| p.contains("Query: Which sci-fi movies are like Inception?")));
}
