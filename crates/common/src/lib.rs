//! MovieMate Common Library
//!
//! Shared code for all MovieMate crates including:
//! - Chunk, metadata filter and conversation types
//! - Embedding client abstraction
//! - LLM client abstraction (complete + stream)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod types;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use llm::{LanguageModel, TextStream};
pub use types::{
    ChatMode, Chunk, ConversationHistory, ConversationTurn, MetadataFilters, MetadataValue, QueryRequest,
    Role, ScoredChunk,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
