//! Tools the reasoning agent can call

use crate::query_engine::QueryEngine;
use crate::response::Response;
use async_trait::async_trait;
use moviemate_common::errors::Result;
use std::sync::Arc;

/// Name and description shown to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A capability the agent invokes with a text input
#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    /// Run the tool. The returned response is always complete text.
    async fn invoke(&self, input: &str) -> Result<Response>;
}

/// Exposes a query engine as "ask the movie knowledge base"
pub struct QueryEngineTool {
    engine: Arc<QueryEngine>,
    metadata: ToolMetadata,
}

impl QueryEngineTool {
    pub const DEFAULT_NAME: &'static str = "movie_knowledge_base";

    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self {
            engine,
            metadata: ToolMetadata::new(
                Self::DEFAULT_NAME,
                "Answers questions about movies in the knowledge base: plots, cast, directors, \
                 genres, languages, production companies and release dates. \
                 Input is a standalone question in plain text.",
            ),
        }
    }

    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
impl Tool for QueryEngineTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn invoke(&self, input: &str) -> Result<Response> {
        self.engine.answer(input).await?.collect().await
    }
}
