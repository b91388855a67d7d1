//! Conversational chat engine
//!
//! One `ChatEngine` per session. It owns the history and applies one of two
//! strategies, fixed at construction:
//! - condense-question: rewrite the follow-up, then ask the query engine
//! - agentic tool use: ReAct loop with the query engine exposed as a tool
//!
//! A turn is committed to history (user then assistant) only when it
//! completes. A failed turn, or a stream dropped before its end, leaves the
//! history as it was.

pub mod agent;
pub mod condense;
pub mod tool;

pub use agent::ReActAgent;
pub use condense::QuestionCondenser;
pub use tool::{QueryEngineTool, Tool, ToolMetadata};

use crate::query_engine::QueryEngine;
use crate::response::Response;
use futures::{Stream, StreamExt};
use moviemate_common::config::ChatConfig;
use moviemate_common::errors::Result;
use moviemate_common::metrics;
use moviemate_common::types::{ChatMode, ConversationHistory, ScoredChunk};
use moviemate_common::{LanguageModel, TextStream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, instrument, warn};

enum Strategy {
    Condense {
        condenser: QuestionCondenser,
        query_engine: Arc<QueryEngine>,
    },
    Agent(ReActAgent),
}

/// Per-session conversation orchestrator
pub struct ChatEngine {
    mode: ChatMode,
    strategy: Strategy,
    history: ConversationHistory,
}

impl ChatEngine {
    pub fn new(
        mode: ChatMode,
        llm: Arc<dyn LanguageModel>,
        query_engine: Arc<QueryEngine>,
        max_iterations: usize,
    ) -> Result<Self> {
        let strategy = match mode {
            ChatMode::CondenseQuestion => Strategy::Condense {
                condenser: QuestionCondenser::new(llm),
                query_engine,
            },
            ChatMode::AgenticToolUse => {
                let tool: Arc<dyn Tool> = Arc::new(QueryEngineTool::new(query_engine));
                Strategy::Agent(ReActAgent::new(llm, vec![tool], max_iterations)?)
            }
        };

        Ok(Self {
            mode,
            strategy,
            history: ConversationHistory::new(),
        })
    }

    /// Build from configuration; an unknown mode fails here
    pub fn from_config(
        config: &ChatConfig,
        llm: Arc<dyn LanguageModel>,
        query_engine: Arc<QueryEngine>,
    ) -> Result<Self> {
        let mode: ChatMode = config.mode.parse()?;
        Self::new(mode, llm, query_engine, config.max_iterations)
    }

    /// Start from an existing history
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Forget the conversation
    pub fn reset(&mut self) {
        self.history.clear();
    }

    async fn run_turn(&self, message: &str) -> Result<Response> {
        match &self.strategy {
            Strategy::Condense {
                condenser,
                query_engine,
            } => {
                let question = condenser.condense(&self.history, message).await?;
                query_engine.answer(&question).await
            }
            Strategy::Agent(agent) => agent.run(&self.history, message).await,
        }
    }

    /// Answer a message and commit the turn
    #[instrument(skip(self, message), fields(mode = %self.mode, turns = self.history.len()))]
    pub async fn respond(&mut self, message: &str) -> Result<Response> {
        let result = match self.run_turn(message).await {
            Ok(response) => response.collect().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                let answer = response.as_text().unwrap_or_default();
                self.history.push_exchange(message, answer);
                metrics::record_chat_turn(self.mode.as_str(), "committed");
                Ok(response)
            }
            Err(e) => {
                metrics::record_chat_turn(self.mode.as_str(), "failed");
                warn!(error = %e, "Chat turn failed, history unchanged");
                Err(e)
            }
        }
    }

    /// Answer a message as a stream. The turn is committed when the stream
    /// is read to its end.
    #[instrument(skip(self, message), fields(mode = %self.mode, turns = self.history.len()))]
    pub async fn respond_stream(&mut self, message: &str) -> Result<ChatStream<'_>> {
        let response = match self.run_turn(message).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_chat_turn(self.mode.as_str(), "failed");
                warn!(error = %e, "Chat turn failed, history unchanged");
                return Err(e);
            }
        };

        let (source_chunks, inner) = response.into_parts();
        Ok(ChatStream {
            history: &mut self.history,
            mode: self.mode,
            user_message: message.to_string(),
            source_chunks,
            inner,
            answer: String::new(),
            state: StreamState::Streaming,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Committed,
    Failed,
}

/// Answer increments for one turn, borrowing the session's history
pub struct ChatStream<'a> {
    history: &'a mut ConversationHistory,
    mode: ChatMode,
    user_message: String,
    source_chunks: Vec<ScoredChunk>,
    inner: TextStream,
    answer: String,
    state: StreamState,
}

impl ChatStream<'_> {
    pub fn source_chunks(&self) -> &[ScoredChunk] {
        &self.source_chunks
    }

    /// Text received so far
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn is_committed(&self) -> bool {
        self.state == StreamState::Committed
    }
}

impl Stream for ChatStream<'_> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(delta))) => {
                this.answer.push_str(&delta);
                Poll::Ready(Some(Ok(delta)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.state = StreamState::Failed;
                metrics::record_chat_turn(this.mode.as_str(), "failed");
                warn!(error = %e, "Answer stream failed, history unchanged");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.history
                    .push_exchange(std::mem::take(&mut this.user_message), this.answer.clone());
                this.state = StreamState::Committed;
                metrics::record_chat_turn(this.mode.as_str(), "committed");
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for ChatStream<'_> {
    fn drop(&mut self) {
        if self.state == StreamState::Streaming {
            metrics::record_chat_turn(self.mode.as_str(), "cancelled");
            debug!(received = self.answer.len(), "Answer stream dropped, turn not committed");
        }
    }
}
