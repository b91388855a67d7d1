//! MovieMate Context Engine
//!
//! Provides:
//! - Prompt templates and token budgeting
//! - Tree-summarize response synthesis (optionally streamed)
//! - The query engine (retrieve, then synthesize)
//! - Per-session chat engines (condense-question or ReAct agent)

pub mod chat;
pub mod prompts;
pub mod query_engine;
pub mod response;
pub mod synthesizer;

pub use chat::{ChatEngine, ChatStream};
pub use prompts::PromptTemplate;
pub use query_engine::QueryEngine;
pub use response::{Response, ResponseBody};
pub use synthesizer::TreeSummarizer;
