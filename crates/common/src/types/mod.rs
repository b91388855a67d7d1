//! Domain types shared by retrieval, synthesis and chat
//!
//! - `Chunk`: immutable unit of retrievable movie content
//! - `MetadataFilters`: conjunctive key -> accepted values predicate
//! - `QueryRequest` / `ScoredChunk`: retriever input and output
//! - `ConversationHistory`: append-only dialogue state owned by a chat engine

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Default number of chunks returned by a similarity search
pub const DEFAULT_TOP_K: usize = 10;

/// Metadata attached to a chunk
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Scalar or list metadata value
///
/// Dates are carried as ISO `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl MetadataValue {
    /// Whether a stored value satisfies one accepted filter value.
    ///
    /// A list value matches when the accepted value is one of its elements.
    pub fn matches(&self, accepted: &MetadataValue) -> bool {
        match (self, accepted) {
            (MetadataValue::List(items), MetadataValue::List(wanted)) => {
                wanted.iter().any(|w| items.contains(w))
            }
            (MetadataValue::List(items), other) => {
                let wanted = other.to_string();
                items.iter().any(|i| *i == wanted)
            }
            (MetadataValue::Text(a), MetadataValue::Text(b)) => a == b,
            (MetadataValue::Number(a), MetadataValue::Number(b)) => a == b,
            (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => f.write_str(s),
            MetadataValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

impl From<Vec<&str>> for MetadataValue {
    fn from(value: Vec<&str>) -> Self {
        MetadataValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// A chunk of movie content that is independently embedded and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Attach the embedding. A chunk is embedded exactly once.
    pub fn set_embedding(&mut self, embedding: Vec<f32>, dimension: usize) -> Result<()> {
        if self.embedding.is_some() {
            return Err(AppError::config(format!(
                "chunk {} already carries an embedding",
                self.id
            )));
        }
        if embedding.len() != dimension {
            return Err(AppError::config(format!(
                "chunk {} embedding has dimension {}, expected {}",
                self.id,
                embedding.len(),
                dimension
            )));
        }
        self.embedding = Some(embedding);
        Ok(())
    }

    /// Metadata rendered as `key: value` pairs
    pub fn metadata_str(&self) -> String {
        self.metadata
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Text handed to the embedding provider: metadata header plus plot body
    pub fn embedding_text(&self) -> String {
        if self.metadata.is_empty() {
            return self.text.clone();
        }
        format!(
            "Movie Metadata:\n {}\n Plot Summary:\n {}",
            self.metadata_str(),
            self.text
        )
    }
}

/// Chunk paired with its similarity score (higher is more relevant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Metadata predicate: every key must match, a key matches if ANY of its values do.
///
/// Replaced wholesale between queries, never merged. Every key carries at
/// least one accepted value; deserialization rejects empty lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataFilters(BTreeMap<String, Vec<MetadataValue>>);

impl<'de> Deserialize<'de> for MetadataFilters {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let filters = Self(BTreeMap::deserialize(deserializer)?);
        filters.validate().map_err(serde::de::Error::custom)?;
        Ok(filters)
    }
}

impl MetadataFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key with its accepted values. List values are flattened.
    pub fn with<V>(mut self, key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<MetadataValue>,
    {
        let accepted = values
            .into_iter()
            .map(Into::into)
            .flat_map(|v| match v {
                MetadataValue::List(items) => items.into_iter().map(MetadataValue::Text).collect(),
                other => vec![other],
            })
            .collect();
        self.0.insert(key.into(), accepted);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A key with no accepted values would match nothing.
    pub fn validate(&self) -> Result<()> {
        match self.0.iter().find(|(_, accepted)| accepted.is_empty()) {
            Some((key, _)) => Err(AppError::config(format!(
                "metadata filter '{}' has no accepted values",
                key
            ))),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<MetadataValue>)> {
        self.0.iter()
    }

    /// Conjunctive across keys; a missing key never matches.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0.iter().all(|(key, accepted)| {
            metadata
                .get(key)
                .map(|value| accepted.iter().any(|a| value.matches(a)))
                .unwrap_or(false)
        })
    }
}

/// Input to a retriever
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub embedding: Option<Vec<f32>>,
    pub top_k: usize,
    pub filters: MetadataFilters,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            embedding: None,
            top_k: DEFAULT_TOP_K,
            filters: MetadataFilters::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_filters(mut self, filters: MetadataFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Conversation strategy, resolved once when a chat engine is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Rewrite each follow-up into a standalone question
    CondenseQuestion,
    /// ReAct loop with the knowledge base exposed as a tool
    AgenticToolUse,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::CondenseQuestion => "condense_question",
            ChatMode::AgenticToolUse => "agentic_tool_use",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "condense_question" => Ok(ChatMode::CondenseQuestion),
            "agentic_tool_use" | "react" | "best" | "openai" => Ok(ChatMode::AgenticToolUse),
            other => Err(AppError::config(format!("Unknown chat mode: {}", other))),
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only dialogue. Turns are only ever added as a user/assistant pair.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a history from prior turns (e.g. restored by the caller)
    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Commit one exchange: the user turn then the assistant turn.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.reserve(2);
        self.turns.push(ConversationTurn::new(Role::User, user));
        self.turns.push(ConversationTurn::new(Role::Assistant, assistant));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render as `role: content` lines for prompting
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
