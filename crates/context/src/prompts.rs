//! Prompt templates
//!
//! Templates are plain strings with `{name}` placeholders.

/// Answer substituted when the model returns nothing
pub const EMPTY_RESPONSE: &str = "Empty Response";

/// Combines retrieved movie passages (or earlier partial answers) into one answer
pub const TREE_SUMMARIZE_TEMPLATE: &str = "\
Context information about movies from multiple sources is below.
---------------------
{context_str}
---------------------
Using only the information from these sources and not prior knowledge, answer the query.
Query: {query_str}
Answer: ";

/// Used when retrieval found nothing
pub const NO_CONTEXT_TEMPLATE: &str = "\
No movie information in the knowledge base matched this question.
Answer briefly from general knowledge and mention that the knowledge base had nothing relevant.
Query: {query_str}
Answer: ";

/// Rewrites a follow-up message into a standalone question
pub const CONDENSE_QUESTION_TEMPLATE: &str = "\
Below is a conversation about movies between a user and an assistant, followed by a new message \
from the user. Rewrite the new message as a single standalone question about movies that can be \
understood without the conversation. Carry over every movie title, genre, actor, director or other \
film detail from the conversation that the new message refers to. Keep the focus on the most recent \
topic.

<Chat History>
{chat_history}

<Follow Up Message>
{question}

<Standalone question>
";

/// ReAct instructions; the transcript is appended after it
pub const REACT_SYSTEM_HEADER: &str = "\
You are a movie expert assistant. Answer the user's message, using the tools below when you need \
facts about movies.

## Tools
{tool_desc}

## Output format
To use a tool, reply with exactly:

Thought: <what you need to find out>
Action: <one of: {tool_names}>
Action Input: <the question for the tool>

You will then receive an Observation with the tool result. When you can answer, reply with:

Thought: I can answer without using any more tools.
Answer: <your answer to the user>

Never write an Observation yourself.
";

/// Conversation and scratchpad given to the agent each step
pub const REACT_TRANSCRIPT_TEMPLATE: &str = "\
## Conversation so far
{chat_history}

## Current message
User: {input}

{scratchpad}";

/// A prompt with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitute placeholders in one pass. Unknown placeholders are left as-is,
    /// and substituted values are never re-scanned.
    pub fn format(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            match after.find('}') {
                Some(close) => {
                    let name = &after[..close];
                    match vars.iter().find(|(k, _)| *k == name) {
                        Some((_, value)) => out.push_str(value),
                        None => {
                            out.push('{');
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

impl From<&str> for PromptTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

/// Rough token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Cut text down to roughly `max_tokens` tokens
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(4);
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}
