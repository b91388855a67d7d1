//! ReAct agent strategy
//!
//! Reasoning → {ToolCall → Observation → Reasoning}* → Answer, bounded by
//! `max_iterations` reasoning steps.

use super::tool::Tool;
use crate::prompts::{PromptTemplate, EMPTY_RESPONSE, REACT_SYSTEM_HEADER, REACT_TRANSCRIPT_TEMPLATE};
use crate::response::Response;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::llm::collect_stream;
use moviemate_common::metrics;
use moviemate_common::types::ConversationHistory;
use moviemate_common::LanguageModel;
use regex_lite::Regex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// One parsed reasoning step
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Action { tool: String, input: Option<String> },
    Answer(String),
}

/// Parses `Thought / Action / Action Input / Answer` output
struct OutputParser {
    thought: Regex,
    action: Regex,
    action_input: Regex,
    answer: Regex,
}

impl OutputParser {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| AppError::Internal {
                message: format!("Invalid agent output pattern: {}", e),
            })
        };

        Ok(Self {
            thought: compile(r"(?m)^\s*Thought:\s*(.*)$")?,
            action: compile(r"(?m)^\s*Action:\s*(.+?)\s*$")?,
            action_input: compile(r"(?s)Action Input:\s*(.*)")?,
            answer: compile(r"(?s)(?:^|\n)\s*(?:Final\s+)?Answer:\s*(.*)")?,
        })
    }

    fn thought<'a>(&self, output: &'a str) -> Option<&'a str> {
        self.thought
            .captures(output)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim())
    }

    fn parse(&self, output: &str) -> Step {
        let action = self.action.captures(output);
        let answer = self.answer.captures(output);

        let answer_first = match (&action, &answer) {
            (Some(a), Some(b)) => match (a.get(0), b.get(0)) {
                (Some(a), Some(b)) => b.start() < a.start(),
                _ => false,
            },
            (None, _) => true,
            (Some(_), None) => false,
        };

        if answer_first {
            let text = answer
                .as_ref()
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or(output);
            return Step::Answer(text.trim().to_string());
        }

        let (tool, rest) = match action.as_ref().and_then(|c| Some((c.get(1)?, c.get(0)?))) {
            Some((name, whole)) => (name.as_str().trim().to_string(), &output[whole.end()..]),
            None => return Step::Answer(output.trim().to_string()),
        };

        let input = self
            .action_input
            .captures(rest)
            .and_then(|c| c.get(1))
            .map(|m| normalize_input(m.as_str()))
            .filter(|i| !i.is_empty());

        Step::Action { tool, input }
    }
}

/// Drop any invented observation and unwrap `{"input": ...}` JSON
fn normalize_input(raw: &str) -> String {
    let raw = raw.split("\nObservation:").next().unwrap_or(raw).trim();

    if raw.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
            for key in ["input", "query", "question"] {
                if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                    return text.trim().to_string();
                }
            }
        }
    }
    raw.to_string()
}

/// Tool-using reasoning loop
pub struct ReActAgent {
    llm: Arc<dyn LanguageModel>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
    header: PromptTemplate,
    transcript: PromptTemplate,
    parser: OutputParser,
}

impl ReActAgent {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        tools: Vec<Arc<dyn Tool>>,
        max_iterations: usize,
    ) -> Result<Self> {
        if max_iterations == 0 {
            return Err(AppError::config("agent max_iterations must be at least 1"));
        }
        if tools.is_empty() {
            return Err(AppError::config("agent requires at least one tool"));
        }

        Ok(Self {
            llm,
            tools,
            max_iterations,
            header: PromptTemplate::new(REACT_SYSTEM_HEADER),
            transcript: PromptTemplate::new(REACT_TRANSCRIPT_TEMPLATE),
            parser: OutputParser::new()?,
        })
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    fn tool_names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.metadata().name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn system_header(&self) -> String {
        let tool_desc = self
            .tools
            .iter()
            .map(|t| format!("- {}: {}", t.metadata().name, t.metadata().description))
            .collect::<Vec<_>>()
            .join("\n");

        self.header
            .format(&[("tool_desc", &tool_desc), ("tool_names", &self.tool_names())])
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.metadata().name == name)
    }

    /// Run the loop for one user message. The final answer is complete text.
    #[instrument(skip_all, fields(max_iterations = self.max_iterations))]
    pub async fn run(&self, history: &ConversationHistory, message: &str) -> Result<Response> {
        let header = self.system_header();
        let chat_history = if history.is_empty() {
            "(no earlier messages)".to_string()
        } else {
            history.render()
        };

        let mut scratchpad = String::new();
        let mut sources = Vec::new();
        let mut invocations = 0;

        for iteration in 1..=self.max_iterations {
            let prompt = format!(
                "{}\n{}",
                header,
                self.transcript.format(&[
                    ("chat_history", &chat_history),
                    ("input", message),
                    ("scratchpad", &scratchpad),
                ])
            );

            let output = self.llm.complete(&prompt).await?;
            if let Some(thought) = self.parser.thought(&output) {
                debug!(iteration, thought, "Agent reasoning");
            }

            let (tool, input) = match self.parser.parse(&output) {
                Step::Answer(answer) => {
                    debug!(iteration, invocations, "Agent reached final answer");
                    let answer = if answer.is_empty() {
                        EMPTY_RESPONSE.to_string()
                    } else {
                        answer
                    };
                    return Ok(Response::text(answer, sources));
                }
                Step::Action { tool, input } => (tool, input),
            };

            let observation = match (self.find_tool(&tool), input) {
                (Some(found), Some(input)) => {
                    invocations += 1;
                    metrics::record_tool_call(&found.metadata().name);
                    debug!(iteration, tool = %tool, input = %input, "Agent tool call");

                    let (chunks, stream) = found.invoke(&input).await?.into_parts();
                    sources.extend(chunks);
                    collect_stream(stream).await?
                }
                (Some(_), None) => "Error: the Action Input was missing.".to_string(),
                (None, _) => format!(
                    "Error: there is no tool named '{}'. Use one of: {}.",
                    tool,
                    self.tool_names()
                ),
            };

            let step = output.split("\nObservation:").next().unwrap_or(&output).trim();
            scratchpad.push_str(step);
            scratchpad.push_str("\nObservation: ");
            scratchpad.push_str(observation.trim());
            scratchpad.push_str("\n\n");
        }

        warn!(
            max_iterations = self.max_iterations,
            invocations, "Agent did not reach a final answer"
        );
        Err(AppError::AgentLoopExceeded {
            max_iterations: self.max_iterations,
        })
    }
}
