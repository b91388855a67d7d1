//! Condense-question strategy
//!
//! Rewrites a follow-up message into a standalone question using the history.

use crate::prompts::{PromptTemplate, CONDENSE_QUESTION_TEMPLATE};
use moviemate_common::errors::{AppError, Result};
use moviemate_common::types::ConversationHistory;
use moviemate_common::LanguageModel;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct QuestionCondenser {
    llm: Arc<dyn LanguageModel>,
    template: PromptTemplate,
}

impl QuestionCondenser {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            template: PromptTemplate::new(CONDENSE_QUESTION_TEMPLATE),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Standalone question for `message`. An empty history passes it through.
    #[instrument(skip(self, history, message), fields(history_turns = history.len()))]
    pub async fn condense(&self, history: &ConversationHistory, message: &str) -> Result<String> {
        if history.is_empty() {
            return Ok(message.to_string());
        }

        let prompt = self.template.format(&[
            ("chat_history", &history.render()),
            ("question", message),
        ]);

        let question = self.llm.complete(&prompt).await.map_err(|e| match e {
            AppError::Synthesis { .. } => e,
            other => AppError::synthesis(format!("Question condensation failed: {}", other)),
        })?;

        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::synthesis("Question condensation returned an empty question"));
        }

        debug!(standalone = question, "Condensed follow-up question");
        Ok(question.to_string())
    }
}
