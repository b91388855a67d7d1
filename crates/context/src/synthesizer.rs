//! Tree-summarize response synthesis
//!
//! Retrieved chunks are packed into batches that fit the context budget,
//! each batch is summarized against the query, and the partial answers are
//! combined the same way until one answer remains. Only the last call
//! streams.

use crate::prompts::{
    estimate_tokens, truncate_to_tokens, PromptTemplate, EMPTY_RESPONSE, NO_CONTEXT_TEMPLATE,
    TREE_SUMMARIZE_TEMPLATE,
};
use crate::response::{non_empty_stream, Response};
use futures::future::try_join_all;
use moviemate_common::config::SynthesisConfig;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::metrics;
use moviemate_common::types::ScoredChunk;
use moviemate_common::LanguageModel;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Separator between texts inside one batch
const TEXT_SEPARATOR: &str = "\n\n";

/// Hierarchical answer synthesizer
pub struct TreeSummarizer {
    llm: Arc<dyn LanguageModel>,
    summary_template: PromptTemplate,
    no_context_template: PromptTemplate,
    context_window: usize,
    num_output: usize,
    streaming: bool,
}

impl TreeSummarizer {
    pub fn new(llm: Arc<dyn LanguageModel>, config: &SynthesisConfig) -> Self {
        Self {
            llm,
            summary_template: PromptTemplate::new(TREE_SUMMARIZE_TEMPLATE),
            no_context_template: PromptTemplate::new(NO_CONTEXT_TEMPLATE),
            context_window: config.context_window,
            num_output: config.num_output,
            streaming: config.streaming,
        }
    }

    pub fn with_summary_template(mut self, template: PromptTemplate) -> Self {
        self.summary_template = template;
        self
    }

    pub fn with_no_context_template(mut self, template: PromptTemplate) -> Self {
        self.no_context_template = template;
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn streaming(&self) -> bool {
        self.streaming
    }

    /// Tokens available for context text in one call
    fn context_budget(&self, query: &str) -> Result<usize> {
        let template = self
            .summary_template
            .format(&[("context_str", ""), ("query_str", query)]);
        let budget = self
            .context_window
            .saturating_sub(self.num_output)
            .saturating_sub(estimate_tokens(&template));

        if budget == 0 {
            return Err(AppError::synthesis(format!(
                "Query and prompt do not fit a {} token context window",
                self.context_window
            )));
        }
        Ok(budget)
    }

    fn summary_prompt(&self, query: &str, batch: &[String]) -> String {
        self.summary_template.format(&[
            ("context_str", &batch.join(TEXT_SEPARATOR)),
            ("query_str", query),
        ])
    }

    /// Answer `query` from `chunks`, keeping their order
    #[instrument(skip(self, chunks), fields(chunks = chunks.len(), streaming = self.streaming))]
    pub async fn synthesize(&self, query: &str, chunks: Vec<ScoredChunk>) -> Result<Response> {
        if chunks.is_empty() {
            debug!("No retrieved context, answering from the query alone");
            let prompt = self.no_context_template.format(&[("query_str", query)]);
            return self.finish(prompt, chunks).await;
        }

        let budget = self.context_budget(query)?;
        // Same metadata header + plot layout the chunks were embedded with
        let mut texts: Vec<String> = chunks
            .iter()
            .map(|c| truncate_to_tokens(&c.chunk.embedding_text(), budget))
            .collect();

        let mut round = 0;
        loop {
            let batches = pack_batches(texts, budget);
            if batches.len() == 1 {
                let prompt = self.summary_prompt(query, &batches[0]);
                return self.finish(prompt, chunks).await;
            }

            round += 1;
            debug!(round, batches = batches.len(), budget, "Summarizing batch round");
            metrics::record_synthesis_round(batches.len());

            let prompts: Vec<String> = batches
                .iter()
                .map(|batch| self.summary_prompt(query, batch))
                .collect();
            let answers = try_join_all(prompts.iter().map(|p| self.llm.complete(p))).await?;

            texts = answers
                .iter()
                .map(|a| truncate_to_tokens(a.trim(), budget / 2))
                .collect();
        }
    }

    /// Final LLM call, streamed when enabled
    async fn finish(&self, prompt: String, sources: Vec<ScoredChunk>) -> Result<Response> {
        if self.streaming {
            let stream = self.llm.stream(&prompt).await?;
            return Ok(Response::stream(non_empty_stream(stream), sources));
        }

        let answer = self.llm.complete(&prompt).await?;
        let answer = if answer.trim().is_empty() {
            EMPTY_RESPONSE.to_string()
        } else {
            answer
        };
        Ok(Response::text(answer, sources))
    }
}

/// Greedily pack texts into order-preserving batches whose estimated size
/// stays within `budget`. A text larger than the budget gets its own batch.
fn pack_batches(texts: Vec<String>, budget: usize) -> Vec<Vec<String>> {
    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut used = 0;

    for text in texts {
        let tokens = estimate_tokens(&text);
        if !current.is_empty() && used + tokens > budget {
            batches.push(std::mem::take(&mut current));
            used = 0;
        }
        used += tokens;
        current.push(text);
    }

    if !current.is_empty() || batches.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use moviemate_common::llm::collect_stream;
    use moviemate_common::types::Chunk;
    use moviemate_common::TextStream;
    use std::sync::Mutex;

    /// Records prompts and answers each call with a fixed string
    struct EchoModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
        streamed: Mutex<usize>,
    }

    impl EchoModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
                streamed: Mutex::new(0),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }

        async fn stream(&self, prompt: &str) -> Result<TextStream> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            *self.streamed.lock().unwrap() += 1;
            let words: Vec<Result<String>> = self
                .reply
                .split_inclusive(' ')
                .map(|w| Ok(w.to_string()))
                .collect();
            Ok(futures::stream::iter(words).boxed())
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn chunks(n: usize, chars: usize) -> Vec<ScoredChunk> {
        (0..n)
            .map(|i| ScoredChunk {
                chunk: Chunk::new(format!("c{}", i), format!("{}{}", i, "x".repeat(chars))),
                score: 1.0 - i as f32 * 0.01,
            })
            .collect()
    }

    fn config(context_window: usize, num_output: usize) -> SynthesisConfig {
        SynthesisConfig {
            context_window,
            num_output,
            streaming: false,
        }
    }

    #[test]
    fn test_pack_batches_preserves_order() {
        let texts: Vec<String> = ["aaaa", "bbbb", "cccc", "dddd", "eeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let batches = pack_batches(texts, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec!["aaaa", "bbbb"]);
        assert_eq!(batches[2], vec!["eeee"]);
    }

    #[tokio::test]
    async fn test_empty_chunks_still_answer() {
        let llm = EchoModel::new("I could not find that movie.");
        let synthesizer = TreeSummarizer::new(llm.clone(), &SynthesisConfig::default());

        let response = synthesizer.synthesize("Who directed Heat?", Vec::new()).await.unwrap();
        assert_eq!(response.into_text().await.unwrap(), "I could not find that movie.");
        assert!(llm.prompts()[0].contains("No movie information"));
    }

    #[tokio::test]
    async fn test_empty_model_output_is_replaced() {
        let llm = EchoModel::new("   ");
        let synthesizer = TreeSummarizer::new(llm, &SynthesisConfig::default());

        let text = synthesizer
            .synthesize("anything", chunks(1, 10))
            .await
            .unwrap()
            .into_text()
            .await
            .unwrap();
        assert_eq!(text, EMPTY_RESPONSE);
    }

    #[tokio::test]
    async fn test_small_input_uses_single_call() {
        let llm = EchoModel::new("answer");
        let synthesizer = TreeSummarizer::new(llm.clone(), &SynthesisConfig::default());

        synthesizer.synthesize("q", chunks(3, 20)).await.unwrap();
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        let first = prompts[0].find("0xx").unwrap();
        let last = prompts[0].find("2xx").unwrap();
        assert!(first < last);
    }

    #[tokio::test]
    async fn test_tree_rounds_converge() {
        let llm = EchoModel::new("partial answer");
        // Template + query take 54 tokens, leaving 46 for context
        let synthesizer = TreeSummarizer::new(llm.clone(), &config(200, 100));

        let response = synthesizer.synthesize("q", chunks(8, 60)).await.unwrap();
        assert_eq!(response.source_chunks.len(), 8);
        assert_eq!(response.into_text().await.unwrap(), "partial answer");

        let prompts = llm.prompts();
        // Eight leaves of ~16 tokens pack two per batch: four leaf calls, then one final call
        assert_eq!(prompts.len(), 5);
        assert!(prompts[4].contains("partial answer"));
        assert!(!prompts[4].contains("xxxx"));
    }

    #[tokio::test]
    async fn test_only_final_call_streams() {
        let llm = EchoModel::new("streamed final answer");
        let synthesizer =
            TreeSummarizer::new(llm.clone(), &config(200, 100)).with_streaming(true);

        let response = synthesizer.synthesize("q", chunks(8, 60)).await.unwrap();
        assert!(response.is_streaming());

        let (_, stream) = response.into_parts();
        assert_eq!(collect_stream(stream).await.unwrap(), "streamed final answer");
        assert_eq!(*llm.streamed.lock().unwrap(), 1);
        assert_eq!(llm.prompts().len(), 5);
    }

    #[tokio::test]
    async fn test_context_window_too_small() {
        let llm = EchoModel::new("x");
        let synthesizer = TreeSummarizer::new(llm, &config(60, 50));
        let err = synthesizer.synthesize("q", chunks(2, 5)).await.unwrap_err();
        assert_eq!(err.code(), moviemate_common::errors::ErrorCode::SynthesisError);
    }
}
