//! LLM completion abstraction
//!
//! Provides:
//! - Full completion (`complete`)
//! - Incremental completion as a lazy text stream (`stream`)
//! - An OpenAI-compatible chat completions client

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Finite, single-consumption sequence of text increments
pub type TextStream = BoxStream<'static, Result<String>>;

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the full completion for a prompt
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Generate the completion as a stream of increments
    async fn stream(&self, prompt: &str) -> Result<TextStream>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Turn a finished string into a one-item stream
pub fn once_stream(text: String) -> TextStream {
    futures::stream::once(async move { Ok(text) }).boxed()
}

/// Drain a text stream into one string
pub async fn collect_stream(mut stream: TextStream) -> Result<String> {
    let mut text = String::new();
    while let Some(delta) = stream.next().await {
        text.push_str(&delta?);
    }
    Ok(text)
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Deserialize)]
struct ChatStreamDelta {
    content: Option<String>,
}

/// One parsed server-sent event line
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: ChatStreamChunk = serde_json::from_str(data)
        .map_err(|e| AppError::synthesis(format!("Malformed stream event: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map(SseEvent::Delta)
        .unwrap_or(SseEvent::Skip))
}

/// Incremental SSE decoder over the raw response body
struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    done: bool,
}

impl SseState {
    /// Move every complete line out of the buffer
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&String::from_utf8_lossy(&line));
            if self.done {
                return;
            }
        }
    }

    fn push_line(&mut self, line: &str) {
        match parse_sse_line(line) {
            Ok(SseEvent::Delta(text)) => self.pending.push_back(Ok(text)),
            Ok(SseEvent::Done) => self.done = true,
            Ok(SseEvent::Skip) => {}
            Err(e) => {
                self.pending.push_back(Err(e));
                self.done = true;
            }
        }
    }

    fn into_stream(self) -> TextStream {
        futures::stream::unfold(self, |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.done {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.extend_from_slice(&bytes);
                        state.drain_lines();
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(AppError::synthesis(format!("LLM stream interrupted: {}", e))),
                            state,
                        ));
                    }
                    None => {
                        let rest = std::mem::take(&mut state.buffer);
                        state.push_line(&String::from_utf8_lossy(&rest));
                        state.done = true;
                    }
                }
            }
        })
        .boxed()
    }
}

/// OpenAI-compatible chat completions client
pub struct OpenAIChatModel {
    config: LlmConfig,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    /// Create a new chat model client
    pub fn new(config: LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::config("OpenAI LLM provider requires llm.api_key"))?;

        // Streamed answers may outlive timeout_secs; only stalls between reads fail them
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, api_key, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    /// Build the completions request. Non-streaming calls carry a total deadline.
    fn request(&self, prompt: &str, stream: bool) -> Result<reqwest::Request> {
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.config.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        };

        let mut builder = self.client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if !stream {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_secs));
        }

        builder
            .build()
            .map_err(|e| AppError::synthesis(format!("Failed to build LLM request: {}", e)))
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let request = self.request(prompt, stream)?;
        let response = self.client
            .execute(request)
            .await
            .map_err(|e| AppError::synthesis(format!("LLM API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::synthesis(format!("LLM API error {}: {}", status, body)));
        }

        Ok(response)
    }

    async fn complete_inner(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;

        let chat_response: ChatResponse = response.json().await
            .map_err(|e| AppError::synthesis(format!("Failed to parse LLM response: {}", e)))?;

        chat_response.choices.into_iter().next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or_else(|| AppError::synthesis("Empty response from LLM"))
    }
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let result = self.complete_inner(prompt).await;
        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            &self.config.model,
            "complete",
            result.is_ok(),
        );
        result
    }

    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let start = Instant::now();
        let response = self.send(prompt, true).await;
        metrics::record_llm_call(
            start.elapsed().as_secs_f64(),
            &self.config.model,
            "stream",
            response.is_ok(),
        );

        let body = response?
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();

        Ok(SseState {
            body,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        }
        .into_stream())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Create a language model based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config.clone())?)),
        other => Err(AppError::config(format!("Unknown LLM provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Neo"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseEvent::Delta("Neo".to_string()));
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Skip);
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseEvent::Skip
        );
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[tokio::test]
    async fn test_sse_state_splits_across_chunks() {
        let parts: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_vec()),
            Ok(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n".to_vec()),
            Ok(b"data: [DONE]\n".to_vec()),
        ];
        let state = SseState {
            body: futures::stream::iter(parts).boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
        };

        let text = collect_stream(state.into_stream()).await.unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_once_stream_roundtrip() {
        let text = collect_stream(once_stream("final".to_string())).await.unwrap();
        assert_eq!(text, "final");
    }

    #[test]
    fn test_only_complete_has_total_deadline() {
        let model = OpenAIChatModel::new(LlmConfig {
            api_key: Some("sk-test".to_string()),
            timeout_secs: 7,
            ..LlmConfig::default()
        })
        .unwrap();

        let request = model.request("Who directed Heat?", false).unwrap();
        assert_eq!(request.timeout(), Some(&Duration::from_secs(7)));

        let request = model.request("Who directed Heat?", true).unwrap();
        assert!(request.timeout().is_none());
    }

    #[test]
    fn test_unknown_llm_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_language_model(&config).is_err());
    }
}
