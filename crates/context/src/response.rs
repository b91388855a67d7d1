//! Answer returned by the query engine and chat engines

use futures::StreamExt;
use moviemate_common::errors::Result;
use moviemate_common::llm::{collect_stream, once_stream};
use moviemate_common::types::ScoredChunk;
use moviemate_common::TextStream;
use std::fmt;

/// Final text, or a single-consumption stream of increments
pub enum ResponseBody {
    Text(String),
    Stream(TextStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Synthesized answer plus the chunks it was built from
#[derive(Debug)]
pub struct Response {
    pub source_chunks: Vec<ScoredChunk>,
    pub body: ResponseBody,
}

impl Response {
    pub fn text(text: impl Into<String>, source_chunks: Vec<ScoredChunk>) -> Self {
        Self {
            source_chunks,
            body: ResponseBody::Text(text.into()),
        }
    }

    pub fn stream(stream: TextStream, source_chunks: Vec<ScoredChunk>) -> Self {
        Self {
            source_chunks,
            body: ResponseBody::Stream(stream),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ResponseBody::Stream(_))
    }

    /// The answer text, if it is already complete
    pub fn as_text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            ResponseBody::Stream(_) => None,
        }
    }

    /// Drain a streaming body so the response holds the full text
    pub async fn collect(self) -> Result<Response> {
        let text = match self.body {
            ResponseBody::Text(text) => text,
            ResponseBody::Stream(stream) => collect_stream(stream).await?,
        };
        Ok(Response::text(text, self.source_chunks))
    }

    pub async fn into_text(self) -> Result<String> {
        match self.body {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Stream(stream) => collect_stream(stream).await,
        }
    }

    /// Split into sources and a text stream; complete text becomes a single increment
    pub fn into_parts(self) -> (Vec<ScoredChunk>, TextStream) {
        let stream = match self.body {
            ResponseBody::Text(text) => once_stream(text),
            ResponseBody::Stream(stream) => stream,
        };
        (self.source_chunks, stream)
    }
}

/// Replace a stream that yields no text with a single `Empty Response` increment
pub(crate) fn non_empty_stream(stream: TextStream) -> TextStream {
    futures::stream::unfold(
        (stream, false, false),
        |(mut inner, seen_text, finished)| async move {
            if finished {
                return None;
            }
            match inner.next().await {
                Some(Ok(delta)) => {
                    let seen_text = seen_text || !delta.trim().is_empty();
                    Some((Ok(delta), (inner, seen_text, false)))
                }
                Some(Err(e)) => Some((Err(e), (inner, seen_text, true))),
                None if !seen_text => Some((
                    Ok(crate::prompts::EMPTY_RESPONSE.to_string()),
                    (inner, true, true),
                )),
                None => None,
            }
        },
    )
    .boxed()
}
