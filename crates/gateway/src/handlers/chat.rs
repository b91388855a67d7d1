//! Chat message handlers: one JSON answer, or an SSE stream of increments

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::{mpsc, OwnedMutexGuard};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use moviemate_common::{
    errors::{AppError, ErrorDetails, Result},
    types::{Metadata, ScoredChunk},
};
use moviemate_context::ChatEngine;

const EVENT_BUFFER: usize = 32;

/// Submit message request
#[derive(Debug, Deserialize, Validate)]
pub struct MessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,

    /// Overrides the session's streaming setting for this message
    pub stream: Option<bool>,
}

/// A chunk the answer was synthesized from
#[derive(Debug, Serialize)]
pub struct SourceView {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: Metadata,
}

impl From<&ScoredChunk> for SourceView {
    fn from(scored: &ScoredChunk) -> Self {
        Self {
            id: scored.chunk.id.clone(),
            score: scored.score,
            text: scored.chunk.text.clone(),
            metadata: scored.chunk.metadata.clone(),
        }
    }
}

/// Complete answer response
#[derive(Serialize)]
pub struct MessageResponse {
    pub session_id: Uuid,
    pub answer: String,
    pub sources: Vec<SourceView>,
    pub turns: usize,
}

#[derive(Serialize)]
struct DoneEvent {
    committed: bool,
    turns: usize,
}

/// Answer a message within a session
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Response> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation {
            message: "Message is empty".to_string(),
            field: Some("message".to_string()),
        });
    }

    let session = state.sessions.get(session_id).await?;
    let mut engine = session.acquire()?;

    if request.stream.unwrap_or(session.settings.streaming) {
        return Ok(stream_answer(session_id, engine, message.to_string()).into_response());
    }

    let timeout = state.config.request_timeout();
    let response = tokio::time::timeout(timeout, engine.respond(message))
        .await
        .map_err(|_| {
            AppError::synthesis(format!("Chat turn timed out after {}s", timeout.as_secs()))
        })??;

    let answer = response.as_text().unwrap_or_default().to_string();
    let sources = response.source_chunks.iter().map(SourceView::from).collect();

    tracing::info!(
        session_id = %session_id,
        turns = engine.history().len(),
        "Message answered"
    );

    Ok(Json(MessageResponse {
        session_id,
        answer,
        sources,
        turns: engine.history().len(),
    })
    .into_response())
}

/// Stream a turn as SSE events: `sources`, then `delta`s, then `done`, or a
/// single `error`. The engine lock travels with the producer task, so the
/// session stays busy until the turn commits or the client goes away.
fn stream_answer(
    session_id: Uuid,
    mut engine: OwnedMutexGuard<ChatEngine>,
    message: String,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(EVENT_BUFFER);

    tokio::spawn(async move {
        let mut stream = match engine.respond_stream(&message).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx.send(error_event(&e)).await;
                return;
            }
        };

        let sources: Vec<SourceView> = stream.source_chunks().iter().map(SourceView::from).collect();
        if tx.send(json_event("sources", &sources)).await.is_err() {
            return;
        }

        while let Some(delta) = stream.next().await {
            let event = match delta {
                Ok(text) => Event::default().event("delta").data(text),
                Err(e) => {
                    let _ = tx.send(error_event(&e)).await;
                    return;
                }
            };
            if tx.send(event).await.is_err() {
                tracing::debug!(session_id = %session_id, "Client left mid-stream, turn discarded");
                return;
            }
        }

        let committed = stream.is_committed();
        drop(stream);

        let done = DoneEvent {
            committed,
            turns: engine.history().len(),
        };
        drop(engine);
        let _ = tx.send(json_event("done", &done)).await;
    });

    let events = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn json_event<T: Serialize>(name: &str, value: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(value)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

fn error_event(error: &AppError) -> Event {
    tracing::warn!(error = %error, code = ?error.code(), "Streaming turn failed");
    json_event(
        "error",
        &ErrorDetails {
            code: error.code(),
            message: error.to_string(),
            details: None,
        },
    )
}
