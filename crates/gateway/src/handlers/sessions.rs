//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::state::{Session, SessionSettings};
use crate::AppState;
use moviemate_common::{
    errors::{AppError, Result},
    types::{ChatMode, ConversationTurn, MetadataFilters},
};

/// Create session request. Omitted fields fall back to configuration.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateSessionRequest {
    /// condense_question | agentic_tool_use
    pub mode: Option<String>,

    #[validate(range(min = 1, max = 100))]
    pub top_k: Option<usize>,

    pub filters: Option<MetadataFilters>,

    pub streaming: Option<bool>,

    #[validate(range(min = 1, max = 50))]
    pub max_iterations: Option<usize>,
}

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub settings: SessionSettings,
    pub history: Vec<ConversationTurn>,
    pub created_at: String,
}

impl SessionResponse {
    fn new(session: &Session, history: Vec<ConversationTurn>) -> Self {
        Self {
            session_id: session.id,
            settings: session.settings.clone(),
            history,
            created_at: session.created_at.to_rfc3339(),
        }
    }
}

/// Create a new chat session
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let mut settings = state.default_settings()?;
    if let Some(mode) = &request.mode {
        settings.mode = mode.parse::<ChatMode>().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: Some("mode".to_string()),
        })?;
    }
    if let Some(top_k) = request.top_k {
        settings.top_k = top_k;
    }
    if let Some(filters) = request.filters {
        settings.filters = filters;
    }
    if let Some(streaming) = request.streaming {
        settings.streaming = streaming;
    }
    if let Some(max_iterations) = request.max_iterations {
        settings.max_iterations = max_iterations;
    }

    let engine = state.build_engine(&settings)?;
    let session = state.sessions.insert(settings, engine).await?;

    tracing::info!(
        session_id = %session.id,
        mode = %session.settings.mode,
        top_k = session.settings.top_k,
        "Session created"
    );

    Ok((StatusCode::CREATED, Json(SessionResponse::new(&session, Vec::new()))))
}

/// Get session settings and history
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.get(session_id).await?;
    let engine = session.acquire()?;
    let history = engine.history().turns().to_vec();

    Ok(Json(SessionResponse::new(&session, history)))
}

/// Clear the conversation but keep the session
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = state.sessions.get(session_id).await?;
    session.acquire()?.reset();

    tracing::debug!(session_id = %session_id, "Session history cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// Close a session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(session_id).await?;

    tracing::info!(session_id = %session_id, "Session closed");
    Ok(StatusCode::NO_CONTENT)
}
