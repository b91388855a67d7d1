//! Error types for MovieMate
//!
//! Provides a single error taxonomy with:
//! - Distinct error types for configuration, retrieval, synthesis and agent failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    InvalidFormat,

    // Resource errors (4xxx)
    NotFound,
    SessionNotFound,

    // Conflict errors (5xxx)
    SessionBusy,
    SessionLimitReached,

    // Upstream errors (8xxx)
    RetrievalError,
    SynthesisError,
    AgentLoopExceeded,
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::InvalidFormat => 1003,

            ErrorCode::NotFound => 4001,
            ErrorCode::SessionNotFound => 4005,

            ErrorCode::SessionBusy => 5004,
            ErrorCode::SessionLimitReached => 5005,

            ErrorCode::RetrievalError => 8002,
            ErrorCode::SynthesisError => 8006,
            ErrorCode::AgentLoopExceeded => 8007,
            ErrorCode::UpstreamError => 8001,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session {id} is already answering a message")]
    SessionBusy { id: String },

    #[error("Session limit of {limit} reached")]
    SessionLimitReached { limit: usize },

    // Missing collaborator, bad strategy tag, bad k, ...
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Embedding provider or vector index failure
    #[error("Retrieval failed: {message}")]
    Retrieval { message: String },

    // LLM failure during condensation, summarization or agent reasoning
    #[error("Synthesis failed: {message}")]
    Synthesis { message: String },

    #[error("Agent did not reach a final answer within {max_iterations} iterations")]
    AgentLoopExceeded { max_iterations: usize },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration { message: message.into() }
    }

    /// Shorthand for a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        AppError::Retrieval { message: message.into() }
    }

    /// Shorthand for a synthesis error
    pub fn synthesis(message: impl Into<String>) -> Self {
        AppError::Synthesis { message: message.into() }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::SessionBusy { .. } => ErrorCode::SessionBusy,
            AppError::SessionLimitReached { .. } => ErrorCode::SessionLimitReached,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Retrieval { .. } => ErrorCode::RetrievalError,
            AppError::Synthesis { .. } => ErrorCode::SynthesisError,
            AppError::AgentLoopExceeded { .. } => ErrorCode::AgentLoopExceeded,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } |
            AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. } |
            AppError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::SessionBusy { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::SessionLimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Configuration { .. } |
            AppError::Internal { .. } |
            AppError::Serialization(_) |
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Retrieval { .. } |
            AppError::Synthesis { .. } |
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::AgentLoopExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            AppError::AgentLoopExceeded { max_iterations } => {
                Some(serde_json::json!({ "max_iterations": max_iterations }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails { code, message, details },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string()
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string()
        }
    }
}
