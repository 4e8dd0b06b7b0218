use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Maximum length of any engine or provider message persisted or echoed back.
pub const MAX_MESSAGE_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("Provider mismatch: expected {expected}, got {actual}")]
    ProviderMismatch { expected: String, actual: String },

    #[error("Token exchange failed: {status} - {body}")]
    TokenExchange { status: u16, body: String },

    #[error("No refresh token available for {0}")]
    NoRefreshToken(String),

    #[error("Engine request failed: {method} {endpoint} ({}) - {body}", .status.map(|s| s.to_string()).unwrap_or_else(|| "no response".to_string()))]
    EngineRequest {
        method: String,
        endpoint: String,
        status: Option<u16>,
        body: String,
    },

    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),

    #[error("Integration {0} has no remote workflow")]
    NoRemoteWorkflow(String),

    #[error("Not permitted: {0}")]
    Permission(String),

    #[error("No integration is tracking workflow {0}")]
    UnknownWorkflow(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Redis pool error: {0}")]
    RedisPool(String),
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Redis error".to_string())
            }
            AppError::Configuration(ref e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::InvalidState | AppError::ProviderMismatch { .. } => {
                tracing::warn!("Rejected OAuth callback: {}", self);
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::TokenExchange { status, body } => (
                StatusCode::BAD_GATEWAY,
                format!(
                    "Provider rejected the token request ({}): {}",
                    status,
                    truncate_message(body, MAX_MESSAGE_LEN)
                ),
            ),
            AppError::NoRefreshToken(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::EngineRequest { .. } | AppError::EngineProtocol(_) => {
                tracing::error!("Workflow engine error: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    truncate_message(&self.to_string(), MAX_MESSAGE_LEN),
                )
            }
            AppError::NoRemoteWorkflow(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Permission(ref e) => (StatusCode::FORBIDDEN, e.clone()),
            // Soft failure: the engine must not retry-storm on unknown workflows.
            AppError::UnknownWorkflow(_) => {
                let body = json!({ "success": false, "error": "Integration not found" });
                return (StatusCode::OK, Json(body)).into_response();
            }
            AppError::Validation(ref e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::NotFound(ref e) => (StatusCode::NOT_FOUND, e.clone()),
            AppError::Unauthorized(ref e) => (StatusCode::UNAUTHORIZED, e.clone()),
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
            AppError::Http(ref e) => {
                tracing::error!("HTTP error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "HTTP request failed".to_string())
            }
            AppError::Jwt(ref e) => {
                tracing::debug!("JWT error: {:?}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            }
            AppError::RedisPool(ref e) => {
                tracing::error!("Redis pool error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Redis pool error".to_string(),
                )
            }
        };

        let body = json!({
            "detail": error_message
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<deadpool_redis::PoolError> for AppError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        AppError::RedisPool(err.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<libsql::Error> for AppError {
    fn from(err: libsql::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// Cut `message` to at most `max` characters without splitting a code point.
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
