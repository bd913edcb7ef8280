//! Error types for the Moodfade engine
//!
//! One error hierarchy for the whole crate:
//! - `thiserror` for the variant definitions
//! - classification helpers that encode the failure taxonomy of the
//!   recommendation pipeline (transient, data-absent, user-facing)
//! - HTTP status code mapping for API responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Result type alias for Moodfade operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Moodfade engine
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration error: {message}")]
    Config {
        message: Cow<'static, str>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: &'static str },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfig {
        key: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    #[error("Database error: {message}")]
    Database {
        message: Cow<'static, str>,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Database connection pool exhausted")]
    PoolExhausted,

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error("Migration error: {0}")]
    Migration(String),

    // ========================================================================
    // Streaming Service Errors
    // ========================================================================
    #[error("Streaming service error{}: {message}", .status.map(|s| format!(" [{}]", s)).unwrap_or_default())]
    Streaming {
        status: Option<u16>,
        message: Cow<'static, str>,
    },

    #[error("Streaming token rejected: {message}")]
    Unauthorized { message: Cow<'static, str> },

    // ========================================================================
    // Domain Errors
    // ========================================================================
    #[error("Unknown mood label: {0}")]
    InvalidMood(String),

    #[error("Bad request: {message}")]
    BadRequest { message: Cow<'static, str> },

    #[error("Playlist build cancelled")]
    Cancelled,

    #[error("Could not save {what}: {message}")]
    SaveFailed {
        what: &'static str,
        message: Cow<'static, str>,
    },

    // ========================================================================
    // Serialization Errors
    // ========================================================================
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Internal server error")]
    Internal {
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    // ========================================================================
    // Constructors for common error patterns
    // ========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a database error
    pub fn database(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Create a streaming error without an HTTP status
    pub fn streaming(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Streaming {
            status: None,
            message: message.into(),
        }
    }

    /// Create a streaming error for a non-success HTTP response
    pub fn streaming_status(status: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Streaming {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Wrap a failed write that the user must be told about
    pub fn save_failed(what: &'static str, cause: &Error) -> Self {
        Self::SaveFailed {
            what,
            message: cause.to_string().into(),
        }
    }

    /// Create an internal error
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal {
            source: Some(Box::new(source)),
        }
    }

    // ========================================================================
    // Error Classification
    // ========================================================================

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::PoolExhausted | Error::Streaming { .. }
        )
    }

    /// Any external-call failure. The pipeline treats these as "no data from
    /// this source" and never propagates them.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Streaming { .. } | Error::Unauthorized { .. })
    }

    /// Only profile and session saves surface an alert to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Error::SaveFailed { .. })
    }

    /// Returns true if this error should be logged at error level
    pub fn is_error_level(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Internal { .. } | Error::Migration(_)
        )
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } | Error::InvalidMood(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Cancelled => StatusCode::CONFLICT,
            Error::Streaming { .. } => StatusCode::BAD_GATEWAY,
            Error::PoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } | Error::MissingEnvVar { .. } | Error::InvalidConfig { .. } => {
                "CONFIG_ERROR"
            }
            Error::Database { .. } | Error::PoolExhausted | Error::Migration(_) => {
                "DATABASE_ERROR"
            }
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Streaming { .. } => "STREAMING_ERROR",
            Error::Unauthorized { .. } => "UNAUTHORIZED",
            Error::InvalidMood(_) | Error::BadRequest { .. } => "BAD_REQUEST",
            Error::Cancelled => "CANCELLED",
            Error::SaveFailed { .. } => "SAVE_FAILED",
            Error::Json(_) => "SERIALIZATION_ERROR",
            Error::Internal { .. } | Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ============================================================================
// Error Response for API
// ============================================================================

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    /// Set when the client should show an alert rather than degrade silently
    pub alert: bool,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Save failures are shown to the user verbatim; other internals are not
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR && !self.is_user_facing() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code,
                message,
                alert: self.is_user_facing(),
            },
        };

        (status, Json(body)).into_response()
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Error::NotFound {
                entity_type: "record",
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            _ => Error::Database {
                message: err.to_string().into(),
                source: Some(err),
            },
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Streaming {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string().into(),
        }
    }
}

impl From<std::env::VarError> for Error {
    fn from(_err: std::env::VarError) -> Self {
        Error::Config {
            message: "Environment variable error".into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(Error::PoolExhausted.is_retryable());
        assert!(Error::streaming_status(503, "unavailable").is_retryable());
        assert!(!Error::not_found("profile", "u1").is_retryable());
    }

    #[test]
    fn test_only_saves_are_user_facing() {
        let cause = Error::database("connection reset");
        assert!(Error::save_failed("session", &cause).is_user_facing());
        assert!(!cause.is_user_facing());
        assert!(!Error::streaming("timeout").is_user_facing());
        assert!(Error::streaming("timeout").is_transient());
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            Error::not_found("profile", "123").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::InvalidMood("Sleepy".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Internal { source: None }.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::streaming("x").status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_streaming_display_includes_status() {
        let err = Error::streaming_status(429, "rate limited");
        assert_eq!(err.to_string(), "Streaming service error [429]: rate limited");
        assert_eq!(
            Error::streaming("no route").to_string(),
            "Streaming service error: no route"
        );
    }
}
