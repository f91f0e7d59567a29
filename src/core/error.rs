//! # Error Handling
//!
//! Every failure the gateway can surface to a client is a [`GatewayError`].
//! Each variant knows its HTTP status code, and [`GatewayError::to_response`]
//! renders the JSON error body the cache API has always returned:
//!
//! ```json
//! {"error":"Bad Request","status":400,"path":"/cache","message":"UUID duplication.","timestamp":"..."}
//! ```
//!
//! Unauthorized errors without a message render an empty body.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::caching::StorageError;
use crate::core::circuit_breaker::CircuitBreakerError;

/// Main result type used throughout the gateway
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to cache and module-storage clients
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or forbidden input (bad UUID, missing field, bad body)
    #[error("{message}")]
    Validation { message: String },

    /// A create-only write hit an existing key
    #[error("UUID duplication.")]
    Duplicate { key: String },

    /// Missing or wrong API key. `None` renders an empty body.
    #[error("{}", message.as_deref().unwrap_or("Unauthorized"))]
    Unauthorized { message: Option<String> },

    /// Unknown UUID, unknown application or unknown (application, key)
    #[error("{message}")]
    NotFound { message: String },

    /// The stored media type cannot be served
    #[error("{message}")]
    UnsupportedMediaType { message: String },

    /// Backend, proxy or peer failure; the native error text is kept verbatim
    #[error("{message}")]
    Upstream { message: String },

    /// The request deadline elapsed
    #[error(
        "Did not observe any item or terminal signal within {timeout_ms}ms in 'circuitBreaker' (and no fallback has been configured)"
    )]
    Timeout { timeout_ms: u64 },

    /// Configuration problems, detected at startup
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal failure
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Unauthorized with an empty response body
    pub fn unauthorized() -> Self {
        Self::Unauthorized { message: None }
    }

    /// Unauthorized with a descriptive message in the body
    pub fn unauthorized_with<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized {
            message: Some(message.into()),
        }
    }

    pub fn unsupported_media_type() -> Self {
        Self::UnsupportedMediaType {
            message: "Unsupported Media Type.".to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Duplicate { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Upstream { .. }
            | Self::Timeout { .. }
            | Self::Configuration { .. }
            | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error should count against a circuit breaker
    pub fn should_trigger_circuit_breaker(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. })
    }

    /// Render the error for a request made against `path`
    pub fn to_response(&self, path: &str) -> Response {
        let status = self.status_code();

        if let Self::Unauthorized { message: None } = self {
            return Response::builder()
                .status(status)
                .body(Body::empty())
                .unwrap_or_else(|_| status.into_response());
        }

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
            status: status.as_u16(),
            path: path.to_string(),
            message: self.to_string(),
            timestamp: Utc::now(),
        };

        let mut response = (status, Json(body)).into_response();
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
        response
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
    pub path: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { key } => Self::Duplicate { key },
            StorageError::Timeout { timeout_ms } => Self::Timeout { timeout_ms },
            other => Self::Upstream {
                message: other.to_string(),
            },
        }
    }
}

impl From<CircuitBreakerError> for GatewayError {
    fn from(err: CircuitBreakerError) -> Self {
        Self::Upstream {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}
