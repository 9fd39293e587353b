//! Error types for web handlers.
//!
//! [`AppError`] bridges [`MarketplaceError`] and HTTP, implementing Axum's
//! `IntoResponse` so handlers can return `Result<_, AppError>` and use `?`
//! on service calls.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use marketplace_core::error::MarketplaceError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>, caller: Caller) -> Result<Json<User>, AppError> {
///     let user = state.marketplace.profiles.get_profile(caller.id()).await?;
///     Ok(Json(user))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status the error renders as.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST".to_string())
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED".to_string())
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN".to_string())
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND".to_string())
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), code.to_string())
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>, code: &str) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message.into(), code.to_string())
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                );
            }
        } else if self.status == StatusCode::CONFLICT {
            tracing::info!(code = %self.code, message = %self.message, "Request conflicted");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<MarketplaceError> for AppError {
    fn from(err: MarketplaceError) -> Self {
        let message = err.to_string();
        match &err {
            MarketplaceError::Validation(_) => Self::validation(message, "VALIDATION_ERROR"),
            MarketplaceError::InvalidAmount(_) => Self::validation(message, "INVALID_AMOUNT"),
            MarketplaceError::InsufficientBalance { .. } => {
                Self::validation(message, "INSUFFICIENT_BALANCE")
            }
            MarketplaceError::Conflict(_) => Self::conflict(message, "CONFLICT"),
            MarketplaceError::InvalidTransition { .. } => {
                Self::conflict(message, "INVALID_TRANSITION")
            }
            MarketplaceError::NotFound { .. } => Self::not_found(message),
            MarketplaceError::NotPermitted(_) => Self::forbidden(message),
            MarketplaceError::Persistence(_) => {
                Self::unavailable("The data store is unavailable, try again shortly")
                    .with_source(anyhow::Error::new(err))
            }
        }
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "An internal error occurred".to_string(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
        .with_source(err)
    }
}
