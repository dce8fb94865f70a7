//! Error handling module for the TDR backend.
//!
//! Provides the HTTP-facing error type and its mapping to status codes and
//! response bodies. Lower layers use their own `thiserror` enums which are
//! converted (and logged) here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogError;
use crate::gitlab::UpstreamError;

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Authentication failed
    Unauthorized(String),
    /// Request failed validation
    Validation(String),
    /// Request could not be served (unknown group, malformed id, ...)
    BadRequest(String),
    /// Upstream GitLab call failed
    Upstream(String),
}

impl AppError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::BadRequest(msg) => msg.clone(),
            AppError::Upstream(msg) => msg.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        tracing::error!(error = %err, "Upstream error");
        AppError::Upstream(err.to_string())
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::GroupNotFound(group) => {
                tracing::warn!(%group, "Unknown logical group requested");
                AppError::BadRequest(format!("Project not found: {}", group))
            }
            CatalogError::Upstream(e) => e.into(),
        }
    }
}

/// Error details in the response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
}

/// Error response envelope: `{"error": {"message": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Body returned for failed authentication: `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UnauthorizedResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::debug!(error = %self, "Request rejected");

        match self {
            AppError::Unauthorized(message) => {
                (status, Json(UnauthorizedResponse { error: message })).into_response()
            }
            other => {
                let body = ErrorResponse {
                    error: ErrorDetails {
                        message: other.message(),
                    },
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
