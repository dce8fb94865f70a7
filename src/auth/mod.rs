//! Shared-secret authentication for the protected routes.
//!
//! Implements constant-time comparison to mitigate timing attacks.

use std::sync::Arc;

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "api_token";

/// Authentication layer function that takes the expected key as a parameter.
///
/// Requests without the header, or with a different value, are answered with
/// 401 before the inner handler runs.
pub async fn api_key_layer(expected: Arc<str>, request: Request, next: Next) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|key| constant_time_compare(key, &expected));

    match provided {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::warn!(path = %request.uri().path(), "rejected request with wrong API key");
            unauthorized_response()
        }
        None => {
            tracing::warn!(path = %request.uri().path(), "rejected request without API key");
            unauthorized_response()
        }
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response() -> Response {
    AppError::Unauthorized("invalid API key".to_string()).into_response()
}
