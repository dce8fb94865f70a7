//! Unauthenticated liveness and build information endpoints.

use axum::{
    extract::{OriginalUri, State},
    http::{HeaderMap, Method},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{success, ApiResult};
use crate::version;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastUpdatedResponse {
    pub last_updated: Option<DateTime<Utc>>,
}

/// Build metadata plus an echo of the request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionResponse {
    #[serde(rename = "URL")]
    pub url: String,
    pub method: String,
    pub headers: Vec<String>,
    pub version: &'static str,
    pub build_time: &'static str,
    pub snapshot_tag: String,
}

/// GET /ping
pub async fn ping() -> ApiResult<PingResponse> {
    success(PingResponse { message: "pong" })
}

/// GET /lastUpdated - When the catalog snapshot was last published.
pub async fn last_updated(State(state): State<AppState>) -> ApiResult<LastUpdatedResponse> {
    success(LastUpdatedResponse {
        last_updated: state.catalog.last_updated().await,
    })
}

/// GET /version - Request headers are only echoed in debug mode.
pub async fn version(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> ApiResult<VersionResponse> {
    let headers = if state.config.debug {
        describe_headers(&headers)
    } else {
        Vec::new()
    };

    success(VersionResponse {
        url: uri.to_string(),
        method: method.to_string(),
        headers,
        version: version::git_sha(),
        build_time: version::build_time(),
        snapshot_tag: version::snapshot_tag(),
    })
}

/// Render headers as `name: value` lines, grouping repeated names.
fn describe_headers(headers: &HeaderMap) -> Vec<String> {
    let mut lines = Vec::new();
    for name in headers.keys() {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .map(|v| v.to_str().unwrap_or("<binary>"))
            .collect();

        match values.as_slice() {
            [] => lines.push(name.to_string()),
            [single] => lines.push(format!("{}: {}", name, single)),
            many => {
                lines.push(format!("  {}:", name));
                lines.extend(many.iter().map(|v| format!("    {}", v)));
            }
        }
    }
    lines
}
