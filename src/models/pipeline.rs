//! Pipeline trigger and status models.

use serde::{Deserialize, Serialize};

/// Request body for `POST /trigger`.
///
/// Fields are optional at the serde level so that a missing field is reported
/// as a validation error rather than a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha2: Option<String>,
}

/// Response body for a successful pipeline trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub status: String,
    pub pipeline_id: u64,
}

/// Response body for `GET /status/pipeline/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatusResponse {
    pub job_status: serde_json::Value,
}
