//! Pipeline passthrough endpoints.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::gitlab::PipelineTrigger;
use crate::models::{PipelineStatusResponse, TriggerRequest, TriggerResponse};
use crate::AppState;

/// GET /status/pipeline/{id} - Status of the first job of a pipeline.
pub async fn pipeline_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PipelineStatusResponse> {
    let pipeline_id: u64 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid pipeline id: {}", id)))?;

    let job_status = state
        .remote
        .first_pipeline_job(state.pipeline_project_id, pipeline_id)
        .await?;

    success(PipelineStatusResponse { job_status })
}

/// POST /trigger - Trigger the diff pipeline for two revisions of a project.
pub async fn trigger_pipeline(
    State(state): State<AppState>,
    payload: Result<Json<TriggerRequest>, JsonRejection>,
) -> ApiResult<TriggerResponse> {
    let Json(request) =
        payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;

    let trigger = PipelineTrigger {
        git_ref: state.config.trigger_ref.clone(),
        variables: trigger_variables(request)?,
    };

    let pipeline_id = state
        .remote
        .trigger_pipeline(state.pipeline_project_id, &trigger)
        .await?;
    tracing::info!(pipeline_id, variables = ?trigger.variables, "pipeline triggered");

    success(TriggerResponse {
        status: "Pipeline triggered successfully!".to_string(),
        pipeline_id,
    })
}

/// Validate the trigger request and map it to pipeline variables.
fn trigger_variables(request: TriggerRequest) -> Result<BTreeMap<String, String>, AppError> {
    let fields = [
        ("project", "REPO_PROJECT", request.project),
        ("group", "REPO_GROUP", request.group),
        ("sha1", "GIT_SHA1", request.sha1),
        ("sha2", "GIT_SHA2", request.sha2),
    ];

    let mut variables = BTreeMap::new();
    let mut missing = Vec::new();
    for (field, variable, value) in fields {
        match value.filter(|v| !v.trim().is_empty()) {
            Some(v) => {
                variables.insert(variable.to_string(), v);
            }
            None => missing.push(field),
        }
    }

    if missing.is_empty() {
        Ok(variables)
    } else {
        Err(AppError::Validation(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{CatalogQuery, SnapshotStore};
    use crate::config::Config;
    use crate::gitlab::testing::FakeRemote;

    fn request(project: &str, group: &str, sha1: &str, sha2: &str) -> TriggerRequest {
        TriggerRequest {
            project: Some(project.to_string()),
            group: Some(group.to_string()),
            sha1: Some(sha1.to_string()),
            sha2: Some(sha2.to_string()),
        }
    }

    #[test]
    fn test_trigger_variables_mapping() {
        let vars = trigger_variables(request("ABC-21-001", "papers", "aaa", "bbb")).unwrap();
        assert_eq!(vars["REPO_PROJECT"], "ABC-21-001");
        assert_eq!(vars["REPO_GROUP"], "papers");
        assert_eq!(vars["GIT_SHA1"], "aaa");
        assert_eq!(vars["GIT_SHA2"], "bbb");
    }

    #[test]
    fn test_trigger_variables_forwarded_verbatim() {
        let vars = trigger_variables(request(" ABC-21-001", "papers", "aaa ", "bbb")).unwrap();
        assert_eq!(vars["REPO_PROJECT"], " ABC-21-001");
        assert_eq!(vars["GIT_SHA1"], "aaa ");
    }

    #[test]
    fn test_trigger_variables_missing_fields() {
        let mut req = request("ABC-21-001", " ", "aaa", "bbb");
        req.sha2 = None;
        let err = trigger_variables(req).unwrap_err();
        assert_eq!(err.message(), "missing required field(s): group, sha2");
    }

    fn state(remote: Arc<FakeRemote>) -> AppState {
        let config = Config::for_tests();
        let store = Arc::new(SnapshotStore::new());
        AppState {
            catalog: Arc::new(CatalogQuery::new(remote.clone(), store, &config)),
            remote,
            config: Arc::new(config),
            pipeline_project_id: 500,
        }
    }

    #[tokio::test]
    async fn test_trigger_forwards_ref_and_variables() {
        let remote = Arc::new(FakeRemote::default());
        let resp = trigger_pipeline(
            State(state(remote.clone())),
            Ok(Json(request("ABC-21-001", "papers", "aaa", "bbb"))),
        )
        .await
        .unwrap();
        assert_eq!(resp.0.pipeline_id, 1001);

        let triggered = remote.triggered.lock().unwrap();
        let (project_id, trigger) = &triggered[0];
        assert_eq!(*project_id, 500);
        assert_eq!(trigger.git_ref, "master");
        assert_eq!(trigger.variables.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_trigger_makes_no_upstream_call() {
        let remote = Arc::new(FakeRemote::default());
        let mut req = request("ABC-21-001", "papers", "aaa", "bbb");
        req.sha1 = Some(String::new());

        let err = trigger_pipeline(State(state(remote.clone())), Ok(Json(req)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_status_returns_first_job() {
        let mut remote = FakeRemote::default();
        remote
            .jobs
            .insert(42, serde_json::json!({"id": 7, "status": "running"}));
        let state = state(Arc::new(remote));

        let resp = pipeline_status(State(state.clone()), Path("42".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.0.job_status["status"], "running");

        let err = pipeline_status(State(state.clone()), Path("43".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "pipeline 43 has no jobs");

        let err = pipeline_status(State(state), Path("-1".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "invalid pipeline id: -1");
    }
}
