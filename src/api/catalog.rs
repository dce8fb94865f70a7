//! Catalog endpoints backed by the cached snapshot.

use axum::extract::{Path, State};
use serde::Serialize;

use super::{success, ApiResult};
use crate::models::{Project, ProjectCommits};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub names: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub data: Vec<Project>,
}

/// GET /types - List the configured logical groups.
pub async fn list_types(State(state): State<AppState>) -> ApiResult<TypesResponse> {
    success(TypesResponse {
        names: state.catalog.group_names().to_vec(),
    })
}

/// GET /projects/{id} - List the cached projects of a logical group.
pub async fn list_projects(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> ApiResult<ProjectsResponse> {
    tracing::debug!(%group, "listing cached projects");
    let data = state.catalog.projects(&group).await?;
    success(ProjectsResponse { data })
}

/// GET /commits/{group}/{id} - Project info with build-tagged commit history.
pub async fn get_commits(
    State(state): State<AppState>,
    Path((group, project)): Path<(String, String)>,
) -> ApiResult<ProjectCommits> {
    tracing::debug!(%group, %project, "fetching project history");
    let view = state.catalog.project_commits(&group, &project).await?;
    success(view)
}
