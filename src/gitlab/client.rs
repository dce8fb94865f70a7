//! `reqwest`-backed implementation of [`RemoteCatalog`] for the GitLab v4 API.

use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    next_page, Listing, PartialListing, PipelineTrigger, RemoteCatalog, UpstreamError, MAX_PAGES,
    PER_PAGE,
};
use crate::config::Config;
use crate::models::{Commit, Project, Subgroup, Tag};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiGroup {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiProject {
    id: u64,
    name: String,
    #[serde(default)]
    web_url: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    last_activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    id: String,
    short_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    author_email: String,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
    #[serde(default)]
    commit: Option<ApiTagCommit>,
}

#[derive(Debug, Deserialize)]
struct ApiTagCommit {
    short_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiPipeline {
    id: u64,
}

impl From<ApiGroup> for Subgroup {
    fn from(g: ApiGroup) -> Self {
        Subgroup {
            id: g.id,
            name: g.name,
        }
    }
}

impl From<ApiProject> for Project {
    fn from(p: ApiProject) -> Self {
        Project {
            id: p.id,
            name: p.name,
            web_url: p.web_url,
            last_activity_at: p.last_activity_at,
            description: p.description.unwrap_or_default(),
        }
    }
}

impl From<ApiCommit> for Commit {
    fn from(c: ApiCommit) -> Self {
        Commit {
            id: c.id,
            short_id: c.short_id,
            created_at: c.created_at,
            title: c.title,
            author_name: c.author_name,
            author_email: c.author_email,
            tag: String::new(),
        }
    }
}

impl From<ApiTag> for Tag {
    fn from(t: ApiTag) -> Self {
        Tag {
            name: t.name,
            commit_short_id: t.commit.map(|c| c.short_id).unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// GitLab API client authenticated with a private access token.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base: Url,
    token: String,
    trigger_token: String,
}

impl GitLabClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let base = Url::parse(&config.gitlab_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| UpstreamError::InvalidBaseUrl(config.gitlab_url.clone()))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("tdr-backend/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base,
            token: config.gitlab_token.clone(),
            trigger_token: config.trigger_token.clone(),
        })
    }

    /// Build an API URL from path segments. Each segment is percent-encoded,
    /// so a namespaced project path becomes a single `a%2Fb%2Fc` segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<(T, HeaderMap), UpstreamError> {
        let resp = self
            .http
            .get(url.clone())
            .header("PRIVATE-TOKEN", &self.token)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let resp = check_status(&url, resp).await?;
        let headers = resp.headers().clone();
        let body = resp.json().await?;
        Ok((body, headers))
    }

    /// Follow page-number pagination until the upstream reports no further
    /// page or [`MAX_PAGES`] pages have been read.
    async fn paginate<W, T>(&self, url: Url, query: &[(&str, String)]) -> Listing<T>
    where
        W: DeserializeOwned + Into<T>,
    {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let mut params = query.to_vec();
            params.push(("per_page", PER_PAGE.to_string()));
            params.push(("page", page.to_string()));

            let (batch, headers) = match self.get_json::<Vec<W>>(url.clone(), &params).await {
                Ok(result) => result,
                Err(error) => {
                    warn!(path = url.path(), page, error = %error, "listing aborted");
                    return Err(PartialListing { items, error });
                }
            };
            items.extend(batch.into_iter().map(Into::into));

            match next_page(&headers, page) {
                Some(next) if next <= MAX_PAGES => page = next,
                Some(_) => {
                    warn!(path = url.path(), pages = page, "page ceiling reached");
                    break;
                }
                None => break,
            }
        }

        debug!(path = url.path(), count = items.len(), "listing complete");
        Ok(items)
    }
}

#[async_trait::async_trait]
impl RemoteCatalog for GitLabClient {
    async fn list_subgroups(&self, group_id: u64) -> Listing<Subgroup> {
        let url = self.endpoint(&["groups", &group_id.to_string(), "subgroups"]);
        self.paginate::<ApiGroup, _>(url, &[]).await
    }

    async fn list_group_projects(&self, group_id: u64) -> Listing<Project> {
        let url = self.endpoint(&["groups", &group_id.to_string(), "projects"]);
        self.paginate::<ApiProject, _>(url, &[]).await
    }

    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError> {
        let url = self.endpoint(&["projects", path]);
        let (project, _) = self.get_json::<ApiProject>(url, &[]).await?;
        Ok(project.into())
    }

    async fn list_commits(
        &self,
        project_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Listing<Commit> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "repository", "commits"]);
        let query: Vec<(&str, String)> = since
            .map(|s| ("since", s.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .into_iter()
            .collect();
        self.paginate::<ApiCommit, _>(url, &query).await
    }

    async fn list_tags(&self, project_id: u64) -> Listing<Tag> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "repository", "tags"]);
        self.paginate::<ApiTag, _>(url, &[]).await
    }

    async fn first_pipeline_job(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<serde_json::Value, UpstreamError> {
        let project = project_id.to_string();
        let url = self.endpoint(&["projects", &project, "pipelines", &pipeline_id.to_string(), "jobs"]);
        let (jobs, _) = self.get_json::<Vec<serde_json::Value>>(url, &[]).await?;

        let job_id = jobs
            .first()
            .and_then(|job| job.get("id"))
            .and_then(|id| id.as_u64())
            .ok_or(UpstreamError::NoJobs(pipeline_id))?;

        let url = self.endpoint(&["projects", &project, "jobs", &job_id.to_string()]);
        let (job, _) = self.get_json::<serde_json::Value>(url, &[]).await?;
        Ok(job)
    }

    async fn trigger_pipeline(
        &self,
        project_id: u64,
        trigger: &PipelineTrigger,
    ) -> Result<u64, UpstreamError> {
        let url = self.endpoint(&["projects", &project_id.to_string(), "trigger", "pipeline"]);
        let body = serde_json::json!({
            "token": self.trigger_token,
            "ref": trigger.git_ref,
            "variables": trigger.variables,
        });

        let resp = self.http.post(url.clone()).json(&body).send().await?;
        let pipeline: ApiPipeline = check_status(&url, resp).await?.json().await?;
        Ok(pipeline.id)
    }
}

/// Turn a non-success response into [`UpstreamError::Status`].
async fn check_status(url: &Url, resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        path: url.path().to_string(),
        message: upstream_message(&body),
    })
}

/// Extract GitLab's `message`/`error` field, falling back to the raw body.
fn upstream_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let field = parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")));

    match field {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}
