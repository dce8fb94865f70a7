//! In-memory [`RemoteCatalog`] used by the catalog and API unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{Listing, PartialListing, PipelineTrigger, RemoteCatalog, UpstreamError};
use crate::models::{Commit, Project, Subgroup, Tag};

fn failure(what: &str) -> UpstreamError {
    UpstreamError::Status {
        status: 503,
        path: what.to_string(),
        message: "upstream unavailable".to_string(),
    }
}

/// Build a project with just enough fields set for assertions.
pub fn project(id: u64, name: &str) -> Project {
    Project {
        id,
        name: name.to_string(),
        web_url: format!("https://gitlab.example.com/tdr/{name}"),
        last_activity_at: None,
        description: String::new(),
    }
}

/// Build a commit with the given short id.
pub fn commit(short_id: &str) -> Commit {
    Commit {
        id: format!("{short_id}0000000000"),
        short_id: short_id.to_string(),
        created_at: None,
        title: format!("commit {short_id}"),
        author_name: "Author".to_string(),
        author_email: "author@example.com".to_string(),
        tag: String::new(),
    }
}

/// Build a tag pointing at the given commit short id.
pub fn tag(name: &str, commit_short_id: &str) -> Tag {
    Tag {
        name: name.to_string(),
        commit_short_id: commit_short_id.to_string(),
    }
}

/// Scriptable fake upstream.
#[derive(Default)]
pub struct FakeRemote {
    pub subgroups: Vec<Subgroup>,
    pub projects: Mutex<HashMap<u64, Vec<Project>>>,
    pub failing_groups: Mutex<HashSet<u64>>,
    pub projects_by_path: HashMap<String, Project>,
    pub commits: Vec<Commit>,
    pub tags: Vec<Tag>,
    pub jobs: HashMap<u64, serde_json::Value>,
    pub triggered: Mutex<Vec<(u64, PipelineTrigger)>>,
    pub commit_since: Mutex<Vec<Option<DateTime<Utc>>>>,
    /// Delay applied to every project listing.
    pub listing_delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with_groups(groups: &[(&str, u64)]) -> Self {
        Self {
            subgroups: groups
                .iter()
                .map(|(name, id)| Subgroup {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn set_projects(&self, group_id: u64, projects: Vec<Project>) {
        self.projects.lock().unwrap().insert(group_id, projects);
    }

    pub fn set_failing(&self, group_id: u64, failing: bool) {
        let mut set = self.failing_groups.lock().unwrap();
        if failing {
            set.insert(group_id);
        } else {
            set.remove(&group_id);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl RemoteCatalog for FakeRemote {
    async fn list_subgroups(&self, _group_id: u64) -> Listing<Subgroup> {
        self.record_call();
        Ok(self.subgroups.clone())
    }

    async fn list_group_projects(&self, group_id: u64) -> Listing<Project> {
        self.record_call();
        if let Some(delay) = self.listing_delay {
            tokio::time::sleep(delay).await;
        }

        let projects = self
            .projects
            .lock()
            .unwrap()
            .get(&group_id)
            .cloned()
            .unwrap_or_default();

        if self.failing_groups.lock().unwrap().contains(&group_id) {
            let items = projects.into_iter().take(1).collect();
            return Err(PartialListing {
                items,
                error: failure("projects"),
            });
        }
        Ok(projects)
    }

    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError> {
        self.record_call();
        self.projects_by_path
            .get(path)
            .cloned()
            .ok_or_else(|| UpstreamError::Status {
                status: 404,
                path: path.to_string(),
                message: "404 Project Not Found".to_string(),
            })
    }

    async fn list_commits(
        &self,
        _project_id: u64,
        since: Option<DateTime<Utc>>,
    ) -> Listing<Commit> {
        self.record_call();
        self.commit_since.lock().unwrap().push(since);
        Ok(self.commits.clone())
    }

    async fn list_tags(&self, _project_id: u64) -> Listing<Tag> {
        self.record_call();
        Ok(self.tags.clone())
    }

    async fn first_pipeline_job(
        &self,
        _project_id: u64,
        pipeline_id: u64,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.record_call();
        self.jobs
            .get(&pipeline_id)
            .cloned()
            .ok_or(UpstreamError::NoJobs(pipeline_id))
    }

    async fn trigger_pipeline(
        &self,
        project_id: u64,
        trigger: &PipelineTrigger,
    ) -> Result<u64, UpstreamError> {
        self.record_call();
        let mut triggered = self.triggered.lock().unwrap();
        triggered.push((project_id, trigger.clone()));
        Ok(1000 + triggered.len() as u64)
    }
}

/// Snapshot of the groups map for assertions.
pub fn group_names(groups: &BTreeMap<String, Vec<Project>>) -> Vec<&str> {
    groups.keys().map(String::as_str).collect()
}
