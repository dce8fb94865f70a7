//! Read-side façade over the catalog used by the HTTP handlers.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{CatalogError, SnapshotStore};
use crate::config::Config;
use crate::gitlab::RemoteCatalog;
use crate::models::{Commit, Project, ProjectCommits, Tag};

pub struct CatalogQuery {
    remote: Arc<dyn RemoteCatalog>,
    store: Arc<SnapshotStore>,
    group_names: Vec<String>,
    project_namespace: String,
    build_tag_prefix: String,
    commit_history_days: u32,
}

impl CatalogQuery {
    pub fn new(remote: Arc<dyn RemoteCatalog>, store: Arc<SnapshotStore>, config: &Config) -> Self {
        Self {
            remote,
            store,
            group_names: config.groups.clone(),
            project_namespace: config.project_namespace.clone(),
            build_tag_prefix: config.build_tag_prefix.clone(),
            commit_history_days: config.commit_history_days,
        }
    }

    /// Configured logical group names, in configuration order.
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub async fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.store.last_updated().await
    }

    /// Cached projects of a logical group.
    pub async fn projects(&self, group: &str) -> Result<Vec<Project>, CatalogError> {
        let snapshot = self.store.current().await;
        snapshot
            .projects(group)
            .map(<[Project]>::to_vec)
            .ok_or_else(|| CatalogError::GroupNotFound(group.to_string()))
    }

    /// Project info plus its commit history annotated with build tags.
    ///
    /// Always fetched from the upstream; nothing here is cached.
    pub async fn project_commits(
        &self,
        group: &str,
        project: &str,
    ) -> Result<ProjectCommits, CatalogError> {
        let path = format!("{}/{}/{}", self.project_namespace, group, project);
        let project_info = self.remote.get_project(&path).await?;

        let mut commits = self
            .remote
            .list_commits(project_info.id, self.history_since())
            .await?;
        let tags = self.remote.list_tags(project_info.id).await?;

        annotate_build_tags(&mut commits, &tags, &self.build_tag_prefix);
        debug!(%path, commits = commits.len(), tags = tags.len(), "project history assembled");

        Ok(ProjectCommits {
            project_info,
            commits,
        })
    }

    /// Start of the commit history window, `None` when the window is disabled.
    fn history_since(&self) -> Option<DateTime<Utc>> {
        (self.commit_history_days > 0)
            .then(|| Utc::now() - Duration::days(i64::from(self.commit_history_days)))
    }
}

/// Set `commit.tag` for every commit pointed at by a tag starting with `prefix`.
///
/// When several matching tags point at the same commit, the one appearing
/// last in `tags` (upstream response order) wins.
pub fn annotate_build_tags(commits: &mut [Commit], tags: &[Tag], prefix: &str) {
    let mut by_commit: HashMap<&str, &str> = HashMap::new();
    for tag in tags.iter().filter(|t| t.name.starts_with(prefix)) {
        by_commit.insert(tag.commit_short_id.as_str(), tag.name.as_str());
    }

    for commit in commits.iter_mut() {
        if let Some(name) = by_commit.get(commit.short_id.as_str()) {
            commit.tag = name.to_string();
        }
    }
}
