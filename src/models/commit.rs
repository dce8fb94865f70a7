//! Commit and tag models for the on-demand project history view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Project;

/// A single commit of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub short_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub title: String,
    pub author_name: String,
    pub author_email: String,
    /// Name of the build tag pointing at this commit, empty if none.
    #[serde(default)]
    pub tag: String,
}

/// A repository tag, reduced to what is needed for commit annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub commit_short_id: String,
}

/// Project info joined with its tag-annotated commit history.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectCommits {
    pub project_info: Project,
    pub commits: Vec<Commit>,
}
