//! Project model as cached in the catalog snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitLab project belonging to one of the tracked logical groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub web_url: String,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub description: String,
}

/// A subgroup of the parent group, used to resolve logical group names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgroup {
    pub id: u64,
    pub name: String,
}
